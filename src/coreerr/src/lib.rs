//! Shared error taxonomy for the runtime core (containers, log façade,
//! memory descriptor, main loop). See spec §7.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("out of memory")]
    OutOfMemory,

    #[error("out of range or would overflow")]
    OutOfRange,

    #[error("not found")]
    NotFound,

    #[error("no data")]
    NoData,

    #[error("operation not supported")]
    NotSupported,

    #[error("premature end of input")]
    PrematureEnd,

    #[error("interrupted by a signal")]
    Interrupted,

    #[error("would overflow fixed capacity")]
    CapacityOverflow,
}

pub type CoreResult<T> = Result<T, CoreError>;
