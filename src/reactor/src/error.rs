use thiserror::Error;

/// Failures specific to the dispatch loop, layered over [`coreerr::CoreError`]
/// for the registration-time error category (spec §7).
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("called from a thread other than the loop's dispatch thread")]
    WrongThread,

    #[error("registration failed: {0}")]
    Registration(#[from] coreerr::CoreError),

    #[error("i/o error setting up the loop: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReactorResult<T> = Result<T, ReactorError>;
