//! A cooperative, single-threaded event loop multiplexing timers, idle
//! callbacks, fd readiness, child-process exit watches and POSIX signal
//! delivery (spec §1).

mod child;
mod error;
mod fd;
mod idler;
mod mainloop;
mod signal;
mod timer;

pub use child::ChildWatchId;
pub use error::{ReactorError, ReactorResult};
pub use fd::{FdFlags, FdId};
pub use idler::IdlerId;
pub use mainloop::MainLoop;
pub use timer::{Continue, TimerId};
