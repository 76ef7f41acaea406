use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::domain::Domain;
use crate::level::Level;

/// A log sink receives every message that passed its domain's filter.
/// Implementations must not call back into the logging façade.
pub trait Sink: Send + Sync {
    fn emit(&self, domain: &Domain, level: Level, file: &str, line: u32, func: &str, message: &str);
}

/// Prints `LEVEL:domain file:line function() message` to stderr, holding a
/// single process-wide lock across the whole write so concurrent messages
/// never interleave (spec §4.2). Preserves `errno` around the call, since
/// logging must never perturb a caller's subsequent `errno` inspection.
pub struct DefaultSink {
    out: Mutex<()>,
}

impl DefaultSink {
    pub const fn new() -> DefaultSink {
        DefaultSink { out: Mutex::new(()) }
    }
}

impl Default for DefaultSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for DefaultSink {
    fn emit(&self, domain: &Domain, level: Level, file: &str, line: u32, func: &str, message: &str) {
        let saved_errno = unsafe { *libc::__errno_location() };

        let _guard = self.out.lock();
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();

        let (prefix, suffix) = match domain.colour().filter(|_| SHOW_COLOUR.load(Ordering::Relaxed)) {
            Some(colour) => (colour.ansi_code(), "\x1b[0m"),
            None => ("", ""),
        };

        let mut location = String::new();
        if SHOW_FILE.load(Ordering::Relaxed) {
            location.push_str(file);
            if SHOW_LINE.load(Ordering::Relaxed) {
                location.push_str(&format!(":{line}"));
            }
            location.push(' ');
        }
        if SHOW_FUNCTION.load(Ordering::Relaxed) {
            location.push_str(&format!("{func}() "));
        }

        let _ = writeln!(
            handle,
            "{prefix}{}:{}{suffix} {location}{message}",
            level.name(),
            domain.name(),
        );

        unsafe { *libc::__errno_location() = saved_errno };
    }
}

static ABORT_LEVEL: AtomicU8 = AtomicU8::new(u8::MAX);
static ACTIVE_SINK: Mutex<Option<&'static dyn Sink>> = Mutex::new(None);
static USING_DEFAULT: AtomicBool = AtomicBool::new(true);

static SHOW_FILE: AtomicBool = AtomicBool::new(true);
static SHOW_FUNCTION: AtomicBool = AtomicBool::new(true);
static SHOW_LINE: AtomicBool = AtomicBool::new(true);
static SHOW_COLOUR: AtomicBool = AtomicBool::new(true);

static DEFAULT_SINK: DefaultSink = DefaultSink::new();

/// Toggles the default sink's `file:line function()` and colour
/// decoration (spec §6). A custom sink is unaffected; it receives the
/// raw fields regardless and decides for itself.
pub fn set_decoration(show_file: bool, show_function: bool, show_line: bool, show_colour: bool) {
    SHOW_FILE.store(show_file, Ordering::Relaxed);
    SHOW_FUNCTION.store(show_function, Ordering::Relaxed);
    SHOW_LINE.store(show_line, Ordering::Relaxed);
    SHOW_COLOUR.store(show_colour, Ordering::Relaxed);
}

fn env_flag(var_name: &str, default: bool) -> bool {
    match std::env::var(var_name) {
        Ok(v) => v != "0",
        Err(_) => default,
    }
}

/// Reads the four decoration booleans from the environment (spec §6),
/// falling back to `true` for any variable that is unset.
pub fn init_decoration_from_env() {
    set_decoration(
        env_flag("RUNTIME_LOG_SHOW_FILE", true),
        env_flag("RUNTIME_LOG_SHOW_FUNCTION", true),
        env_flag("RUNTIME_LOG_SHOW_LINE", true),
        env_flag("RUNTIME_LOG_SHOW_COLOUR", true),
    );
}

/// Installs a custom sink, replacing the default one. The sink must be
/// `'static` (it lives for the rest of the process).
pub fn set_sink(sink: &'static dyn Sink) {
    *ACTIVE_SINK.lock() = Some(sink);
    USING_DEFAULT.store(false, Ordering::Relaxed);
}

/// Restores the default stderr sink.
pub fn reset_sink() {
    *ACTIVE_SINK.lock() = None;
    USING_DEFAULT.store(true, Ordering::Relaxed);
}

/// Sets the level at or below which the process aborts after emitting a
/// message (spec §4.2). `None` disables abort-on-log entirely. Defaults to
/// [`Level::Critical`] only.
pub fn set_abort_level(level: Option<Level>) {
    ABORT_LEVEL.store(level.map(Level::as_u8).unwrap_or(u8::MAX), Ordering::Relaxed);
}

pub(crate) fn abort_level() -> Option<Level> {
    match ABORT_LEVEL.load(Ordering::Relaxed) {
        0 => Some(Level::Critical),
        1 => Some(Level::Error),
        2 => Some(Level::Warning),
        3 => Some(Level::Info),
        4 => Some(Level::Debug),
        _ => None,
    }
}

pub(crate) fn dispatch(domain: &Domain, level: Level, file: &str, line: u32, func: &str, message: &str) {
    if USING_DEFAULT.load(Ordering::Relaxed) {
        DEFAULT_SINK.emit(domain, level, file, line, func, message);
    } else if let Some(sink) = *ACTIVE_SINK.lock() {
        sink.emit(domain, level, file, line, func, message);
    } else {
        DEFAULT_SINK.emit(domain, level, file, line, func, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSink {
        count: std::sync::atomic::AtomicUsize,
    }

    impl Sink for CountingSink {
        fn emit(&self, _domain: &Domain, _level: Level, _file: &str, _line: u32, _func: &str, _message: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn custom_sink_receives_dispatch_and_reset_restores_default() {
        static SINK: CountingSink = CountingSink {
            count: std::sync::atomic::AtomicUsize::new(0),
        };
        set_sink(&SINK);
        let domain = crate::domain::global_domain();
        dispatch(&domain, Level::Error, "f.rs", 1, "f", "hi");
        assert_eq!(SINK.count.load(Ordering::SeqCst), 1);
        reset_sink();
    }

    #[test]
    fn abort_level_round_trips() {
        set_abort_level(Some(Level::Warning));
        assert_eq!(abort_level(), Some(Level::Warning));
        set_abort_level(None);
        assert_eq!(abort_level(), None);
        set_abort_level(Some(Level::Critical));
        assert_eq!(abort_level(), Some(Level::Critical));
    }

    #[test]
    fn default_sink_preserves_errno() {
        unsafe { *libc::__errno_location() = 42 };
        let domain = crate::domain::global_domain();
        DEFAULT_SINK.emit(&domain, Level::Info, "f.rs", 1, "f", "hi");
        assert_eq!(unsafe { *libc::__errno_location() }, 42);
    }
}
