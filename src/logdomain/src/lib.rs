//! Domain-scoped logging façade (spec §3, §4.2).
//!
//! A [`Domain`] filters messages by [`Level`] independently of every other
//! domain; a process-wide [`Sink`] (the stderr [`DefaultSink`] unless
//! overridden) renders whatever passes the filter.

mod directive;
mod domain;
mod level;
mod sink;

pub use directive::Directive;
pub use domain::{apply_directive, global_domain, init_from_env, new_domain, Colour, Domain, DEFAULT_LEVELS_VAR};
pub use level::Level;
pub use sink::{init_decoration_from_env, reset_sink, set_abort_level, set_decoration, set_sink, DefaultSink, Sink};

use std::fmt;

/// Applies `domain`'s filter, dispatches to the active sink, and aborts
/// the process if `level` is at or below the configured abort level
/// (spec §4.2, §8). Called by the [`log`] family of macros; callers
/// should prefer those over calling this directly.
#[doc(hidden)]
pub fn log_impl(domain: &Domain, level: Level, file: &str, line: u32, func: &str, args: fmt::Arguments) {
    if !domain.passes(level) {
        return;
    }

    let message = args.to_string();
    sink::dispatch(domain, level, file, line, func, &message);

    if let Some(abort_at) = sink::abort_level() {
        if level <= abort_at {
            std::process::abort();
        }
    }
}

/// Captures the enclosing function's name as a `&'static str`, the way
/// the loop and descriptor crates capture file/line context.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Logs at an explicit level against an explicit domain.
#[macro_export]
macro_rules! log {
    ($domain:expr, $level:expr, $($arg:tt)+) => {
        $crate::log_impl(
            $domain,
            $level,
            file!(),
            line!(),
            $crate::function_name!(),
            format_args!($($arg)+),
        )
    };
}

#[macro_export]
macro_rules! log_critical {
    ($domain:expr, $($arg:tt)+) => {
        $crate::log!($domain, $crate::Level::Critical, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($domain:expr, $($arg:tt)+) => {
        $crate::log!($domain, $crate::Level::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_warning {
    ($domain:expr, $($arg:tt)+) => {
        $crate::log!($domain, $crate::Level::Warning, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($domain:expr, $($arg:tt)+) => {
        $crate::log!($domain, $crate::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($domain:expr, $($arg:tt)+) => {
        $crate::log!($domain, $crate::Level::Debug, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    impl Sink for CountingSink {
        fn emit(&self, _d: &Domain, _l: Level, _f: &str, _ln: u32, _fn_: &str, _m: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn macro_respects_domain_filter() {
        static SINK: CountingSink = CountingSink(AtomicUsize::new(0));
        set_sink(&SINK);

        let d = new_domain("test-lib-a", None);
        d.set_level(Level::Warning);

        log_debug!(&d, "should be filtered out");
        assert_eq!(SINK.0.load(Ordering::SeqCst), 0);

        log_warning!(&d, "should pass: {}", 42);
        assert_eq!(SINK.0.load(Ordering::SeqCst), 1);

        reset_sink();
    }

    #[test]
    fn function_name_macro_captures_enclosing_fn() {
        fn marker() -> &'static str {
            function_name!()
        }
        assert!(marker().ends_with("marker"));
    }
}
