//! Asynchronous POSIX signal delivery (spec §3, §4.4 "Signal processing").
//!
//! Signal handlers in this runtime must stay async-signal-safe, so the
//! actual buffering is delegated to `signal-hook`'s registry (which
//! already implements exactly the fixed-capacity, single-writer /
//! single-reader self-pipe ring the spec describes) rather than
//! hand-rolling a second one; see DESIGN.md for why a full `siginfo_t`
//! ring (pid/uid/status per record) was dropped in favour of this
//! thinner one.

use coreerr::{CoreError, CoreResult};
use signal_hook::consts::signal::{
    SIGALRM, SIGCHLD, SIGHUP, SIGINT, SIGPIPE, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2,
};
use signal_hook_mio::v0_8::Signals;

/// Recognised signals (spec §4.4): the others are left unblocked but
/// not specially dispatched.
pub const RECOGNISED: &[i32] = &[
    SIGALRM, SIGCHLD, SIGHUP, SIGINT, SIGPIPE, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2,
];

pub(crate) struct SignalSource {
    signals: Signals,
}

impl SignalSource {
    pub fn new() -> CoreResult<Self> {
        let signals = Signals::new(RECOGNISED).map_err(|_| CoreError::NotSupported)?;
        Ok(Self { signals })
    }

    pub fn source(&mut self) -> &mut Signals {
        &mut self.signals
    }

    /// Drains every signal number observed since the last call, with
    /// signals blocked for the duration of the drain (spec §4.4).
    pub fn drain(&mut self) -> Vec<i32> {
        self.signals.pending().collect()
    }
}

/// Reaps every currently-terminated child via a non-blocking wait,
/// independent of whether `SIGCHLD` itself was observed this pass
/// (spec §4.4: "regardless of SIGCHLD delivery").
pub(crate) fn reap_children() -> Vec<(libc::pid_t, i32)> {
    let mut reaped = Vec::new();
    loop {
        let mut status: i32 = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        reaped.push((pid, status));
    }
    reaped
}

/// What the loop does in response to a recognised signal.
pub(crate) enum SignalAction {
    Quit,
    ChildExit,
    Logged,
}

pub(crate) fn classify(signo: i32) -> SignalAction {
    match signo {
        SIGINT | SIGQUIT | SIGTERM => SignalAction::Quit,
        SIGCHLD => SignalAction::ChildExit,
        _ => SignalAction::Logged,
    }
}

pub(crate) fn signal_name(signo: i32) -> &'static str {
    match signo {
        SIGALRM => "SIGALRM",
        SIGCHLD => "SIGCHLD",
        SIGHUP => "SIGHUP",
        SIGINT => "SIGINT",
        SIGPIPE => "SIGPIPE",
        SIGQUIT => "SIGQUIT",
        SIGTERM => "SIGTERM",
        SIGUSR1 => "SIGUSR1",
        SIGUSR2 => "SIGUSR2",
        _ => "SIGUNKNOWN",
    }
}
