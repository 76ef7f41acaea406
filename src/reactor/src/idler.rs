//! Idler bookkeeping (spec §3, §4.4 "Idler processing").
//!
//! Idlers live in an arena for stable ids; `order` holds live indices in
//! registration order, matching spec §5's ordering guarantee. An idler
//! added from inside another idler's callback starts life as
//! `ReadyNext` and is promoted to `Ready` only at the end of that pass,
//! deferring its first invocation by one iteration. Callbacks are taken
//! out of the arena (leaving `None` behind) before being invoked so the
//! main loop can drop its bookkeeping lock across the call (spec §5) —
//! callers needing the whole-pass algorithm in one call, with no
//! external lock, should use [`Idlers::run_pass`].

use generational_arena::{Arena, Index};

use crate::timer::Continue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdlerId(pub(crate) Index);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdlerStatus {
    Ready,
    ReadyNext,
    Deleted,
}

pub(crate) struct IdlerEntry {
    pub callback: Option<Box<dyn FnMut() -> Continue + Send>>,
    pub status: IdlerStatus,
}

#[derive(Default)]
pub(crate) struct Idlers {
    pub entries: Arena<IdlerEntry>,
    pub order: Vec<Index>,
    in_pass: bool,
}

impl Idlers {
    pub fn insert(&mut self, callback: Box<dyn FnMut() -> Continue + Send>) -> IdlerId {
        let status = if self.in_pass {
            IdlerStatus::ReadyNext
        } else {
            IdlerStatus::Ready
        };
        let idx = self.entries.insert(IdlerEntry {
            callback: Some(callback),
            status,
        });
        self.order.push(idx);
        IdlerId(idx)
    }

    pub fn remove(&mut self, id: IdlerId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.status = IdlerStatus::Deleted;
        }
    }

    pub fn has_ready(&self) -> bool {
        self.order
            .iter()
            .any(|idx| matches!(self.entries.get(*idx), Some(e) if e.status == IdlerStatus::Ready))
    }

    /// Snapshot of the currently-`Ready` indices, in registration order,
    /// taken while the caller holds whatever external lock guards `self`.
    /// Marks the pass as started so registrations routed through
    /// [`Idlers::insert`] during the pass land as `ReadyNext`.
    pub fn begin_pass(&mut self) -> Vec<Index> {
        self.in_pass = true;
        self.order
            .iter()
            .cloned()
            .filter(|idx| matches!(self.entries.get(*idx), Some(e) if e.status == IdlerStatus::Ready))
            .collect()
    }

    /// Returns `None` for an entry that was marked `Deleted` after being
    /// snapshotted into the current pass's ready list but before its turn
    /// came up — e.g. idler A's callback calling `remove` on idler B,
    /// which `begin_pass` already captured as ready (spec §5: deletion is
    /// only guaranteed for entries that have not yet begun executing).
    pub fn take_callback(&mut self, idx: Index) -> Option<Box<dyn FnMut() -> Continue + Send>> {
        match self.entries.get_mut(idx) {
            Some(entry) if entry.status != IdlerStatus::Deleted => entry.callback.take(),
            _ => None,
        }
    }

    pub fn settle_after_fire(
        &mut self,
        idx: Index,
        callback: Box<dyn FnMut() -> Continue + Send>,
        retain: Continue,
    ) {
        if let Some(entry) = self.entries.get_mut(idx) {
            entry.callback = Some(callback);
            if retain == Continue::Remove {
                entry.status = IdlerStatus::Deleted;
            }
        }
    }

    /// Promotes `ReadyNext` entries to `Ready` and sweeps `Deleted` ones,
    /// ending the pass.
    pub fn end_pass(&mut self) {
        for idx in &self.order {
            if let Some(entry) = self.entries.get_mut(*idx) {
                if entry.status == IdlerStatus::ReadyNext {
                    entry.status = IdlerStatus::Ready;
                }
            }
        }
        self.order.retain(|idx| match self.entries.get(*idx) {
            Some(e) if e.status != IdlerStatus::Deleted => true,
            Some(_) => {
                self.entries.remove(*idx);
                false
            }
            None => false,
        });
        self.in_pass = false;
    }

    /// Runs one full idler pass with no external locking, for unit tests
    /// and single-threaded embedding that doesn't need the take/put-back
    /// split.
    pub fn run_pass(&mut self, mut keep_going: impl FnMut() -> bool) {
        let ready = self.begin_pass();
        for idx in ready {
            if !keep_going() {
                break;
            }
            let Some(mut cb) = self.take_callback(idx) else {
                continue;
            };
            let retain = cb();
            self.settle_after_fire(idx, cb, retain);
        }
        self.end_pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn retain_keeps_entry_ready_across_passes() {
        let mut idlers = Idlers::default();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        idlers.insert(Box::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
            Continue::Retain
        }));

        idlers.run_pass(|| true);
        idlers.run_pass(|| true);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(idlers.order.len(), 1);
    }

    #[test]
    fn not_retain_removes_entry_after_one_pass() {
        let mut idlers = Idlers::default();
        idlers.insert(Box::new(|| Continue::Remove));
        idlers.run_pass(|| true);
        assert!(idlers.order.is_empty());
        assert!(idlers.entries.is_empty());
    }

    #[test]
    fn entry_inserted_while_in_pass_starts_ready_next_and_is_skipped_this_pass() {
        let mut idlers = Idlers::default();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();

        idlers.insert(Box::new(move || {
            ran2.store(true, Ordering::SeqCst);
            Continue::Remove
        }));

        idlers.in_pass = true;
        let deferred = idlers.insert(Box::new(|| Continue::Remove));
        idlers.in_pass = false;
        assert_eq!(
            idlers.entries.get(deferred.0).unwrap().status,
            IdlerStatus::ReadyNext
        );

        idlers.run_pass(|| true);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(idlers.order, vec![deferred.0]);
        assert_eq!(
            idlers.entries.get(deferred.0).unwrap().status,
            IdlerStatus::Ready
        );
    }

    #[test]
    fn quit_mid_pass_stops_further_invocations() {
        let mut idlers = Idlers::default();
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            idlers.insert(Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Continue::Remove
            }));
        }

        let mut remaining = 1;
        idlers.run_pass(|| {
            if remaining == 0 {
                false
            } else {
                remaining -= 1;
                true
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
