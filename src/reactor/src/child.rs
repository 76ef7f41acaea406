//! Child-process exit watches (spec §3, §4.4 "Child-watch processing").
//!
//! A watch is one-shot: it fires at most once, when a matching
//! child-exit record appears in the scratch list populated by the
//! signal layer's non-blocking reap.

use generational_arena::{Arena, Index};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildWatchId(pub(crate) Index);

pub(crate) struct ChildWatchEntry {
    pub pid: libc::pid_t,
    pub callback: Option<Box<dyn FnMut(libc::pid_t, i32) + Send>>,
    pub remove_me: bool,
}

#[derive(Default)]
pub(crate) struct ChildWatches {
    pub entries: Arena<ChildWatchEntry>,
    pub order: Vec<Index>,
}

impl ChildWatches {
    pub fn insert(
        &mut self,
        pid: libc::pid_t,
        callback: Box<dyn FnMut(libc::pid_t, i32) + Send>,
    ) -> ChildWatchId {
        let idx = self.entries.insert(ChildWatchEntry {
            pid,
            callback: Some(callback),
            remove_me: false,
        });
        self.order.push(idx);
        ChildWatchId(idx)
    }

    pub fn remove(&mut self, id: ChildWatchId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.remove_me = true;
        }
    }

    /// Indices of live watches matching a pid in `exits`, in registration
    /// order.
    pub fn matches(&self, exits: &[(libc::pid_t, i32)]) -> Vec<(Index, libc::pid_t, i32)> {
        self.order
            .iter()
            .filter_map(|idx| {
                let entry = self.entries.get(*idx)?;
                if entry.remove_me {
                    return None;
                }
                exits
                    .iter()
                    .find(|(pid, _)| *pid == entry.pid)
                    .map(|&(pid, status)| (*idx, pid, status))
            })
            .collect()
    }

    /// Returns `None` for a watch removed after `matches` snapshotted the
    /// current pass's hit list but before its turn came up (e.g. one
    /// watch's callback calling `child_watch_del` on another watch
    /// already matched this pass) — spec §5's removal guarantee only
    /// covers entries that have not yet begun executing.
    pub fn take_callback(
        &mut self,
        idx: Index,
    ) -> Option<Box<dyn FnMut(libc::pid_t, i32) + Send>> {
        match self.entries.get_mut(idx) {
            Some(entry) if !entry.remove_me => entry.callback.take(),
            _ => None,
        }
    }

    /// One-shot: always marks `remove_me` once fired (spec §4.4 state
    /// machine `armed → fired → removed`).
    pub fn settle_after_fire(&mut self, idx: Index) {
        if let Some(entry) = self.entries.get_mut(idx) {
            entry.remove_me = true;
        }
    }

    /// Runs one full child-watch pass with no external locking, for unit
    /// tests and single-threaded embedding.
    pub fn run_pass(&mut self, exits: &[(libc::pid_t, i32)], mut keep_going: impl FnMut()) {
        for (idx, pid, status) in self.matches(exits) {
            let Some(mut cb) = self.take_callback(idx) else {
                continue;
            };
            cb(pid, status);
            self.settle_after_fire(idx);
            keep_going();
        }
        self.sweep_removed();
    }

    pub fn sweep_removed(&mut self) {
        self.order.retain(|idx| match self.entries.get(*idx) {
            Some(e) if !e.remove_me => true,
            Some(_) => {
                self.entries.remove(*idx);
                false
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_matching_exit_and_removes_watch() {
        let mut watches = ChildWatches::default();
        let delivered = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let delivered2 = delivered.clone();

        let id = watches.insert(
            42,
            Box::new(move |pid, status| *delivered2.lock() = Some((pid, status))),
        );

        watches.run_pass(&[(42, 256)], || {});
        assert_eq!(*delivered.lock(), Some((42, 256)));
        assert!(watches.entries.get(id.0).is_none());
    }

    #[test]
    fn unmatched_exit_leaves_watch_armed() {
        let mut watches = ChildWatches::default();
        let id = watches.insert(7, Box::new(|_, _| {}));
        watches.run_pass(&[(99, 0)], || {});
        assert!(watches.entries.get(id.0).is_some());
    }
}
