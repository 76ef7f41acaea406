use std::time::{Duration, Instant};

use generational_arena::{Arena, Index};

/// What a timer/idler/fd/child-watch callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    Retain,
    Remove,
}

impl Continue {
    fn from_bool(retain: bool) -> Self {
        if retain {
            Continue::Retain
        } else {
            Continue::Remove
        }
    }
}

impl From<bool> for Continue {
    fn from(retain: bool) -> Self {
        Self::from_bool(retain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) Index);

pub(crate) struct TimerEntry {
    pub period: Duration,
    pub next_fire_at: Instant,
    /// `None` exactly while the dispatcher has stolen the callback out to
    /// invoke it without holding the bookkeeping lock (spec §5).
    pub callback: Option<Box<dyn FnMut() -> Continue + Send>>,
    pub remove_me: bool,
}

/// Timer bookkeeping: entries live in an arena for stable ids; the
/// `order` vector holds live indices sorted ascending by `next_fire_at`
/// (spec §4.4 "ordered by next_fire_at ascending").
#[derive(Default)]
pub(crate) struct Timers {
    pub entries: Arena<TimerEntry>,
    pub order: Vec<Index>,
}

impl Timers {
    fn resort(&mut self) {
        let entries = &self.entries;
        self.order
            .sort_by(|a, b| entries[*a].next_fire_at.cmp(&entries[*b].next_fire_at));
    }

    pub fn insert(&mut self, period: Duration, now: Instant, callback: Box<dyn FnMut() -> Continue + Send>) -> TimerId {
        let idx = self.entries.insert(TimerEntry {
            period,
            next_fire_at: now + period,
            callback: Some(callback),
            remove_me: false,
        });
        self.order.push(idx);
        self.resort();
        TimerId(idx)
    }

    /// Marks the entry removed and, if it is still sitting in `order`
    /// (i.e. not currently stolen into an in-flight `steal_due` pass),
    /// takes it out and frees its arena slot immediately — a timer
    /// deleted before its deadline must never fire later (spec §5/§8:
    /// `timeout_del` on a not-yet-due timer is a true removal, not a
    /// deferred one). If it's mid-pass, `take_callback`/`finish_pass`
    /// below finish the job once that pass settles.
    pub fn remove(&mut self, id: TimerId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.remove_me = true;
        } else {
            return;
        }
        if let Some(pos) = self.order.iter().position(|idx| *idx == id.0) {
            self.order.remove(pos);
            self.entries.remove(id.0);
        }
    }

    /// Takes the callback out of `idx` so it can be invoked without the
    /// bookkeeping lock held. Returns `None` for an entry removed after
    /// `steal_due` snapshotted it into the current pass but before its
    /// turn came up — spec §5's removal guarantee only covers entries
    /// that have not yet begun executing.
    pub fn take_callback(
        &mut self,
        idx: Index,
    ) -> Option<Box<dyn FnMut() -> Continue + Send>> {
        match self.entries.get_mut(idx) {
            Some(entry) if !entry.remove_me => entry.callback.take(),
            _ => None,
        }
    }

    /// Puts a callback back after invocation, rearming for `next_fire_at =
    /// fired_at + period` on retain or marking `remove_me` otherwise.
    /// Returns whether the entry is still armed.
    pub fn settle_after_fire(
        &mut self,
        idx: Index,
        callback: Box<dyn FnMut() -> Continue + Send>,
        fired_at: Instant,
        retain: Continue,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(idx) else {
            return false;
        };
        entry.callback = Some(callback);
        if retain == Continue::Retain {
            entry.next_fire_at = fired_at + entry.period;
            true
        } else {
            entry.remove_me = true;
            false
        }
    }

    pub fn next_fire_at(&self) -> Option<Instant> {
        self.order
            .first()
            .and_then(|idx| self.entries.get(*idx))
            .map(|e| e.next_fire_at)
    }

    /// Steals every entry whose `next_fire_at <= now` out of the live
    /// order vector, leaving the rest untouched, and returns their
    /// indices still in ascending fire-time order.
    pub fn steal_due(&mut self, now: Instant) -> Vec<Index> {
        let mut cut = 0;
        while cut < self.order.len() {
            let idx = self.order[cut];
            let due = self
                .entries
                .get(idx)
                .map(|e| e.next_fire_at <= now)
                .unwrap_or(true); // gone entries are swept below
            if !due {
                break;
            }
            cut += 1;
        }
        self.order.drain(..cut).collect()
    }

    /// Settles every index `steal_due` handed out for this pass: entries
    /// still armed go back into `order` (resorted); entries marked
    /// `remove_me` — by a non-retaining fire, or by `remove` racing a
    /// pass already in flight — have their arena slot freed here. This is
    /// the only path that frees a fired-and-not-retained timer's slot, so
    /// skipping it (or only scanning `order`, which no longer holds these
    /// indices) would leak the slot forever.
    pub fn finish_pass(&mut self, stolen: Vec<Index>) {
        for idx in stolen {
            match self.entries.get(idx) {
                Some(e) if !e.remove_me => self.order.push(idx),
                Some(_) => {
                    self.entries.remove(idx);
                }
                None => {}
            }
        }
        self.resort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_fire_time_after_insert() {
        let mut timers = Timers::default();
        let now = Instant::now();
        timers.insert(Duration::from_millis(50), now, Box::new(|| Continue::Remove));
        timers.insert(Duration::from_millis(20), now, Box::new(|| Continue::Remove));
        timers.insert(Duration::from_millis(30), now, Box::new(|| Continue::Remove));

        let order: Vec<_> = timers
            .order
            .iter()
            .map(|idx| timers.entries[*idx].period)
            .collect();
        assert_eq!(
            order,
            vec![
                Duration::from_millis(20),
                Duration::from_millis(30),
                Duration::from_millis(50)
            ]
        );
    }

    #[test]
    fn steal_due_only_takes_expired_head() {
        let mut timers = Timers::default();
        let now = Instant::now();
        timers.insert(Duration::from_millis(1000), now, Box::new(|| Continue::Remove));
        timers.insert(Duration::from_millis(0), now, Box::new(|| Continue::Remove));

        let due = timers.steal_due(now + Duration::from_millis(5));
        assert_eq!(due.len(), 1);
        assert_eq!(timers.order.len(), 1);
    }

    #[test]
    fn removing_a_not_yet_due_timer_means_it_never_fires() {
        let mut timers = Timers::default();
        let now = Instant::now();
        let id = timers.insert(Duration::from_secs(60), now, Box::new(|| Continue::Remove));

        timers.remove(id);

        assert!(timers.order.is_empty());
        assert!(timers.entries.get(id.0).is_none());
        let due = timers.steal_due(now + Duration::from_secs(120));
        assert!(due.is_empty());
    }

    #[test]
    fn non_retained_fire_frees_its_arena_slot() {
        let mut timers = Timers::default();
        let now = Instant::now();
        let id = timers.insert(Duration::from_millis(0), now, Box::new(|| Continue::Remove));

        let due = timers.steal_due(now);
        assert_eq!(due, vec![id.0]);

        let mut cb = timers.take_callback(id.0).unwrap();
        let retain = cb();
        timers.settle_after_fire(id.0, cb, now, retain);
        timers.finish_pass(due);

        assert!(timers.entries.get(id.0).is_none());
        assert!(timers.order.is_empty());
    }
}
