//! File-descriptor readiness bookkeeping (spec §3, §4.4 "Fd processing").
//!
//! Each entry wraps a raw fd in an `mio::unix::SourceFd`, registered
//! under a `Token` derived from its arena index. Readiness flags are
//! expressed in the spec's own bit values (§6), independent of mio's
//! `Interest`/`Event` vocabulary, so callbacks never see a mio type.

use std::os::unix::io::RawFd;

use bitflags::bitflags;
use generational_arena::{Arena, Index};
use mio::{unix::SourceFd, Interest, Token};

use crate::timer::Continue;

bitflags! {
    /// Stable bit values from spec §6.
    #[derive(Default, Clone, Copy)]
    pub struct FdFlags: u32 {
        const IN   = 1;
        const OUT  = 2;
        const PRI  = 4;
        const ERR  = 8;
        const HUP  = 16;
        const NVAL = 32;
    }
}

impl FdFlags {
    pub(crate) fn to_interest(self) -> Option<Interest> {
        let mut interest: Option<Interest> = None;
        if self.intersects(FdFlags::IN | FdFlags::PRI) {
            interest = Some(Interest::READABLE);
        }
        if self.intersects(FdFlags::OUT) {
            interest = Some(interest.map_or(Interest::WRITABLE, |i| i.add(Interest::WRITABLE)));
        }
        interest
    }

    pub(crate) fn from_event(event: &mio::event::Event) -> Self {
        let mut flags = FdFlags::empty();
        if event.is_readable() {
            flags |= FdFlags::IN;
        }
        if event.is_writable() {
            flags |= FdFlags::OUT;
        }
        if event.is_priority() {
            flags |= FdFlags::PRI;
        }
        if event.is_error() {
            flags |= FdFlags::ERR;
        }
        if event.is_read_closed() || event.is_write_closed() {
            flags |= FdFlags::HUP;
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FdId(pub(crate) Index);

pub(crate) struct FdEntry {
    pub fd: RawFd,
    pub requested: FdFlags,
    /// `None` exactly while the callback has been stolen out for
    /// invocation without the bookkeeping lock held (spec §5).
    pub callback: Option<Box<dyn FnMut(RawFd, FdFlags) -> Continue + Send>>,
    pub remove_me: bool,
    pub invalid: bool,
}

#[derive(Default)]
pub(crate) struct Fds {
    pub entries: Arena<FdEntry>,
    pub order: Vec<Index>,
    /// Set whenever registration changes the live set, so the poller
    /// knows to rebuild its `pollfd`-equivalent registrations (spec
    /// §4.4: "re-allocated in blocks of 32 whenever the set changed").
    pub set_changed: bool,
}

impl Fds {
    pub fn index_to_token(idx: Index) -> Token {
        let (slot, gen) = idx.into_raw_parts();
        Token((slot as u64 | (gen << 32)) as usize)
    }

    pub fn token_to_index(token: Token) -> Index {
        let bits = token.0 as u64;
        Index::from_raw_parts((bits & 0xffff_ffff) as usize, bits >> 32)
    }

    pub fn insert(
        &mut self,
        fd: RawFd,
        requested: FdFlags,
        callback: Box<dyn FnMut(RawFd, FdFlags) -> Continue + Send>,
    ) -> FdId {
        let idx = self.entries.insert(FdEntry {
            fd,
            requested,
            callback: Some(callback),
            remove_me: false,
            invalid: false,
        });
        self.order.push(idx);
        self.set_changed = true;
        FdId(idx)
    }

    pub fn remove(&mut self, id: FdId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.remove_me = true;
            self.set_changed = true;
        }
    }

    /// Returns `None` for an entry removed after this iteration's event
    /// set was captured but before its turn came up in the dispatch loop
    /// (e.g. one fd callback calling `fd_del` on another fd already
    /// queued in the same `Events` batch) — spec §5's removal guarantee
    /// only covers entries that have not yet begun executing.
    pub fn take_callback(
        &mut self,
        idx: Index,
    ) -> Option<Box<dyn FnMut(RawFd, FdFlags) -> Continue + Send>> {
        match self.entries.get_mut(idx) {
            Some(entry) if !entry.remove_me => entry.callback.take(),
            _ => None,
        }
    }

    /// Puts the callback back after invocation; marks `remove_me` and
    /// flags the set as changed if the callback didn't retain.
    pub fn settle_after_fire(
        &mut self,
        idx: Index,
        callback: Box<dyn FnMut(RawFd, FdFlags) -> Continue + Send>,
        retain: Continue,
    ) {
        let Some(entry) = self.entries.get_mut(idx) else {
            return;
        };
        entry.callback = Some(callback);
        if retain == Continue::Remove {
            entry.remove_me = true;
            self.set_changed = true;
        }
    }

    /// Re-registers the whole live set against `registry`, the way spec
    /// §4.4 "re-allocates the pollfd array in blocks of 32" whenever the
    /// set has changed since the last iteration.
    pub fn register_all(&mut self, registry: &mio::Registry) {
        for idx in self.order.clone() {
            let Some(entry) = self.entries.get_mut(idx) else {
                continue;
            };
            let _ = registry.deregister(&mut SourceFd(&entry.fd));
            if entry.invalid || entry.remove_me {
                continue;
            }
            if let Some(interest) = entry.requested.to_interest() {
                if registry
                    .register(&mut SourceFd(&entry.fd), Self::index_to_token(idx), interest)
                    .is_err()
                {
                    entry.invalid = true;
                }
            }
        }
        self.set_changed = false;
    }

    pub fn deregister_all(&mut self, registry: &mio::Registry) {
        for idx in self.order.clone() {
            if let Some(entry) = self.entries.get_mut(idx) {
                let _ = registry.deregister(&mut SourceFd(&entry.fd));
            }
        }
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
    fn token_round_trips_through_arena_index() {
        let mut arena: Arena<()> = Arena::new();
        let idx = arena.insert(());
        let idx2 = arena.insert(());
        arena.remove(idx);
        let idx3 = arena.insert(()); // reuses idx's slot with a bumped generation

        for i in [idx2, idx3] {
            assert_eq!(Fds::token_to_index(Fds::index_to_token(i)), i);
        }
    }

    #[test]
    fn event_bits_translate_to_spec_flags() {
        assert_eq!(FdFlags::IN.bits(), 1);
        assert_eq!(FdFlags::OUT.bits(), 2);
        assert_eq!(FdFlags::PRI.bits(), 4);
        assert_eq!(FdFlags::ERR.bits(), 8);
        assert_eq!(FdFlags::HUP.bits(), 16);
        assert_eq!(FdFlags::NVAL.bits(), 32);
    }
}
