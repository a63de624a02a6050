// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host stand-in for [`super::RawSyscalls`].
//!
//! Holds just enough state in a plain struct to drive and assert against the
//! trampoline and registration logic from ordinary Rust unit tests, without
//! a real kernel underneath. The end-to-end scenarios that need an actual
//! scheduler and signal queue are exercised against the real `kern` crate in
//! `kern`'s own integration tests instead, the same way [`kern::arch::sim`]
//! is only the *kernel's* half of this split.

use abi::{EnvId, Sigaction};

use super::RawSyscalls;

/// A recording fake: tracks the one thing each call is meant to do (destroy,
/// mask update, action table entry, ...) rather than modeling a whole
/// environment table.
#[derive(Debug, Default)]
pub struct RecordingSyscalls {
    pub self_id: EnvId,
    pub destroyed: Option<EnvId>,
    pub mask: u32,
    pub actions: [Sigaction; 32],
    pub pgfault_upcall: u32,
    pub queued: [Option<(u32, i32)>; 4],
    queued_len: usize,
}

impl RecordingSyscalls {
    pub fn new(self_id: EnvId) -> Self {
        RecordingSyscalls {
            self_id,
            actions: [Sigaction::DFL; 32],
            ..Default::default()
        }
    }
}

impl RawSyscalls for RecordingSyscalls {
    fn getenvid(&mut self) -> EnvId {
        self.self_id
    }

    fn env_destroy(&mut self, target: EnvId) {
        self.destroyed = Some(target);
    }

    fn sigqueue(&mut self, _target: EnvId, signo: u32, value: i32) -> i32 {
        if self.queued_len >= self.queued.len() {
            return abi::KernErr::Again.code();
        }
        self.queued[self.queued_len] = Some((signo, value));
        self.queued_len += 1;
        0
    }

    fn sigwait(&mut self, _mask: u32) -> Option<u32> {
        None
    }

    fn sigaction(&mut self, signo: u32, new: Option<Sigaction>) -> Sigaction {
        let old = self.actions[signo as usize];
        if let Some(act) = new {
            self.actions[signo as usize] = act;
        }
        old
    }

    fn sigprocmask(&mut self, how: u32, set: Option<u32>) -> u32 {
        let old = self.mask;
        if let Some(requested) = set {
            self.mask = match how {
                abi::signal::SIG_BLOCK => old | requested,
                abi::signal::SIG_UNBLOCK => old & !requested,
                abi::signal::SIG_SETMASK => requested,
                _ => old,
            };
        }
        old
    }

    fn set_pgfault_upcall(&mut self, _target: EnvId, entry: u32) {
        self.pgfault_upcall = entry;
    }
}
