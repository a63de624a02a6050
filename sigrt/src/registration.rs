// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thin user-side wrappers over the signal syscalls (§6).
//!
//! Mirrors the originating implementation's pattern of lazily wiring up the
//! page-fault/signal upcall the first time a program actually installs a
//! non-trivial handler, rather than requiring every program — even ones
//! that never touch signals — to register a trampoline at startup.

use abi::{EnvId, KernErr, Sigaction};

use crate::sys::RawSyscalls;

/// Tracks whether this environment has wired up its upcall yet. One
/// `Registration` per environment; real programs keep a single static
/// instance, the way `userlib`'s task-local state works.
#[derive(Debug, Default)]
pub struct Registration {
    upcall_installed: bool,
}

impl Registration {
    pub const fn new() -> Self {
        Registration {
            upcall_installed: false,
        }
    }

    /// Installs `trampoline_entry` as this environment's page-fault/signal
    /// upcall if it hasn't been already. A no-op on subsequent calls, so
    /// callers don't need to track registration state themselves beyond
    /// holding one `Registration`.
    fn ensure_upcall<S: RawSyscalls>(&mut self, sys: &mut S, trampoline_entry: u32) {
        if !self.upcall_installed {
            let self_id = sys.getenvid();
            sys.set_pgfault_upcall(self_id, trampoline_entry);
            self.upcall_installed = true;
        }
    }

    /// `sigaction(signo, act, oldact)`: installs `act` (when `Some`),
    /// returning the previous disposition. Lazily installs the trampoline
    /// first, since a program that calls this is about to depend on
    /// deliveries actually reaching user code.
    pub fn sigaction<S: RawSyscalls>(
        &mut self,
        sys: &mut S,
        trampoline_entry: u32,
        signo: u32,
        act: Option<Sigaction>,
    ) -> Sigaction {
        self.ensure_upcall(sys, trampoline_entry);
        sys.sigaction(signo, act)
    }

    /// `sigqueue(target, signo, value)`. Does not touch upcall registration
    /// — sending a signal doesn't imply this environment wants to receive
    /// any.
    pub fn sigqueue<S: RawSyscalls>(
        &mut self,
        sys: &mut S,
        target: EnvId,
        signo: u32,
        value: i32,
    ) -> Result<(), KernErr> {
        match sys.sigqueue(target, signo, value) {
            0 => Ok(()),
            code if code == KernErr::Again.code() => Err(KernErr::Again),
            code if code == KernErr::BadEnv.code() => Err(KernErr::BadEnv),
            code if code == KernErr::Inval.code() => Err(KernErr::Inval),
            _ => Err(KernErr::Inval),
        }
    }

    /// `sigwait(mask, &mut out)`: blocks (from the caller's perspective —
    /// the actual suspension happens in the kernel) until a signal in `mask`
    /// is already queued, then drains it without invoking any handler.
    pub fn sigwait<S: RawSyscalls>(&mut self, sys: &mut S, mask: u32) -> Option<u32> {
        sys.sigwait(mask)
    }

    /// `sigprocmask(how, set, oldset)`.
    pub fn sigprocmask<S: RawSyscalls>(&mut self, sys: &mut S, how: u32, set: Option<u32>) -> u32 {
        sys.sigprocmask(how, set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::sim::RecordingSyscalls;
    use abi::signal;

    #[test]
    fn first_sigaction_installs_upcall_once() {
        let mut sys = RecordingSyscalls::new(EnvId(1));
        let mut reg = Registration::new();
        assert_eq!(sys.pgfault_upcall, 0);

        reg.sigaction(&mut sys, 0x8000, signal::USR1, Some(Sigaction::DFL));
        assert_eq!(sys.pgfault_upcall, 0x8000);

        sys.pgfault_upcall = 0xdead;
        reg.sigaction(&mut sys, 0x8000, signal::USR2, None);
        // Already installed: second call doesn't re-issue the upcall set.
        assert_eq!(sys.pgfault_upcall, 0xdead);
    }

    #[test]
    fn sigqueue_maps_error_codes() {
        let mut sys = RecordingSyscalls::new(EnvId(1));
        let mut reg = Registration::new();
        for _ in 0..sys.queued.len() {
            reg.sigqueue(&mut sys, EnvId(2), signal::USR1, 0).unwrap();
        }
        assert_eq!(
            reg.sigqueue(&mut sys, EnvId(2), signal::USR1, 0),
            Err(KernErr::Again)
        );
    }
}
