// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw syscall invocation.
//!
//! The real trap instruction and register marshalling (`sys_foo_stub` in the
//! teaching original's `userlib`) is architecture-specific assembly this
//! core doesn't redesign — see [`crate`]'s module docs. What's specified
//! here is the *shape* of the calls the trampoline and registration helpers
//! need, as a trait any backend can implement: the real one trapping into
//! the kernel, and [`sim`] recording calls in-memory for host tests.

use abi::{EnvId, Sigaction};
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(not(target_os = "none"))] {
        pub mod sim;
    } else {
        compile_error!(
            "no bare-metal trap-invocation backend is implemented; build \
             for a hosted target to use the `sim` backend"
        );
    }
}

/// The subset of the syscall surface (§6) the C6 trampoline and its
/// registration helpers call into: `env_destroy`, `sigqueue`, `sigwait`,
/// `sigaction`, `sigprocmask`, `env_set_pgfault_upcall`, and `getenvid`.
pub trait RawSyscalls {
    fn getenvid(&mut self) -> EnvId;
    fn env_destroy(&mut self, target: EnvId);
    fn sigqueue(&mut self, target: EnvId, signo: u32, value: i32) -> i32;
    fn sigwait(&mut self, mask: u32) -> Option<u32>;
    fn sigaction(&mut self, signo: u32, new: Option<Sigaction>) -> Sigaction;
    /// `how`/`set` mirror §4.4's `sigprocmask(how, set, oldset)`; `set` of
    /// `None` means "query only" (`set_ptr == 0` at the ABI level). Returns
    /// the mask as it was *before* the update.
    fn sigprocmask(&mut self, how: u32, set: Option<u32>) -> u32;
    fn set_pgfault_upcall(&mut self, target: EnvId, entry: u32);
}
