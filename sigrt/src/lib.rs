// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User-side signal runtime (C6): the trampoline a signal-handling program
//! links against to turn an upcall entry from the kernel into a call to its
//! own `sa_handler`/`sa_sigaction`, and thin syscall wrappers that lazily
//! wire the trampoline up as the program's page-fault/signal upcall the
//! first time signal handling is actually used (§4.6).
//!
//! Like [`kern::arch`], the real trap-entry/asm half of this (saving the
//! interrupted frame, branching here, and resuming it afterward) is a
//! collaborator out of scope for this core; [`sys::sim`] stands in for it on
//! hosted targets so the dispatch logic below can be driven and tested
//! without any target hardware.

#![cfg_attr(not(test), no_std)]

pub mod registration;
pub mod sys;
pub mod trampoline;

pub use registration::Registration;
pub use sys::RawSyscalls;
pub use trampoline::{dispatch, HandlerInvoker, Outcome, UTrapFrame};
