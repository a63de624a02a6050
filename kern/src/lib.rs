// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-lifecycle core: the environment table, the round-robin scheduler,
//! and POSIX-flavored signal delivery.
//!
//! # Algorithm naivety principles
//!
//! Like the kernel this is modeled on, this code deliberately uses *naive*
//! algorithms over fixed-size arrays rather than anything allocation-backed:
//!
//! 1. Use safe Rust for as much as possible.
//! 2. Use easily understood and debugged algorithms.
//! 3. Revisit these decisions only if they become performance problems.
//!
//! The environment table has a fixed compile-time ceiling ([`MAX_ENVS`]);
//! [`config::KernelConfig`] picks how much of it is actually in use for a
//! given boot. There is no dynamic task count, no heap, and no IPC/memory
//! machinery beyond the stubs signal delivery needs to call out to.
//!
//! Memory protection, address-space switching and region mapping are
//! out of scope here; [`arch::sim`] stands in for them with a plain
//! byte-buffer "address space" so the rest of the kernel can be exercised
//! on a host without any real hardware underneath it.

#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
pub mod trace;

pub mod arch;
pub mod config;
pub mod env;
pub mod err;
pub mod lifecycle;
pub mod sched;
pub mod signal;
pub mod syscalls;

pub use config::KernelConfig;
pub use env::{Env, EnvTable, MAX_ENVS, MAX_QUEUE};
pub use err::{FaultInfo, UsageError, UserError};
pub use sched::{NextTask, Scheduled};
pub use syscalls::Kernel;
