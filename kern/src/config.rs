// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime kernel configuration.
//!
//! Unlike the build-time task tables the teaching kernel this is modeled on
//! generates from an `app.toml`, the environment table here is sized at
//! runtime from a small [`KernelConfig`] value, bounded by the compile-time
//! ceiling [`crate::env::MAX_ENVS`]. This keeps the core testable from plain
//! Rust unit tests without a code-generation step.

use crate::env::MAX_ENVS;

/// Boot-time configuration for an [`crate::env::EnvTable`].
#[derive(Clone, Copy, Debug)]
pub struct KernelConfig {
    /// Number of environment slots to make available, `1..=MAX_ENVS`.
    pub capacity: usize,
    /// Emit a trace entry for every environment-table state transition.
    /// No-op unless built with the `trace-envs` feature.
    pub trace_envs: bool,
    /// Emit a trace entry for every signal enqueue/dequeue/delivery.
    /// No-op unless built with the `trace-signals` feature.
    pub trace_signals: bool,
    /// Whether `sigqueue` enforces its self-or-child target restriction.
    /// The teaching original gates the same check behind `TEST_ITASK`,
    /// since always requiring it makes ping-pong-style test scenarios
    /// between unrelated environments awkward to set up; `false` here
    /// reproduces that bypass. Real boots should leave this `true`.
    pub enforce_sigqueue_permission: bool,
}

impl KernelConfig {
    /// A configuration with every slot available, tracing off, and the
    /// `sigqueue` permission check enforced.
    pub const fn with_capacity(capacity: usize) -> Self {
        KernelConfig {
            capacity,
            trace_envs: false,
            trace_signals: false,
            enforce_sigqueue_permission: true,
        }
    }

    /// Clamps `capacity` to the `[1, MAX_ENVS]` range this build supports.
    pub fn clamped_capacity(&self) -> usize {
        self.capacity.clamp(1, MAX_ENVS)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig::with_capacity(MAX_ENVS)
    }
}
