// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The round-robin scheduler (C3).
//!
//! Scans forward from the slot after whichever environment last ran,
//! picking the first one that is runnable, not stopped, and either not
//! blocked in `sigwait` or blocked on a signal that's already queued. A
//! `sigwait` match is resolved as a side effect of the eligibility check
//! itself — exactly where the teaching original's `check_wait_for_signal`
//! does it, rather than as a separate pass.

use abi::{EnvId, EnvStatus};

use crate::arch::ArchState;
use crate::env::EnvTable;

/// Return value for operations that can have scheduling implications.
/// `#[must_use]` because discarding a hint that a switch is needed would
/// leave a dead environment (or a descheduled one) running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum NextTask {
    /// Fine to keep running whatever's current.
    Same,
    /// A switch is needed, but the caller hasn't concluded which slot
    /// should run next; the scheduler must decide.
    Other,
    /// A switch is needed, and the caller already knows the target slot.
    Specific(usize),
}

impl NextTask {
    /// Combines two scheduling hints arising from the same syscall (e.g.
    /// one hint from the sender's state change, one from the receiver's).
    /// Disagreeing `Specific`s can't both be honored, so they downgrade to
    /// `Other`; a single `Specific` always wins over `Same`/`Other`.
    pub fn combine(self, other: Self) -> Self {
        use NextTask::*;
        match (self, other) {
            (x, y) if x == y => x,
            (Specific(_), Specific(_)) => Other,
            (Specific(x), _) | (_, Specific(x)) => Specific(x),
            (Other, _) | (_, Other) => Other,
            (Same, Same) => Same,
        }
    }
}

/// Outcome of asking the scheduler to pick the next environment to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheduled {
    /// `idx` is now running and should simply resume where it left off.
    Resumed(usize),
    /// `idx` is now running, and `signo` should be delivered to its
    /// installed upcall before it resumes normal execution.
    Deliver(usize, u32, abi::SigInfo, abi::Sigaction),
    /// No environment is runnable, but at least one is merely stopped or
    /// waiting; a real kernel would idle here.
    Halt,
    /// No environment exists in any potentially-runnable state at all.
    Monitor,
}

fn is_eligible(table: &mut EnvTable, idx: usize) -> bool {
    let env = table.get(idx);
    if env.stopped || env.status != EnvStatus::Runnable {
        return false;
    }
    if !env.sig.is_waiting() {
        return true;
    }
    let waiting_mask = env.sig.waiting_mask;
    let waiting_out_ptr = env.sig.waiting_out_ptr;
    let env = table.get_mut(idx);
    match env.sig.queue.take_matching(waiting_mask) {
        Some(found) => {
            let _ = env.address_space.write_u32(waiting_out_ptr, found.signo);
            env.sig.waiting_mask = 0;
            env.sig.waiting_out_ptr = 0;
            env.save.ret0(0);
            true
        }
        None => false,
    }
}

/// Picks and activates the next environment to run, per C3's round-robin
/// policy. Takes a full scheduling step: eligibility checks may dequeue a
/// matching `sigwait` signal, and a deliverable queued signal (not blocked
/// by the target's process mask) is popped and handed back for the caller
/// to splice into the chosen environment's upcall.
pub fn step(table: &mut EnvTable) -> Scheduled {
    let capacity = table.capacity();
    if capacity == 0 {
        return Scheduled::Monitor;
    }
    let start = table.current().map(|c| (c + 1) % capacity).unwrap_or(0);

    let mut picked = None;
    for offset in 0..capacity {
        let idx = (start + offset) % capacity;
        if is_eligible(table, idx) {
            picked = Some(idx);
            break;
        }
    }

    let picked = match picked {
        Some(idx) => idx,
        None => {
            // Nothing newly eligible; if the environment that was already
            // running is still healthy, let it keep going — but it still
            // needs its own queue checked, the same way a freshly-picked
            // env does below, since a solo env that signals itself (or
            // anyone self-sigqueue'ing while it's the only runnable env)
            // would otherwise never see that signal delivered.
            if let Some(cur) = table.current() {
                let env = table.get(cur);
                if env.status == EnvStatus::Running && !env.stopped && !env.sig.is_waiting() {
                    let blocked = env.sig.mask;
                    return match table.get_mut(cur).sig.queue.take_deliverable(blocked) {
                        Some(sig) => Scheduled::Deliver(cur, sig.signo, sig.info, sig.action),
                        None => Scheduled::Resumed(cur),
                    };
                }
            }
            let any_alive = table
                .slots()
                .iter()
                .any(|e| e.status != EnvStatus::Free);
            return if any_alive { Scheduled::Halt } else { Scheduled::Monitor };
        }
    };

    table.set_running(picked);

    let env = table.get_mut(picked);
    let blocked = env.sig.mask;
    match env.sig.queue.take_deliverable(blocked) {
        // `SA_RESETHAND` is already applied to the live action table by
        // `signal::sigqueue` at enqueue time; this snapshot keeps the
        // pre-reset disposition regardless of what happens to it afterward.
        Some(sig) => Scheduled::Deliver(picked, sig.signo, sig.info, sig.action),
        None => Scheduled::Resumed(picked),
    }
}

/// Convenience used by syscalls that want to name "some other environment"
/// without duplicating the scan in [`step`]. Returns `None` if nothing else
/// is eligible, leaving the caller's own task as the only option.
pub fn select_other(table: &mut EnvTable, exclude: usize) -> Option<usize> {
    let capacity = table.capacity();
    for offset in 1..capacity {
        let idx = (exclude + offset) % capacity;
        if is_eligible(table, idx) {
            return Some(idx);
        }
    }
    None
}

/// A `sigwait(mask, out_ptr)` call that finds nothing already queued blocks
/// the caller; this records that state so future scheduling passes (and
/// future `sigqueue` calls) know to wake it.
pub fn block_on_signals(table: &mut EnvTable, idx: usize, mask: u32, out_ptr: u32) {
    let env = table.get_mut(idx);
    env.sig.waiting_mask = mask;
    env.sig.waiting_out_ptr = out_ptr;
}

/// Used by `kill`/`sigqueue` with target `EnvId::SELF` bookkeeping — not a
/// real syscall, just documents that id 0 always means "me" to callers of
/// this module too.
pub const SELF_ID: EnvId = EnvId::SELF;
