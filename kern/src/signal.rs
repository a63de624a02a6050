// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! POSIX-flavored signal delivery (C4): `sigqueue`, `sigwait`, `sigaction`,
//! and `sigprocmask`.
//!
//! `KILL`, `STOP`, and `CONT` never touch a queue — they're applied to the
//! target environment's state directly, the way the teaching original's
//! `sys_sigqueue` special-cases them before ever reaching the generic
//! enqueue path. Everything else is queued with a value-copy snapshot of
//! the disposition in effect at enqueue time, so a concurrent `sigaction`
//! can never change how an already-queued signal gets delivered.

use abi::{signal, EnvId, KernErr, SaFlags, Sigaction, SigInfo, EnqueuedSignal};

use crate::env::EnvTable;
use crate::err::{SysResult, UserError};
use crate::sched::NextTask;

/// Why a `SIGCHLD` is being synthesized for a parent, so [`synth_sigchld`]
/// knows whether `SA_NOCLDSTOP` should suppress it. The flag only ever
/// suppresses notifications about a child stopping or continuing, never
/// about one exiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChldReason {
    Exited,
    Stopped,
    Continued,
}

fn recoverable(err: KernErr) -> UserError {
    UserError::Recoverable(err, NextTask::Same)
}

fn read_sigaction(table: &EnvTable, idx: usize, ptr: u32) -> Result<Sigaction, crate::err::FaultInfo> {
    let env = table.get(idx);
    Ok(Sigaction {
        handler: env.address_space.read_u32(ptr)?,
        mask: env.address_space.read_u32(ptr + 4)?,
        flags: env.address_space.read_u32(ptr + 8)?,
    })
}

fn write_sigaction(table: &mut EnvTable, idx: usize, ptr: u32, act: Sigaction) -> Result<(), crate::err::FaultInfo> {
    let env = table.get_mut(idx);
    env.address_space.write_u32(ptr, act.handler)?;
    env.address_space.write_u32(ptr + 4, act.mask)?;
    env.address_space.write_u32(ptr + 8, act.flags)?;
    Ok(())
}

/// Appends a `SIGCHLD` to `target`'s parent's queue, unless the parent has
/// no real parent (`parent_id == EnvId(0)`, the root-environment
/// sentinel), has set `SIG_IGN` for `SIGCHLD`, or — for stop/continue
/// notifications only — has `SA_NOCLDSTOP` set.
pub fn synth_sigchld(table: &mut EnvTable, target: usize, reason: ChldReason) {
    let parent_id = table.get(target).parent_id;
    if parent_id == EnvId(0) {
        return;
    }
    let parent = match table.resolve(parent_id, target, false) {
        Ok(p) => p,
        Err(_) => return,
    };

    let action = table.get(parent).sig.actions[signal::CHLD as usize];
    if action.is_ignored() {
        return;
    }
    if matches!(reason, ChldReason::Stopped | ChldReason::Continued)
        && action.flags().contains(SaFlags::NOCLDSTOP)
    {
        return;
    }

    let code = match reason {
        ChldReason::Exited => 1,
        ChldReason::Stopped => 2,
        ChldReason::Continued => 3,
    };
    let sender = table.get(target).id;
    let sig = EnqueuedSignal {
        signo: signal::CHLD,
        info: SigInfo {
            signo: signal::CHLD,
            code,
            sender: sender.0,
            addr: 0,
            value: 0,
        },
        action,
    };
    table.get_mut(parent).sig.queue.push(sig);
}

/// The `sigqueue(target, signo, value)` syscall.
pub fn sigqueue(table: &mut EnvTable, caller: usize, target: EnvId, signo: u32, value: i32) -> SysResult {
    if !signal::in_range(signo) {
        return Err(recoverable(KernErr::Inval));
    }
    let idx = table
        .resolve(target, caller, table.enforce_sigqueue_permission())
        .map_err(recoverable)?;

    match signo {
        s if s == signal::KILL => {
            synth_sigchld(table, idx, ChldReason::Exited);
            table.free(idx);
            let next = if idx == caller { NextTask::Other } else { NextTask::Same };
            Ok((0, next))
        }
        s if s == signal::STOP => {
            table.get_mut(idx).stopped = true;
            synth_sigchld(table, idx, ChldReason::Stopped);
            let next = if idx == caller { NextTask::Other } else { NextTask::Same };
            Ok((0, next))
        }
        s if s == signal::CONT => {
            table.get_mut(idx).stopped = false;
            synth_sigchld(table, idx, ChldReason::Continued);
            Ok((0, NextTask::Other))
        }
        _ => {
            let action = table.get(idx).sig.actions[signo as usize];
            if action.is_ignored() {
                return Ok((0, NextTask::Same));
            }

            // Without an upcall installed, the kernel has no way to ever
            // re-enter this environment's handler; a default-dispositioned
            // signal destroys it outright rather than queuing forever.
            if table.get(idx).pgfault_upcall == 0 {
                synth_sigchld(table, idx, ChldReason::Exited);
                table.free(idx);
                let next = if idx == caller { NextTask::Other } else { NextTask::Same };
                return Ok((0, next));
            }

            let sender = table.get(caller).id;
            let entry = EnqueuedSignal {
                signo,
                info: SigInfo::new(signo, sender, value),
                action,
            };
            if !table.get_mut(idx).sig.queue.push(entry) {
                return Err(recoverable(KernErr::Again));
            }

            // `SA_RESETHAND` takes effect now: future sends see `DFL`/`IGN`
            // (CHLD resets to `IGN`, everything else to `DFL`). The entry
            // just pushed keeps its own copy of the pre-reset action.
            if action.flags().contains(SaFlags::RESETHAND) {
                table.get_mut(idx).sig.actions[signo as usize] = if signo == signal::CHLD {
                    Sigaction { handler: abi::SIG_IGN, mask: 0, flags: 0 }
                } else {
                    Sigaction { handler: abi::SIG_DFL, mask: 0, flags: 0 }
                };
            }

            Ok((0, NextTask::Same))
        }
    }
}

/// The `sigwait(mask, signo_out)` syscall: returns immediately if a
/// matching signal is already queued, otherwise blocks the caller until
/// the scheduler finds one (see `sched::step`'s eligibility check).
pub fn sigwait(table: &mut EnvTable, caller: usize, mask: u32, out_ptr: u32) -> SysResult {
    if mask == 0 || mask & signal::UNBLOCKABLE_MASK != 0 {
        return Err(recoverable(KernErr::Inval));
    }
    if let Some(found) = table.get_mut(caller).sig.queue.take_matching(mask) {
        table
            .get_mut(caller)
            .address_space
            .write_u32(out_ptr, found.signo)
            .map_err(UserError::from)?;
        return Ok((0, NextTask::Same));
    }
    crate::sched::block_on_signals(table, caller, mask, out_ptr);
    Ok((0, NextTask::Other))
}

/// The `sigaction(signo, act, oldact)` syscall. `act_ptr`/`oldact_ptr` of 0
/// mean "don't read"/"don't write", matching the teaching original's
/// `NULL`-means-skip convention.
pub fn sigaction(
    table: &mut EnvTable,
    caller: usize,
    signo: u32,
    act_ptr: u32,
    oldact_ptr: u32,
) -> SysResult {
    if !signal::in_range(signo) {
        return Err(recoverable(KernErr::Inval));
    }
    if signal::is_unblockable(signo) {
        return Err(recoverable(KernErr::Inval));
    }

    let old = table.get(caller).sig.actions[signo as usize];
    if oldact_ptr != 0 {
        write_sigaction(table, caller, oldact_ptr, old).map_err(UserError::from)?;
    }

    if act_ptr != 0 {
        let new = read_sigaction(table, caller, act_ptr).map_err(UserError::from)?;
        if SaFlags::from_bits(new.flags).is_none() {
            return Err(recoverable(KernErr::Inval));
        }
        table.get_mut(caller).sig.actions[signo as usize] = new;
    }

    Ok((0, NextTask::Same))
}

/// The `sigprocmask(how, set, oldset)` syscall (§9: chosen over
/// `sigsetmask`, which can only ever replace the whole mask).
pub fn sigprocmask(
    table: &mut EnvTable,
    caller: usize,
    how: u32,
    set_ptr: u32,
    oldset_ptr: u32,
) -> SysResult {
    let old_mask = table.get(caller).sig.mask;
    if oldset_ptr != 0 {
        table
            .get_mut(caller)
            .address_space
            .write_u32(oldset_ptr, old_mask)
            .map_err(UserError::from)?;
    }

    if set_ptr != 0 {
        let requested = table
            .get(caller)
            .address_space
            .read_u32(set_ptr)
            .map_err(UserError::from)?
            & !signal::UNBLOCKABLE_MASK;

        let new_mask = match how {
            signal::SIG_BLOCK => old_mask | requested,
            signal::SIG_UNBLOCK => old_mask & !requested,
            signal::SIG_SETMASK => requested,
            _ => return Err(recoverable(KernErr::Inval)),
        };
        table.get_mut(caller).sig.mask = new_mask;
    }

    Ok((0, NextTask::Same))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use abi::{EnvStatus, EnvType};

    fn two_envs() -> (EnvTable, usize, usize) {
        let mut t = EnvTable::new(KernelConfig::with_capacity(4));
        let a = t.allocate_root(EnvType::User).unwrap();
        let b = t.allocate(a, EnvType::User).unwrap();
        // Give both a nonzero upcall so ordinary signals queue for delivery
        // instead of immediately destroying the target (see `sigqueue`'s
        // no-upcall-installed rule).
        t.get_mut(a).pgfault_upcall = 0x1000;
        t.get_mut(b).pgfault_upcall = 0x1000;
        (t, a, b)
    }

    #[test]
    fn ordinary_signal_without_upcall_destroys_default_dispositioned_target() {
        let mut t = EnvTable::new(KernelConfig::with_capacity(4));
        let a = t.allocate_root(EnvType::User).unwrap();
        let b = t.allocate(a, EnvType::User).unwrap();
        assert_eq!(t.get(b).pgfault_upcall, 0);
        let (_, next) = sigqueue(&mut t, a, t.get(b).id, signal::USR1, 0).unwrap();
        assert_eq!(next, NextTask::Same);
        assert_eq!(t.get(b).status, EnvStatus::Free);
    }

    #[test]
    fn queues_ordinary_signal_with_action_snapshot() {
        let (mut t, a, b) = two_envs();
        let custom = Sigaction { handler: 0x4000, mask: 0, flags: 0 };
        t.get_mut(b).sig.actions[signal::USR1 as usize] = custom;
        let (val, next) = sigqueue(&mut t, a, t.get(b).id, signal::USR1, 42).unwrap();
        assert_eq!(val, 0);
        assert_eq!(next, NextTask::Same);
        assert_eq!(t.get(b).sig.queue.len(), 1);
        let queued = t.get(b).sig.queue.iter().next().unwrap();
        assert_eq!(queued.action, custom);
        assert_eq!(queued.info.value, 42);
    }

    #[test]
    fn ignored_signal_is_dropped() {
        let (mut t, a, b) = two_envs();
        t.get_mut(b).sig.actions[signal::USR1 as usize] =
            Sigaction { handler: abi::SIG_IGN, mask: 0, flags: 0 };
        let (val, _) = sigqueue(&mut t, a, t.get(b).id, signal::USR1, 0).unwrap();
        assert_eq!(val, 0);
        assert_eq!(t.get(b).sig.queue.len(), 0);
    }

    #[test]
    fn full_queue_reports_again() {
        let (mut t, a, b) = two_envs();
        for _ in 0..crate::env::MAX_QUEUE {
            sigqueue(&mut t, a, t.get(b).id, signal::USR1, 0).unwrap();
        }
        let err = sigqueue(&mut t, a, t.get(b).id, signal::USR1, 0).unwrap_err();
        assert_eq!(err, UserError::Recoverable(KernErr::Again, NextTask::Same));
    }

    #[test]
    fn kill_destroys_target_and_notifies_parent() {
        let (mut t, a, b) = two_envs();
        let (_, next) = sigqueue(&mut t, a, t.get(b).id, signal::KILL, 0).unwrap();
        assert_eq!(next, NextTask::Same);
        assert_eq!(t.get(b).status, EnvStatus::Free);
        assert_eq!(t.get(a).sig.queue.len(), 1);
    }

    #[test]
    fn stop_then_cont_round_trips_and_respects_nocldstop() {
        let (mut t, a, b) = two_envs();
        t.get_mut(a).sig.actions[signal::CHLD as usize] =
            Sigaction { handler: 0x1000, mask: 0, flags: SaFlags::NOCLDSTOP.bits() };
        sigqueue(&mut t, a, t.get(b).id, signal::STOP, 0).unwrap();
        assert!(t.get(b).stopped);
        assert_eq!(t.get(a).sig.queue.len(), 0);

        sigqueue(&mut t, a, t.get(b).id, signal::CONT, 0).unwrap();
        assert!(!t.get(b).stopped);
        assert_eq!(t.get(a).sig.queue.len(), 0);
    }

    #[test]
    fn sigaction_rejects_unblockable_signals() {
        let (mut t, a, _b) = two_envs();
        assert!(sigaction(&mut t, a, signal::KILL, 0, 0).is_err());
    }

    #[test]
    fn sigaction_round_trips_old_action() {
        let (mut t, a, _b) = two_envs();
        t.get_mut(a).address_space = crate::arch::AddressSpace::new(64);
        let act = Sigaction { handler: 0x2000, mask: 0, flags: SaFlags::SIGINFO.bits() };
        t.get_mut(a).address_space.write_u32(24, act.handler).unwrap();
        t.get_mut(a).address_space.write_u32(28, act.mask).unwrap();
        t.get_mut(a).address_space.write_u32(32, act.flags).unwrap();

        // Install the new action at USR1 (act_ptr = 24), capturing the
        // previous one (oldact_ptr = 16) — which should still be SIG_DFL.
        sigaction(&mut t, a, signal::USR1, 24, 16).unwrap();
        let old_handler = t.get(a).address_space.read_u32(16).unwrap();
        assert_eq!(old_handler, abi::SIG_DFL);
        assert_eq!(t.get(a).sig.actions[signal::USR1 as usize], act);

        // A later query-only call (oldact_ptr = 40) reports the action just set.
        sigaction(&mut t, a, signal::USR1, 0, 40).unwrap();
        let reported = t.get(a).address_space.read_u32(40).unwrap();
        assert_eq!(reported, act.handler);
    }

    #[test]
    fn sigprocmask_block_and_unblock() {
        let (mut t, a, _b) = two_envs();
        t.get_mut(a).address_space = crate::arch::AddressSpace::new(64);
        let both = signal::bit(signal::USR1) | signal::bit(signal::USR2);
        t.get_mut(a).address_space.write_u32(8, both).unwrap();

        sigprocmask(&mut t, a, signal::SIG_BLOCK, 8, 0).unwrap();
        assert_eq!(t.get(a).sig.mask, both);

        t.get_mut(a)
            .address_space
            .write_u32(16, signal::bit(signal::USR1))
            .unwrap();
        sigprocmask(&mut t, a, signal::SIG_UNBLOCK, 16, 0).unwrap();
        assert_eq!(t.get(a).sig.mask, signal::bit(signal::USR2));

        sigprocmask(&mut t, a, signal::SIG_SETMASK, 8, 24).unwrap();
        assert_eq!(t.get(a).sig.mask, both);
        let old = t.get(a).address_space.read_u32(24).unwrap();
        assert_eq!(old, signal::bit(signal::USR2));
    }

    #[test]
    fn sigprocmask_masks_out_unblockable_bits() {
        let (mut t, a, _b) = two_envs();
        t.get_mut(a).address_space = crate::arch::AddressSpace::new(32);
        t.get_mut(a)
            .address_space
            .write_u32(0, signal::UNBLOCKABLE_MASK | signal::bit(signal::USR1))
            .unwrap();
        sigprocmask(&mut t, a, signal::SIG_SETMASK, 0, 0).unwrap();
        assert_eq!(t.get(a).sig.mask, signal::bit(signal::USR1));
    }

    #[test]
    fn sigwait_unblockable_mask_is_rejected() {
        let (mut t, a, _b) = two_envs();
        let err = sigwait(&mut t, a, signal::bit(signal::KILL), 0).unwrap_err();
        assert_eq!(err, UserError::Recoverable(KernErr::Inval, NextTask::Same));
    }
}
