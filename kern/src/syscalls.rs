// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Syscall dispatch (C5).
//!
//! Maps the stable [`Sysnum`] values onto calls into [`lifecycle`],
//! [`signal`], and [`sched`], and reflects their `SysResult` back into the
//! caller's saved registers the way the teaching original's
//! `safe_syscall_entry` does: a recoverable error becomes a small negative
//! return value in `ret0`, an unrecoverable one takes the caller out of the
//! runnable set instead of ever reaching its registers at all.
//!
//! Region management and IPC (`AllocRegion`, `MapRegion`, `UnmapRegion`,
//! `RegionRefs`, `IpcTrySend`, `IpcRecv`) and console I/O (`Cputs`,
//! `Cgetc`) are assigned numbers in the ABI but not implemented by this
//! core; they dispatch to `KernErr::NoSys` like any other unrecognized
//! syscall.

use core::convert::TryFrom;

use abi::{EnvId, EnvType, KernErr, Sysnum};

use crate::arch::{ArchState, SavedState};
use crate::config::KernelConfig;
use crate::env::EnvTable;
use crate::err::{SysResult, UserError};
use crate::lifecycle::{self, Export};
use crate::sched::{self, NextTask, Scheduled};
use crate::signal;
use crate::trace::{Event, NullSink, Sink};

fn recoverable(err: KernErr) -> UserError {
    UserError::Recoverable(err, NextTask::Same)
}

/// The six syscall arguments beyond the syscall number itself (`arg0`).
struct Args {
    a1: u32,
    a2: u32,
    a3: u32,
    a4: u32,
    a5: u32,
    a6: u32,
}

fn read_args(table: &EnvTable, idx: usize) -> Args {
    let s = &table.get(idx).save;
    Args {
        a1: s.arg1(),
        a2: s.arg2(),
        a3: s.arg3(),
        a4: s.arg4(),
        a5: s.arg5(),
        a6: s.arg6(),
    }
}

fn decode_env_type(raw: u32) -> Result<EnvType, UserError> {
    match raw {
        0 => Ok(EnvType::User),
        1 => Ok(EnvType::Kernel),
        2 => Ok(EnvType::FileSystem),
        _ => Err(recoverable(KernErr::Inval)),
    }
}

fn decode_env_status(raw: u32) -> Result<abi::EnvStatus, UserError> {
    match raw {
        2 => Ok(abi::EnvStatus::Runnable),
        4 => Ok(abi::EnvStatus::NotRunnable),
        _ => Err(recoverable(KernErr::Inval)),
    }
}

/// Owns the environment table and the sink syscalls and the scheduler
/// report trace events to. Generic over `Sink` so an embedder that doesn't
/// care about tracing pays nothing for it — `NullSink::record` is an empty
/// function the optimizer removes entirely, and with neither `trace-envs`
/// nor `trace-signals` enabled the call sites compile away regardless of
/// which sink is installed.
pub struct Kernel<S: Sink = NullSink> {
    pub table: EnvTable,
    pub sink: S,
}

impl Kernel<NullSink> {
    pub fn new(config: KernelConfig) -> Self {
        Kernel {
            table: EnvTable::new(config),
            sink: NullSink,
        }
    }
}

impl<S: Sink> Kernel<S> {
    pub fn with_sink(config: KernelConfig, sink: S) -> Self {
        Kernel {
            table: EnvTable::new(config),
            sink,
        }
    }

    /// Loads `image` as the boot environment; see [`lifecycle::create_root`].
    pub fn boot(&mut self, ty: EnvType, image: &[u8], exports: &[Export]) -> Result<usize, KernErr> {
        lifecycle::create_root(&mut self.table, ty, image, exports)
    }

    /// Advances the scheduler by one step.
    pub fn schedule(&mut self) -> Scheduled {
        let scheduled = sched::step(&mut self.table);
        match scheduled {
            Scheduled::Resumed(index) => {
                trace_envs!(&mut self.sink, Event::Scheduled { index });
            }
            Scheduled::Deliver(index, signo, ..) => {
                trace_signals!(&mut self.sink, Event::SigDelivered { target: index, signo });
            }
            Scheduled::Halt => trace_envs!(&mut self.sink, Event::Halt),
            Scheduled::Monitor => {}
        }
        scheduled
    }

    /// Executes the syscall currently parked in `caller`'s saved registers:
    /// `arg0` is the syscall number, `arg1..arg6` its parameters. Writes the
    /// outcome into `caller`'s `ret0` (or faults it) and returns the
    /// resulting scheduling hint.
    pub fn dispatch(&mut self, caller: usize) -> NextTask {
        let sysnum_raw = self.table.get(caller).save.arg0();
        let sysnum = match Sysnum::try_from(sysnum_raw) {
            Ok(s) => s,
            Err(e) => {
                self.table.get_mut(caller).save.ret0(e.code() as u32);
                return NextTask::Same;
            }
        };
        let result = self.call(caller, sysnum);
        self.resolve(caller, result)
    }

    fn resolve(&mut self, caller: usize, result: SysResult) -> NextTask {
        match result {
            Ok((value, next)) => {
                self.table.get_mut(caller).save.ret0(value as u32);
                next
            }
            Err(UserError::Recoverable(err, next)) => {
                self.table.get_mut(caller).save.ret0(err.code() as u32);
                next
            }
            Err(UserError::Unrecoverable(fault)) => {
                self.table.fault(caller, fault);
                NextTask::Other
            }
        }
    }

    fn call(&mut self, caller: usize, sysnum: Sysnum) -> SysResult {
        let a = read_args(&self.table, caller);
        match sysnum {
            Sysnum::Cputs | Sysnum::Cgetc => Err(recoverable(KernErr::NoSys)),
            Sysnum::AllocRegion | Sysnum::MapRegion | Sysnum::UnmapRegion | Sysnum::RegionRefs => {
                Err(recoverable(KernErr::NoSys))
            }
            Sysnum::IpcTrySend | Sysnum::IpcRecv => Err(recoverable(KernErr::NoSys)),

            Sysnum::GetEnvId => Ok((self.table.get(caller).id.0 as i32, NextTask::Same)),
            Sysnum::GetTime => Ok((self.table.now() as i32, NextTask::Same)),

            Sysnum::EnvDestroy => lifecycle::destroy(&mut self.table, caller, EnvId(a.a1)),

            Sysnum::Exofork => {
                let ty = decode_env_type(a.a1)?;
                let idx = self
                    .table
                    .allocate(caller, ty)
                    .map_err(recoverable)?;
                trace_envs!(
                    &mut self.sink,
                    Event::EnvStatus { index: idx, status: abi::EnvStatus::Runnable }
                );
                Ok((self.table.get(idx).id.0 as i32, NextTask::Same))
            }

            Sysnum::EnvSetStatus => {
                let status = decode_env_status(a.a2)?;
                let result = lifecycle::set_status(&mut self.table, caller, EnvId(a.a1), status);
                if result.is_ok() {
                    if let Ok(idx) = self.table.resolve(EnvId(a.a1), caller, true) {
                        trace_envs!(&mut self.sink, Event::EnvStatus { index: idx, status });
                    }
                }
                result
            }

            Sysnum::EnvSetTrapframe => {
                let target = self
                    .table
                    .resolve(EnvId(a.a1), caller, true)
                    .map_err(recoverable)?;
                let ptr = a.a2;
                let mut args = [0u32; 8];
                for (i, slot) in args.iter_mut().enumerate() {
                    *slot = self
                        .table
                        .get(caller)
                        .address_space
                        .read_u32(ptr + (i as u32) * 4)
                        .map_err(UserError::from)?;
                }
                self.table.get_mut(target).save = SavedState::with_args(args);
                Ok((0, NextTask::Same))
            }

            Sysnum::EnvSetPgfaultUpcall => {
                let target = self
                    .table
                    .resolve(EnvId(a.a1), caller, true)
                    .map_err(recoverable)?;
                self.table.get_mut(target).pgfault_upcall = a.a2;
                Ok((0, NextTask::Same))
            }

            Sysnum::Yield => Ok((0, NextTask::Other)),

            Sysnum::SigQueue => {
                let target = EnvId(a.a1);
                let signo = a.a2;
                let value = a.a3 as i32;
                let result = signal::sigqueue(&mut self.table, caller, target, signo, value);
                match &result {
                    Ok(_) => trace_signals!(
                        &mut self.sink,
                        Event::SigEnqueued { target: a.a1 as usize, signo }
                    ),
                    Err(UserError::Recoverable(KernErr::Again, _)) => trace_signals!(
                        &mut self.sink,
                        Event::SigQueueFull { target: a.a1 as usize, signo }
                    ),
                    _ => {}
                }
                result
            }

            Sysnum::SigWait => {
                let mask = a.a1;
                let out_ptr = a.a2;
                let result = signal::sigwait(&mut self.table, caller, mask, out_ptr);
                if matches!(result, Ok((0, NextTask::Same))) {
                    trace_signals!(
                        &mut self.sink,
                        Event::SigDequeued { target: caller, signo: 0 }
                    );
                }
                result
            }

            Sysnum::SigAction => {
                signal::sigaction(&mut self.table, caller, a.a1, a.a2, a.a3)
            }

            Sysnum::SigProcMask => {
                signal::sigprocmask(&mut self.table, caller, a.a1, a.a2, a.a3)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::SavedState;
    use abi::signal;

    fn make_syscall(table: &mut EnvTable, idx: usize, sysnum: Sysnum, args: [u32; 7]) {
        let mut raw = [0u32; 8];
        raw[0] = sysnum as u32;
        raw[1..8].copy_from_slice(&args);
        table.get_mut(idx).save = SavedState::with_args(raw);
    }

    #[test]
    fn unknown_syscall_number_returns_nosys() {
        let mut k = Kernel::new(KernelConfig::with_capacity(2));
        let a = k.table.allocate_root(EnvType::User).unwrap();
        k.table.get_mut(a).save = SavedState::with_args([999, 0, 0, 0, 0, 0, 0, 0]);
        let next = k.dispatch(a);
        assert_eq!(next, NextTask::Same);
        assert_eq!(k.table.get(a).save.rets()[0] as i32, KernErr::NoSys.code());
    }

    #[test]
    fn get_env_id_returns_caller_id() {
        let mut k = Kernel::new(KernelConfig::with_capacity(2));
        let a = k.table.allocate_root(EnvType::User).unwrap();
        make_syscall(&mut k.table, a, Sysnum::GetEnvId, [0; 7]);
        k.dispatch(a);
        let id = k.table.get(a).id.0;
        assert_eq!(k.table.get(a).save.rets()[0], id);
    }

    #[test]
    fn exofork_allocates_child_of_caller() {
        let mut k = Kernel::new(KernelConfig::with_capacity(4));
        let parent = k.table.allocate_root(EnvType::User).unwrap();
        make_syscall(&mut k.table, parent, Sysnum::Exofork, [0, 0, 0, 0, 0, 0, 0]);
        k.dispatch(parent);
        let child_id = EnvId(k.table.get(parent).save.rets()[0]);
        let child = k.table.resolve(child_id, parent, true).unwrap();
        assert_eq!(k.table.get(child).parent_id, k.table.get(parent).id);
    }

    #[test]
    fn sigqueue_then_sigwait_round_trip_through_dispatch() {
        let mut k = Kernel::new(KernelConfig::with_capacity(4));
        let a = k.table.allocate_root(EnvType::User).unwrap();
        let b = k.table.allocate(a, EnvType::User).unwrap();
        k.table.get_mut(b).address_space = crate::arch::AddressSpace::new(16);
        let b_id = k.table.get(b).id;

        make_syscall(&mut k.table, a, Sysnum::SigQueue, [b_id.0, signal::USR1, 7, 0, 0, 0, 0]);
        let next = k.dispatch(a);
        assert_eq!(next, NextTask::Same);
        assert_eq!(k.table.get(a).save.rets()[0] as i32, 0);

        make_syscall(&mut k.table, b, Sysnum::SigWait, [signal::bit(signal::USR1), 0, 0, 0, 0, 0, 0]);
        k.dispatch(b);
        assert_eq!(k.table.get(b).save.rets()[0] as i32, 0);
        let delivered = k.table.get(b).address_space.read_u32(0).unwrap();
        assert_eq!(delivered, signal::USR1);
    }

    #[test]
    fn env_destroy_self_requests_switch() {
        let mut k = Kernel::new(KernelConfig::with_capacity(2));
        let a = k.table.allocate_root(EnvType::User).unwrap();
        make_syscall(&mut k.table, a, Sysnum::EnvDestroy, [0, 0, 0, 0, 0, 0, 0]);
        let next = k.dispatch(a);
        assert_eq!(next, NextTask::Other);
        assert_eq!(k.table.get(a).status, abi::EnvStatus::Free);
    }

    #[test]
    fn bad_address_in_sigaction_faults_caller_instead_of_returning() {
        let mut k = Kernel::new(KernelConfig::with_capacity(2));
        let a = k.table.allocate_root(EnvType::User).unwrap();
        // Address space defaults to empty; any nonzero act_ptr is out of bounds.
        make_syscall(&mut k.table, a, Sysnum::SigAction, [signal::USR1, 4, 0, 0, 0, 0, 0]);
        let next = k.dispatch(a);
        assert_eq!(next, NextTask::Other);
        assert_eq!(k.table.get(a).status, abi::EnvStatus::NotRunnable);
        assert!(k.table.get(a).last_fault.is_some());
    }
}
