// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common error-handling support.
//!
//! Two levels, mirroring the split between "the syscall failed, tell the
//! caller why" and "the caller did something the kernel can't make sense
//! of, fault it instead of returning": [`KernErr`] (from `abi`) crosses the
//! syscall boundary as a small negative return code, while [`FaultInfo`]
//! never reaches user code directly — it's recorded against the offending
//! environment and observed later (e.g. via `waitpid`-style inspection),
//! the same way this kernel's teaching-corpus counterpart handles
//! `force_fault`.

use abi::KernErr;

use crate::sched::NextTask;

/// Outcome of a syscall implementation, at the granularity the dispatcher
/// needs: either a recoverable condition the caller should see as an error
/// code (along with a scheduling hint), or a fault that knocks the
/// offending environment out of the runnable set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserError {
    Recoverable(KernErr, NextTask),
    Unrecoverable(FaultInfo),
}

impl UserError {
    pub fn recoverable(err: KernErr) -> Self {
        UserError::Recoverable(err, NextTask::Same)
    }
}

/// Result type shared by every syscall implementation: on success, the
/// value that belongs in the caller's return register plus a scheduling
/// hint; on failure, either an error code to deliver the same way
/// ([`UserError::Recoverable`]) or a fault that takes the caller out of
/// the runnable set entirely ([`UserError::Unrecoverable`]).
pub type SysResult = Result<(i32, NextTask), UserError>;

impl From<UsageError> for UserError {
    fn from(e: UsageError) -> Self {
        UserError::Unrecoverable(FaultInfo::SyscallUsage(e))
    }
}

impl From<FaultInfo> for UserError {
    fn from(f: FaultInfo) -> Self {
        UserError::Unrecoverable(f)
    }
}

/// A record describing a fault taken by an environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultInfo {
    /// The environment addressed memory it has no business touching —
    /// either by faulting while running, or by passing a bad pointer to a
    /// syscall.
    BadAddress { address: u32 },
    /// Arguments passed to a syscall were invalid in a way that can't be
    /// reported as an ordinary error code, because the arguments
    /// themselves couldn't be trusted enough to act on.
    SyscallUsage(UsageError),
}

impl From<UsageError> for FaultInfo {
    fn from(e: UsageError) -> Self {
        FaultInfo::SyscallUsage(e)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageError {
    /// A program used an undefined syscall number.
    BadSyscallNumber,
    /// A program named an environment id that is out of range for the
    /// current table.
    EnvOutOfRange,
    /// A signal number outside `1..=31` was used somewhere that requires a
    /// real signal.
    BadSignalNumber,
}
