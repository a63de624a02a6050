// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-level ABI shared between the kernel and user-mode code: env ids,
//! syscall numbers, error codes, and the signal protocol types that cross
//! the syscall boundary.

#![no_std]

use serde::{Deserialize, Serialize};
use zerocopy::{AsBytes, FromBytes};

/// A generationally-stamped environment id.
///
/// Bit layout is `(generation << index_bits) | index`. `index_bits` is a
/// property of the table the id was minted from, not of the id itself, so
/// encoding/decoding takes it as a parameter rather than baking in a fixed
/// table size here.
#[repr(transparent)]
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, AsBytes, FromBytes,
)]
pub struct EnvId(pub u32);

impl EnvId {
    /// Id zero always means "the calling environment" in syscall arguments.
    pub const SELF: EnvId = EnvId(0);

    pub fn is_self(self) -> bool {
        self.0 == 0
    }

    pub fn index(self, index_bits: u32) -> usize {
        (self.0 & ((1u32 << index_bits) - 1)) as usize
    }

    pub fn generation(self, index_bits: u32) -> u32 {
        self.0 >> index_bits
    }

    pub fn pack(generation: u32, index: usize, index_bits: u32) -> EnvId {
        EnvId((generation << index_bits) | index as u32)
    }
}

/// Kind of environment; affects I/O-privilege flag only.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[repr(u32)]
pub enum EnvType {
    User = 0,
    Kernel = 1,
    FileSystem = 2,
}

/// Run state of an environment slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[repr(u32)]
pub enum EnvStatus {
    Free = 0,
    Dying = 1,
    Runnable = 2,
    Running = 3,
    NotRunnable = 4,
}

/// Stable small-negative error codes returned across the syscall boundary.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum KernErr {
    BadEnv = -1,
    NoFreeEnv = -2,
    NoMem = -3,
    Inval = -4,
    Again = -5,
    IpcNotRecv = -6,
    InvalidExe = -7,
    NoSys = -8,
}

impl KernErr {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl core::fmt::Display for KernErr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            KernErr::BadEnv => "bad env",
            KernErr::NoFreeEnv => "no free env",
            KernErr::NoMem => "no mem",
            KernErr::Inval => "invalid argument",
            KernErr::Again => "try again",
            KernErr::IpcNotRecv => "not receiving",
            KernErr::InvalidExe => "invalid executable",
            KernErr::NoSys => "no such syscall",
        };
        f.write_str(s)
    }
}

/// Stable syscall dispatch numbers (§6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum Sysnum {
    Cputs = 0,
    Cgetc = 1,
    GetEnvId = 2,
    EnvDestroy = 3,
    AllocRegion = 4,
    MapRegion = 5,
    UnmapRegion = 6,
    RegionRefs = 7,
    Exofork = 8,
    EnvSetStatus = 9,
    EnvSetTrapframe = 10,
    EnvSetPgfaultUpcall = 11,
    Yield = 12,
    IpcTrySend = 13,
    IpcRecv = 14,
    GetTime = 15,
    SigQueue = 16,
    SigWait = 17,
    SigAction = 18,
    SigProcMask = 19,
}

impl core::convert::TryFrom<u32> for Sysnum {
    type Error = KernErr;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use Sysnum::*;
        Ok(match value {
            0 => Cputs,
            1 => Cgetc,
            2 => GetEnvId,
            3 => EnvDestroy,
            4 => AllocRegion,
            5 => MapRegion,
            6 => UnmapRegion,
            7 => RegionRefs,
            8 => Exofork,
            9 => EnvSetStatus,
            10 => EnvSetTrapframe,
            11 => EnvSetPgfaultUpcall,
            12 => Yield,
            13 => IpcTrySend,
            14 => IpcRecv,
            15 => GetTime,
            16 => SigQueue,
            17 => SigWait,
            18 => SigAction,
            19 => SigProcMask,
            _ => return Err(KernErr::NoSys),
        })
    }
}

/// Signal numbers (§6). 1-based, 1..31; 0 and 32 are sentinels.
pub mod signal {
    pub const RESERVED: u32 = 0;
    pub const INT: u32 = 2;
    pub const KILL: u32 = 9;
    pub const USR1: u32 = 10;
    pub const USR2: u32 = 12;
    pub const TERM: u32 = 15;
    pub const CHLD: u32 = 17;
    pub const STOP: u32 = 18;
    pub const CONT: u32 = 19;
    pub const SIGMAX: u32 = 32;

    /// Mask with exactly the unblockable signals' bits set.
    pub const UNBLOCKABLE_MASK: u32 = bit(RESERVED) | bit(KILL) | bit(STOP) | bit(CONT);

    pub const fn bit(signo: u32) -> u32 {
        1u32 << signo
    }

    pub fn is_unblockable(signo: u32) -> bool {
        signo == RESERVED || signo == KILL || signo == STOP || signo == CONT
    }

    pub fn in_range(signo: u32) -> bool {
        signo >= 1 && signo <= 31
    }

    /// `sigprocmask` `how` values (§9: chosen over the `sigsetmask`
    /// convention, which only supports a single replace-the-mask mode).
    pub const SIG_BLOCK: u32 = 0;
    pub const SIG_UNBLOCK: u32 = 1;
    pub const SIG_SETMASK: u32 = 2;
}

bitflags::bitflags! {
    /// Recognized `sa_flags` bits (§6). Any other bit is `INVAL`.
    #[derive(Default)]
    pub struct SaFlags: u32 {
        const SIGINFO   = 0x0000_0004;
        const NODEFER   = 0x4000_0000;
        const RESETHAND = 0x8000_0000;
        /// Extension: suppress SIGCHLD synthesis for STOP/CONT.
        const NOCLDSTOP = 0x0000_0001;
    }
}

/// Sentinel handler addresses, POSIX-style: 0 is `SIG_DFL`, 1 is `SIG_IGN`.
/// Any other value is a user-mode function pointer.
pub const SIG_DFL: u32 = 0;
pub const SIG_IGN: u32 = 1;

/// Wire form of a `sigaction` entry, value-copied into queued signals so a
/// later `sigaction` call never races an in-flight delivery.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsBytes, FromBytes)]
pub struct Sigaction {
    pub handler: u32,
    pub mask: u32,
    pub flags: u32,
}

impl Sigaction {
    pub const DFL: Sigaction = Sigaction {
        handler: SIG_DFL,
        mask: 0,
        flags: 0,
    };

    pub fn flags(&self) -> SaFlags {
        SaFlags::from_bits_truncate(self.flags)
    }

    pub fn is_default(&self) -> bool {
        self.handler == SIG_DFL
    }

    pub fn is_ignored(&self) -> bool {
        self.handler == SIG_IGN
    }
}

impl Default for Sigaction {
    fn default() -> Self {
        Sigaction::DFL
    }
}

/// Wire form of `siginfo_t`, restricted to the fields this core touches.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AsBytes, FromBytes)]
pub struct SigInfo {
    pub signo: u32,
    pub code: i32,
    pub sender: u32,
    pub addr: u32,
    pub value: i32,
}

impl SigInfo {
    pub fn new(signo: u32, sender: EnvId, value: i32) -> Self {
        SigInfo {
            signo,
            code: 0,
            sender: sender.0,
            addr: 0,
            value,
        }
    }
}

/// A signal queued for delivery, carrying a value-copy snapshot of the
/// sigaction in effect at enqueue time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnqueuedSignal {
    pub signo: u32,
    pub info: SigInfo,
    pub action: Sigaction,
}
