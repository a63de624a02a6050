// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host simulator backend.
//!
//! Stands in for the real trap/upcall machinery and MMU so the rest of the
//! kernel — the environment table, scheduler, and signal pipeline — can be
//! driven and tested from plain Rust without any target hardware. Only
//! compiled for hosted targets (`target_os != "none"`); see [`super`].

use byteorder::{ByteOrder, LittleEndian};

use super::ArchState;
use crate::err::{FaultInfo, UsageError};

/// On "kernel entry" the simulator hands over a record containing all
/// syscall arguments; on the way back out, the kernel fills in the return
/// values here for the simulator to hand back to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedState {
    args: [u32; 8],
    rets: [u32; 6],
}

impl SavedState {
    pub fn with_args(args: [u32; 8]) -> Self {
        SavedState {
            args,
            rets: [0; 6],
        }
    }

    pub fn rets(&self) -> [u32; 6] {
        self.rets
    }
}

impl ArchState for SavedState {
    fn arg0(&self) -> u32 {
        self.args[0]
    }
    fn arg1(&self) -> u32 {
        self.args[1]
    }
    fn arg2(&self) -> u32 {
        self.args[2]
    }
    fn arg3(&self) -> u32 {
        self.args[3]
    }
    fn arg4(&self) -> u32 {
        self.args[4]
    }
    fn arg5(&self) -> u32 {
        self.args[5]
    }
    fn arg6(&self) -> u32 {
        self.args[6]
    }

    fn ret0(&mut self, x: u32) {
        self.rets[0] = x;
    }
    fn ret1(&mut self, x: u32) {
        self.rets[1] = x;
    }
    fn ret2(&mut self, x: u32) {
        self.rets[2] = x;
    }
    fn ret3(&mut self, x: u32) {
        self.rets[3] = x;
    }
    fn ret4(&mut self, x: u32) {
        self.rets[4] = x;
    }
    fn ret5(&mut self, x: u32) {
        self.rets[5] = x;
    }
}

/// A simulated address space: a flat byte buffer addressed starting at
/// virtual address 0. Real region mapping, protection and fault delivery on
/// bad access are collaborators this core doesn't redesign; this gives
/// kernel code a believable stand-in to read and write user pointers
/// against.
#[derive(Debug, Default)]
pub struct AddressSpace {
    memory: std::vec::Vec<u8>,
}

impl AddressSpace {
    pub fn new(size: usize) -> Self {
        AddressSpace {
            memory: std::vec![0u8; size],
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn bounds_check(&self, addr: u32, len: usize) -> Result<(usize, usize), FaultInfo> {
        let start = addr as usize;
        let end = start
            .checked_add(len)
            .ok_or(FaultInfo::BadAddress { address: addr })?;
        if end > self.memory.len() {
            return Err(FaultInfo::BadAddress { address: addr });
        }
        Ok((start, end))
    }

    pub fn read_bytes(&self, addr: u32, out: &mut [u8]) -> Result<(), FaultInfo> {
        let (start, end) = self.bounds_check(addr, out.len())?;
        out.copy_from_slice(&self.memory[start..end]);
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), FaultInfo> {
        let (start, end) = self.bounds_check(addr, data.len())?;
        self.memory[start..end].copy_from_slice(data);
        Ok(())
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, FaultInfo> {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), FaultInfo> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(addr, &buf)
    }

    pub fn read_i32(&self, addr: u32) -> Result<i32, FaultInfo> {
        Ok(self.read_u32(addr)? as i32)
    }

    pub fn write_i32(&mut self, addr: u32, value: i32) -> Result<(), FaultInfo> {
        self.write_u32(addr, value as u32)
    }

    /// Loads a parsed ELF image's `PT_LOAD` segments into this address
    /// space, zero-filling the BSS tail of each segment (`p_memsz -
    /// p_filesz` bytes) as `load_icode` does in the teaching original.
    pub fn load_segment(&mut self, vaddr: u32, file_bytes: &[u8], memsz: usize) -> Result<(), UsageError> {
        if (vaddr as usize)
            .checked_add(memsz)
            .map(|end| end > self.memory.len())
            .unwrap_or(true)
        {
            return Err(UsageError::EnvOutOfRange);
        }
        let start = vaddr as usize;
        self.memory[start..start + file_bytes.len()].copy_from_slice(file_bytes);
        for b in &mut self.memory[start + file_bytes.len()..start + memsz] {
            *b = 0;
        }
        Ok(())
    }
}

/// Monotonic simulated time, in arbitrary ticks. The real kernel's
/// `GetTime` syscall and timer-driven preemption are out of scope for this
/// core (see the component table); this exists only so call sites that
/// need *a* clock compile.
pub fn now() -> u64 {
    0
}
