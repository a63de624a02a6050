// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment lifecycle (C2): creating a fresh environment from an ELF
//! image, forking a child from a running one, and destroying an
//! environment.

use abi::{EnvId, EnvStatus, EnvType, KernErr};

use crate::env::EnvTable;
use crate::err::{FaultInfo, SysResult, UsageError};
use crate::sched::NextTask;
use crate::signal::{synth_sigchld, ChldReason};

/// A kernel-exported symbol binding: a name a loaded image may declare as
/// an extern `STT_OBJECT` global, and the address it should be patched
/// with. Mirrors `bind_functions` in the teaching original, which resolves
/// these through a kernel symbol table (`find_function`) rather than a
/// dynamic linker.
pub struct Export<'a> {
    pub name: &'a str,
    pub value: u32,
}

/// Creates the first environment of a fresh boot: allocates a parentless
/// slot, loads `image` as an ELF binary into it, and binds any of
/// `exports` the image declares as extern globals.
pub fn create_root(
    table: &mut EnvTable,
    ty: EnvType,
    image: &[u8],
    exports: &[Export],
) -> Result<usize, KernErr> {
    let idx = table.allocate_root(ty)?;
    load_image(table, idx, image, exports).map_err(|_| KernErr::InvalidExe)?;
    Ok(idx)
}

/// Forks a new child environment from `parent`, inheriting nothing but its
/// id as `parent_id` — unlike the teaching original's `fork`/`sfork`, which
/// copy the parent's address space page-by-page, this core's scope ends at
/// "a new environment exists with *some* code loaded into it"; copying a
/// live `AddressSpace` is a collaborator capability this module doesn't
/// reimplement. Callers load an image into the child the same way
/// [`create_root`] does.
pub fn exofork(
    table: &mut EnvTable,
    parent: usize,
    ty: EnvType,
    image: &[u8],
    exports: &[Export],
) -> Result<usize, KernErr> {
    let idx = table.allocate(parent, ty)?;
    load_image(table, idx, image, exports).map_err(|_| KernErr::InvalidExe)?;
    Ok(idx)
}

fn load_image(
    table: &mut EnvTable,
    idx: usize,
    image: &[u8],
    exports: &[Export],
) -> Result<(), envelf::ElfError> {
    let phnum = envelf::program_headers_count(image).ok_or(envelf::ElfError::InvalidMagic)?;
    let mut phdr_buf = [envelf::Elf64Phdr::default(); 16];
    if phnum > phdr_buf.len() {
        return Err(envelf::ElfError::OutOfBounds("program header scratch buffer"));
    }
    let parsed = envelf::parse_elf(image, &mut phdr_buf[..phnum])?;

    let env = table.get_mut(idx);
    // Size the simulated address space to cover every loadable segment;
    // a real kernel would map each segment's own pages instead.
    let highest = parsed
        .program_headers
        .iter()
        .filter(|p| p.p_type == envelf::PT_LOAD)
        .map(|p| p.p_vaddr + p.p_memsz)
        .max()
        .unwrap_or(0);
    env.address_space = crate::arch::AddressSpace::new(highest as usize);

    for phdr in parsed.program_headers {
        if phdr.p_type != envelf::PT_LOAD {
            continue;
        }
        let file_bytes = &image[phdr.p_offset as usize..(phdr.p_offset + phdr.p_filesz) as usize];
        env.address_space
            .load_segment(phdr.p_vaddr as u32, file_bytes, phdr.p_memsz as usize)
            .map_err(|_| envelf::ElfError::OutOfBounds("segment exceeds address space"))?;
    }

    envelf::for_each_global_object(image, |sym| {
        if let Some(export) = exports.iter().find(|e| e.name == sym.name) {
            let _ = env.address_space.write_u32(sym.value_vaddr as u32, export.value);
            true
        } else {
            false
        }
    })?;

    Ok(())
}

/// The `env_destroy` syscall: releases `target`'s slot, notifies its
/// parent with a synthesized `SIGCHLD`, and — if the caller destroyed
/// itself — hands back a scheduling hint so the dispatcher picks someone
/// else to run.
pub fn destroy(table: &mut EnvTable, caller: usize, target: EnvId) -> SysResult {
    let idx = table
        .resolve(target, caller, true)
        .map_err(|e| crate::err::UserError::Recoverable(e, NextTask::Same))?;

    synth_sigchld(table, idx, ChldReason::Exited);
    table.free(idx);

    let next = if idx == caller {
        NextTask::Other
    } else {
        NextTask::Same
    };
    Ok((0, next))
}

/// The `env_set_status` syscall: transitions `target` between `Runnable`
/// and `NotRunnable`. Any other requested status is a usage fault — the
/// teaching original rejects attempts to set `RUNNING`, `DYING`, or `FREE`
/// directly, since those are kernel-internal bookkeeping states.
pub fn set_status(
    table: &mut EnvTable,
    caller: usize,
    target: EnvId,
    status: EnvStatus,
) -> SysResult {
    if !matches!(status, EnvStatus::Runnable | EnvStatus::NotRunnable) {
        return Err(FaultInfo::SyscallUsage(UsageError::EnvOutOfRange).into());
    }
    let idx = table
        .resolve(target, caller, true)
        .map_err(|e| crate::err::UserError::Recoverable(e, NextTask::Same))?;
    table.get_mut(idx).status = status;
    let next = if idx == caller && status != EnvStatus::Runnable {
        NextTask::Other
    } else {
        NextTask::Same
    };
    Ok((0, next))
}
