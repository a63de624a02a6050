// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The environment table (C1): generational ids, a fixed-size slot array,
//! and the free list used to hand out fresh slots.

use abi::{signal, EnqueuedSignal, EnvId, EnvStatus, EnvType, KernErr, Sigaction};

use crate::arch::{self, AddressSpace, SavedState};
use crate::config::KernelConfig;

/// Compile-time ceiling on the number of environment slots any build of
/// this kernel can address. [`KernelConfig::capacity`] picks how many of
/// these are actually live for a given boot.
pub const MAX_ENVS: usize = 64;

/// Depth of each environment's pending-signal queue. Fixed, like the
/// teaching original's `SIGNALS_QUEUE_SIZE` — not configurable per boot.
pub const MAX_QUEUE: usize = 16;

/// A bounded circular queue of signals awaiting delivery to one
/// environment, in enqueue order.
#[derive(Debug, Clone, Copy)]
pub struct SignalQueue {
    entries: [EnqueuedSignal; MAX_QUEUE],
    head: usize,
    len: usize,
}

impl SignalQueue {
    const fn new() -> Self {
        SignalQueue {
            entries: [EnqueuedSignal {
                signo: 0,
                info: abi::SigInfo {
                    signo: 0,
                    code: 0,
                    sender: 0,
                    addr: 0,
                    value: 0,
                },
                action: Sigaction::DFL,
            }; MAX_QUEUE],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == MAX_QUEUE
    }

    fn logical(&self, i: usize) -> usize {
        (self.head + i) % MAX_QUEUE
    }

    /// Appends a signal to the tail of the queue. Returns `false` (and
    /// leaves the queue untouched) if the queue is already full — callers
    /// report this to `sigqueue`'s caller as `EAGAIN`.
    pub fn push(&mut self, sig: EnqueuedSignal) -> bool {
        if self.is_full() {
            return false;
        }
        let idx = self.logical(self.len);
        self.entries[idx] = sig;
        self.len += 1;
        true
    }

    /// Removes the entry at logical position `i`, shifting later entries
    /// down by one to close the gap and preserve the relative order of
    /// everything else — the same compaction the original's
    /// `check_wait_for_signal` performs with two `memmove` cases (wrap and
    /// non-wrap). Expressing it as index shifts over the logical view makes
    /// both cases the same code.
    fn remove_at(&mut self, i: usize) -> EnqueuedSignal {
        let idx = self.logical(i);
        let removed = self.entries[idx];
        for j in i..self.len - 1 {
            let from = self.logical(j + 1);
            let to = self.logical(j);
            self.entries[to] = self.entries[from];
        }
        self.len -= 1;
        removed
    }

    /// Finds the first queued signal whose bit is set in `mask` and removes
    /// it, preserving the order of the rest. Used by `sigwait`.
    pub fn take_matching(&mut self, mask: u32) -> Option<EnqueuedSignal> {
        for i in 0..self.len {
            let idx = self.logical(i);
            if mask & signal::bit(self.entries[idx].signo) != 0 {
                return Some(self.remove_at(i));
            }
        }
        None
    }

    /// Finds the first queued signal whose bit is *not* set in `blocked`
    /// and removes it. Used when the scheduler delivers a signal to a
    /// user-mode handler.
    pub fn take_deliverable(&mut self, blocked: u32) -> Option<EnqueuedSignal> {
        for i in 0..self.len {
            let idx = self.logical(i);
            if blocked & signal::bit(self.entries[idx].signo) == 0 {
                return Some(self.remove_at(i));
            }
        }
        None
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &EnqueuedSignal> {
        (0..self.len).map(move |i| &self.entries[self.logical(i)])
    }
}

/// Per-environment signal state: the process mask, the 32-entry `sigaction`
/// table, the pending-signal queue, and (when blocked in `sigwait`) what the
/// environment is waiting for.
#[derive(Debug, Clone, Copy)]
pub struct SignalState {
    /// Bitmask of currently blocked signals (`sigprocmask`).
    pub mask: u32,
    /// Disposition for each signal number; index 0 (RESERVED) is unused.
    pub actions: [Sigaction; 32],
    pub queue: SignalQueue,
    /// Non-zero while blocked in `sigwait`: the mask of signals being
    /// waited for.
    pub waiting_mask: u32,
    /// User pointer `sigwait` should write the delivered signal number to,
    /// valid only while `waiting_mask != 0`.
    pub waiting_out_ptr: u32,
}

impl SignalState {
    const fn new() -> Self {
        SignalState {
            mask: 0,
            actions: [Sigaction::DFL; 32],
            queue: SignalQueue::new(),
            waiting_mask: 0,
            waiting_out_ptr: 0,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_mask != 0
    }
}

/// A single environment (process) slot.
#[derive(Debug)]
pub struct Env {
    /// Full generational id of this slot's current occupant. Meaningless
    /// (but stable at `EnvId(0)`) while the slot is `Free`.
    pub id: EnvId,
    /// Monotonically increasing across reuses of this slot; never reset to
    /// zero once past its first allocation, so id collisions can't occur
    /// across a free/realloc cycle.
    pub generation: u32,
    pub status: EnvStatus,
    /// Set by `SIGSTOP`, cleared by `SIGCONT`. Independent of `status`: a
    /// `Runnable` environment that is stopped is not eligible to run.
    pub stopped: bool,
    pub ty: EnvType,
    pub parent_id: EnvId,
    pub run_count: u32,
    pub save: SavedState,
    pub address_space: AddressSpace,
    /// Virtual address of the installed signal upcall, or 0 if none has
    /// been registered yet.
    pub pgfault_upcall: u32,
    pub sig: SignalState,
    /// Set when a syscall determined this environment's arguments couldn't
    /// be trusted enough to act on; cleared on the next successful
    /// allocation of the slot. Surfaced to a debugger/monitor rather than
    /// to the faulting environment itself.
    pub last_fault: Option<crate::err::FaultInfo>,
    /// Free-list link, meaningful only while `status == Free`.
    free_next: Option<usize>,
}

impl Env {
    fn free_slot() -> Self {
        Env {
            id: EnvId(0),
            generation: 0,
            status: EnvStatus::Free,
            stopped: false,
            ty: EnvType::User,
            parent_id: EnvId(0),
            run_count: 0,
            save: SavedState::default(),
            address_space: AddressSpace::default(),
            pgfault_upcall: 0,
            sig: SignalState::new(),
            last_fault: None,
            free_next: None,
        }
    }

    pub fn is_runnable_state(&self) -> bool {
        !self.stopped && matches!(self.status, EnvStatus::Runnable | EnvStatus::Running)
    }
}

/// The environment table: a fixed array of [`Env`] slots, a free list, and
/// the bookkeeping ([`index_bits`]) needed to mint and validate
/// [`EnvId`]s against it.
pub struct EnvTable {
    envs: [Env; MAX_ENVS],
    capacity: usize,
    index_bits: u32,
    free_head: Option<usize>,
    current: Option<usize>,
    enforce_sigqueue_permission: bool,
}

fn bits_for(n: usize) -> u32 {
    let n = n.max(1);
    if n == 1 {
        1
    } else {
        32 - (n as u32 - 1).leading_zeros()
    }
}

impl EnvTable {
    pub fn new(config: KernelConfig) -> Self {
        let capacity = config.clamped_capacity();
        let mut envs = core::array::from_fn(|_| Env::free_slot());
        for i in 0..capacity {
            envs[i].free_next = if i + 1 < capacity { Some(i + 1) } else { None };
        }
        EnvTable {
            envs,
            capacity,
            index_bits: bits_for(capacity),
            free_head: if capacity > 0 { Some(0) } else { None },
            current: None,
            enforce_sigqueue_permission: config.enforce_sigqueue_permission,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }

    /// Whether `sigqueue` should enforce its self-or-child target check,
    /// per [`KernelConfig::enforce_sigqueue_permission`].
    pub fn enforce_sigqueue_permission(&self) -> bool {
        self.enforce_sigqueue_permission
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn get(&self, idx: usize) -> &Env {
        &self.envs[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Env {
        &mut self.envs[idx]
    }

    pub fn slots(&self) -> &[Env] {
        &self.envs[..self.capacity]
    }

    /// Resolves an `EnvId` as seen by `caller` into a table index.
    ///
    /// `EnvId::SELF` (0) always resolves to `caller`. Any other id must name
    /// a non-`Free` slot whose stamped generation matches; if
    /// `must_be_self_or_child`, it must additionally name `caller` itself or
    /// one of `caller`'s direct children, mirroring this kernel's
    /// self-or-child scoping for signal delivery.
    pub fn resolve(
        &self,
        id: EnvId,
        caller: usize,
        must_be_self_or_child: bool,
    ) -> Result<usize, KernErr> {
        if id.is_self() {
            return Ok(caller);
        }
        let idx = id.index(self.index_bits);
        if idx >= self.capacity {
            return Err(KernErr::BadEnv);
        }
        let env = &self.envs[idx];
        if env.status == EnvStatus::Free {
            return Err(KernErr::BadEnv);
        }
        if env.generation != id.generation(self.index_bits) {
            return Err(KernErr::BadEnv);
        }
        if must_be_self_or_child && idx != caller && env.parent_id != self.envs[caller].id {
            return Err(KernErr::BadEnv);
        }
        Ok(idx)
    }

    /// Pops a slot off the free list, bumps its generation, and installs a
    /// fresh `Env` with the given parent/type. Leaves the new slot
    /// `Runnable`-but-uninitialized; callers (the lifecycle module) load
    /// code into it before it can usefully run.
    pub fn allocate(&mut self, parent: usize, ty: EnvType) -> Result<usize, KernErr> {
        let parent_id = self.envs[parent].id;
        self.allocate_with_parent(parent_id, ty)
    }

    /// Allocates a slot with no parent (`parent_id` is the sentinel
    /// `EnvId(0)`, which no live environment can ever be stamped with,
    /// since generations start at 1). Used only for the first environment
    /// created at boot.
    pub fn allocate_root(&mut self, ty: EnvType) -> Result<usize, KernErr> {
        self.allocate_with_parent(EnvId(0), ty)
    }

    fn allocate_with_parent(&mut self, parent_id: EnvId, ty: EnvType) -> Result<usize, KernErr> {
        let idx = self.free_head.ok_or(KernErr::NoFreeEnv)?;
        self.free_head = self.envs[idx].free_next;

        let generation = match self.envs[idx].generation.checked_add(1) {
            Some(0) | None => 1,
            Some(g) => g,
        };

        self.envs[idx] = Env {
            id: EnvId::pack(generation, idx, self.index_bits),
            generation,
            status: EnvStatus::Runnable,
            stopped: false,
            ty,
            parent_id,
            run_count: 0,
            save: SavedState::default(),
            address_space: AddressSpace::default(),
            pgfault_upcall: 0,
            sig: SignalState::new(),
            last_fault: None,
            free_next: None,
        };
        Ok(idx)
    }

    /// Releases a slot back to the free list. Its generation is preserved
    /// on the (now-`Free`) `Env` record so the next `allocate` bumps from
    /// it rather than resetting.
    pub fn free(&mut self, idx: usize) {
        let generation = self.envs[idx].generation;
        self.envs[idx] = Env::free_slot();
        self.envs[idx].generation = generation;
        self.envs[idx].free_next = self.free_head;
        self.free_head = Some(idx);
        if self.current == Some(idx) {
            self.current = None;
        }
    }

    /// Marks `idx` as the running environment, demoting whatever was
    /// running before back to `Runnable`.
    pub fn set_running(&mut self, idx: usize) {
        if let Some(prev) = self.current {
            if prev != idx && self.envs[prev].status == EnvStatus::Running {
                self.envs[prev].status = EnvStatus::Runnable;
            }
        }
        self.current = Some(idx);
        self.envs[idx].status = EnvStatus::Running;
        self.envs[idx].run_count += 1;
    }

    /// `arch::now()` pass-through, kept here so callers don't need to know
    /// which arch backend is selected.
    pub fn now(&self) -> u64 {
        arch::now()
    }

    /// Takes `idx` out of the runnable set following an unrecoverable
    /// syscall error, recording why. A faulted environment stays allocated
    /// (its parent can still observe and `env_destroy` it) but never runs
    /// again until something calls `env_set_status` on it.
    pub fn fault(&mut self, idx: usize, info: crate::err::FaultInfo) {
        self.envs[idx].last_fault = Some(info);
        self.envs[idx].status = EnvStatus::NotRunnable;
        if self.current == Some(idx) {
            self.current = None;
        }
    }
}
