// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! The only backend this teaching kernel implements is [`sim`], a host
//! simulator: a plain register-array `SavedState` standing in for a trap
//! frame, and a `Vec<u8>`-backed `AddressSpace` standing in for a real
//! MMU-protected region set. Real hardware backends (Cortex-M, RISC-V, ...)
//! would live alongside it here, selected the same way.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(not(target_os = "none"))] {
        pub mod sim;
        pub use sim::{now, AddressSpace, SavedState};
    } else {
        compile_error!(
            "no bare-metal arch backend is implemented; build for a hosted \
             target to use the `sim` backend"
        );
    }
}

/// Architecture-independent view of a saved register frame: syscall
/// arguments in, return values out. Lets the rest of the kernel be written
/// without reference to a specific register file.
pub trait ArchState {
    fn arg0(&self) -> u32;
    fn arg1(&self) -> u32;
    fn arg2(&self) -> u32;
    fn arg3(&self) -> u32;
    fn arg4(&self) -> u32;
    fn arg5(&self) -> u32;
    fn arg6(&self) -> u32;

    fn ret0(&mut self, x: u32);
    fn ret1(&mut self, x: u32);
    fn ret2(&mut self, x: u32);
    fn ret3(&mut self, x: u32);
    fn ret4(&mut self, x: u32);
    fn ret5(&mut self, x: u32);
}
