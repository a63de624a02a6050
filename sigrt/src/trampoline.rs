// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The C6 dispatch contract: given the `EnqueuedSignal` snapshot the kernel
//! staged for this upcall and the interrupted user trap frame, decide
//! `DFL`/`IGN`/user-handler per §4.6, apply the re-entrancy mask around a
//! user-handler invocation per §4.4's "State machine for a handled signal",
//! and report what happened so the real trampoline entry point (a `naked`
//! asm shim on real hardware, out of scope here) knows whether to resume the
//! interrupted frame or has already destroyed the environment.

use abi::{signal, EnqueuedSignal, SaFlags};

use crate::sys::RawSyscalls;

/// The interrupted user context, as captured on the alternate upcall stack
/// when the kernel staged this delivery. Mirrors the shape of
/// `kern::arch::SavedState` (general-purpose registers, instruction
/// pointer, flags) but is owned by this crate since it's a *user*-visible
/// structure: the trampoline reads it to build a `ucontext`-style argument
/// for `SA_SIGINFO` handlers and restores it verbatim afterward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UTrapFrame {
    pub regs: [u32; 8],
    pub pc: u32,
    pub flags: u32,
}

/// How the trampoline actually resolves a handler address into a call.
/// Real code transmutes `Sigaction::handler` into an `extern "C" fn`
/// pointer and calls it directly; tests implement this with a recording
/// fake so [`dispatch`] is exercised without ever calling through raw
/// memory.
pub trait HandlerInvoker {
    fn call_handler(&mut self, addr: u32, signo: u32);
    fn call_sigaction(&mut self, addr: u32, signo: u32, info: &abi::SigInfo, frame: &UTrapFrame);
}

/// What [`dispatch`] did with a delivered signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// `SIG_DFL`: the environment destroyed itself; execution does not
    /// resume the interrupted frame.
    Destroyed,
    /// `SIG_IGN`: dropped without invoking anything.
    Ignored,
    /// A user handler ran to completion; the interrupted frame should now
    /// be resumed.
    Handled,
}

/// Runs the C6 state machine (§4.4, §4.6) for one delivered signal.
///
/// `frame` is the interrupted context; it's passed to `SA_SIGINFO` handlers
/// but never mutated here — resuming it is the caller's job once this
/// returns `Outcome::Handled` or `Outcome::Ignored`.
pub fn dispatch<S: RawSyscalls, H: HandlerInvoker>(
    sys: &mut S,
    invoker: &mut H,
    snapshot: &EnqueuedSignal,
    frame: &UTrapFrame,
) -> Outcome {
    let action = snapshot.action;

    if action.is_default() {
        // Without an upcall the kernel would have destroyed us already
        // (§4.4's `sigqueue`); a DFL snapshot reaching the trampoline means
        // the action was set to DFL *after* enqueue but before delivery —
        // the snapshot still says what to do, so we finish the job here.
        let self_id = sys.getenvid();
        sys.env_destroy(self_id);
        return Outcome::Destroyed;
    }
    if action.is_ignored() {
        return Outcome::Ignored;
    }

    let flags = action.flags();
    let prior_mask = if flags.contains(SaFlags::NODEFER) {
        None
    } else {
        let blocked = action.mask | signal::bit(snapshot.signo);
        Some(sys.sigprocmask(signal::SIG_BLOCK, Some(blocked)))
    };

    if flags.contains(SaFlags::SIGINFO) {
        invoker.call_sigaction(action.handler, snapshot.signo, &snapshot.info, frame);
    } else {
        invoker.call_handler(action.handler, snapshot.signo);
    }

    if let Some(old) = prior_mask {
        sys.sigprocmask(signal::SIG_SETMASK, Some(old));
    }

    Outcome::Handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::sim::RecordingSyscalls;
    use abi::{EnvId, SigInfo, Sigaction};

    #[derive(Default)]
    struct RecordingInvoker {
        handler_calls: std::vec::Vec<(u32, u32)>,
        sigaction_calls: std::vec::Vec<(u32, u32, SigInfo)>,
    }

    impl HandlerInvoker for RecordingInvoker {
        fn call_handler(&mut self, addr: u32, signo: u32) {
            self.handler_calls.push((addr, signo));
        }
        fn call_sigaction(&mut self, addr: u32, signo: u32, info: &SigInfo, _frame: &UTrapFrame) {
            self.sigaction_calls.push((addr, signo, *info));
        }
    }

    fn snapshot(signo: u32, action: Sigaction) -> EnqueuedSignal {
        EnqueuedSignal {
            signo,
            info: SigInfo::new(signo, EnvId(7), 42),
            action,
        }
    }

    #[test]
    fn default_action_destroys_self() {
        let mut sys = RecordingSyscalls::new(EnvId(3));
        let mut inv = RecordingInvoker::default();
        let sig = snapshot(signal::TERM, Sigaction::DFL);
        let outcome = dispatch(&mut sys, &mut inv, &sig, &UTrapFrame::default());
        assert_eq!(outcome, Outcome::Destroyed);
        assert_eq!(sys.destroyed, Some(EnvId(3)));
        assert!(inv.handler_calls.is_empty());
    }

    #[test]
    fn ignored_action_calls_nothing() {
        let mut sys = RecordingSyscalls::new(EnvId(3));
        let mut inv = RecordingInvoker::default();
        let act = Sigaction { handler: abi::SIG_IGN, mask: 0, flags: 0 };
        let sig = snapshot(signal::USR1, act);
        let outcome = dispatch(&mut sys, &mut inv, &sig, &UTrapFrame::default());
        assert_eq!(outcome, Outcome::Ignored);
        assert!(sys.destroyed.is_none());
        assert!(inv.handler_calls.is_empty());
    }

    #[test]
    fn siginfo_flag_selects_sigaction_call() {
        let mut sys = RecordingSyscalls::new(EnvId(3));
        let mut inv = RecordingInvoker::default();
        let act = Sigaction { handler: 0x4000, mask: 0, flags: SaFlags::SIGINFO.bits() };
        let sig = snapshot(signal::USR1, act);
        let outcome = dispatch(&mut sys, &mut inv, &sig, &UTrapFrame::default());
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(inv.sigaction_calls.len(), 1);
        assert_eq!(inv.sigaction_calls[0].2.value, 42);
        assert!(inv.handler_calls.is_empty());
    }

    #[test]
    fn without_siginfo_calls_plain_handler() {
        let mut sys = RecordingSyscalls::new(EnvId(3));
        let mut inv = RecordingInvoker::default();
        let act = Sigaction { handler: 0x4000, mask: 0, flags: 0 };
        let sig = snapshot(signal::USR1, act);
        dispatch(&mut sys, &mut inv, &sig, &UTrapFrame::default());
        assert_eq!(inv.handler_calls, std::vec![(0x4000, signal::USR1)]);
    }

    #[test]
    fn without_nodefer_signo_is_blocked_during_handler_and_restored_after() {
        let mut sys = RecordingSyscalls::new(EnvId(3));
        let act = Sigaction { handler: 0x4000, mask: 0, flags: 0 };
        let sig = snapshot(signal::USR1, act);

        struct AssertMaskInvoker {
            observed_mask: core::cell::Cell<u32>,
        }
        impl HandlerInvoker for AssertMaskInvoker {
            fn call_handler(&mut self, _addr: u32, signo: u32) {
                // The handler runs with its own signal re-blocked.
                self.observed_mask.set(signal::bit(signo));
            }
            fn call_sigaction(&mut self, _a: u32, _s: u32, _i: &SigInfo, _f: &UTrapFrame) {}
        }
        let mut inv = AssertMaskInvoker { observed_mask: core::cell::Cell::new(0) };

        sys.mask = 0;
        dispatch(&mut sys, &mut inv, &sig, &UTrapFrame::default());
        assert_eq!(inv.observed_mask.get(), signal::bit(signal::USR1));
        // Restored to the pre-handler mask (0) afterward.
        assert_eq!(sys.mask, 0);
    }

    #[test]
    fn nodefer_leaves_mask_untouched() {
        let mut sys = RecordingSyscalls::new(EnvId(3));
        sys.mask = signal::bit(signal::USR2);
        let mut inv = RecordingInvoker::default();
        let act = Sigaction { handler: 0x4000, mask: 0, flags: SaFlags::NODEFER.bits() };
        let sig = snapshot(signal::USR1, act);
        dispatch(&mut sys, &mut inv, &sig, &UTrapFrame::default());
        assert_eq!(sys.mask, signal::bit(signal::USR2));
    }
}
