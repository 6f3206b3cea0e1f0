//! Recoverable fault boundary for the non-transactional leak.
//!
//! Without it, a secret that is genuinely unreadable delivers SIGSEGV (or
//! SIGBUS) to a process with no handler and the run dies. While a
//! [`FaultBoundary`] is alive, a fault raised inside the leak sequence is
//! resumed just past the dependent load; any other fault falls back to the
//! default disposition and stays fatal.

use crate::x86::leak_window;

use core::sync::atomic::{AtomicUsize, Ordering};
use libc::{c_int, c_void, siginfo_t, ucontext_t};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static SUPPRESSED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_fault(signal: c_int, _info: *mut siginfo_t, context: *mut c_void) {
    let context = context as *mut ucontext_t;
    let rip = unsafe { (*context).uc_mcontext.gregs[libc::REG_RIP as usize] } as usize;
    match leak_window() {
        Some((start, end)) if start <= rip && rip < end => {
            SUPPRESSED.fetch_add(1, Ordering::Relaxed);
            unsafe {
                (*context).uc_mcontext.gregs[libc::REG_RIP as usize] = end as libc::greg_t;
            }
        }
        _ => {
            // Not raised by the leak: re-executing the instruction faults again, fatally.
            unsafe { libc::signal(signal, libc::SIG_DFL) };
        }
    }
}

#[must_use = "The boundary is removed when dropped"]
pub struct FaultBoundary {
    previous_segv: SigAction,
    previous_bus: SigAction,
}

impl FaultBoundary {
    pub fn install() -> Result<FaultBoundary, nix::Error> {
        let action = SigAction::new(
            SigHandler::SigAction(on_fault),
            SaFlags::SA_SIGINFO,
            SigSet::empty(),
        );
        let previous_segv = unsafe { sigaction(Signal::SIGSEGV, &action) }?;
        let previous_bus = match unsafe { sigaction(Signal::SIGBUS, &action) } {
            Ok(previous) => previous,
            Err(e) => {
                let _ = unsafe { sigaction(Signal::SIGSEGV, &previous_segv) };
                return Err(e);
            }
        };
        Ok(FaultBoundary {
            previous_segv,
            previous_bus,
        })
    }

    /// Number of faults resumed by any boundary since process start.
    pub fn suppressed() -> usize {
        SUPPRESSED.load(Ordering::Relaxed)
    }
}

impl Drop for FaultBoundary {
    fn drop(&mut self) {
        unsafe {
            let _ = sigaction(Signal::SIGBUS, &self.previous_bus);
            let _ = sigaction(Signal::SIGSEGV, &self.previous_segv);
        }
    }
}
