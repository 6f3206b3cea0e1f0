#![allow(clippy::missing_safety_doc)]
#![deny(unsafe_op_in_unsafe_fn)]

use core::arch::x86_64 as arch_x86;
use core::ptr;

pub mod calibration;
pub mod fault;
pub mod mmap;
pub mod platform;
pub mod sim;
pub mod x86;

pub use platform::{Platform, ZeroGuard};

pub const CACHE_LINE_LENGTH: usize = 64;
pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_LEN: usize = 1 << PAGE_SHIFT;

// rdtsc no fence
pub unsafe fn rdtsc_nofence() -> u64 {
    unsafe { arch_x86::_rdtsc() }
}

pub unsafe fn maccess<T>(p: *const T) {
    unsafe { ptr::read_volatile(p) };
}

// flush (clflush)
pub unsafe fn flush(p: *const u8) {
    unsafe { arch_x86::_mm_clflush(p) };
}

pub fn mfence() {
    unsafe { arch_x86::_mm_mfence() };
}

pub fn lfence() {
    unsafe { arch_x86::_mm_lfence() };
}

/// Address of the cache line containing `p`.
pub fn line_of<T>(p: *const T) -> usize {
    (p as usize) & !(CACHE_LINE_LENGTH - 1)
}
