#![cfg_attr(not(feature = "use_std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use bit_field::BitField;
use core::arch::x86_64;

use crate::CPUVendor::{Intel, Unknown, AMD};

const VENDOR_LEAF: u32 = 0x0;
const FEATURE_LEAF: u32 = 0x1;
const EXTENDED_FEATURE_LEAF: u32 = 0x7;
const MAX_EXTENDED_LEAF: u32 = 0x8000_0000;
const POWER_MANAGEMENT_LEAF: u32 = 0x8000_0007;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum CPUVendor {
    None,
    Intel,
    AMD,
    Unknown,
}

impl CPUVendor {
    pub fn get_cpu_vendor() -> CPUVendor {
        let r = unsafe { x86_64::__cpuid(VENDOR_LEAF) };
        CPUVendor::decode_cpu_vendor(r)
    }

    pub fn decode_cpu_vendor(cpuid_result: x86_64::CpuidResult) -> CPUVendor {
        let feature_string = [cpuid_result.ebx, cpuid_result.edx, cpuid_result.ecx]
            .iter()
            .map(|&u| u.to_le_bytes())
            .collect::<Vec<_>>()
            .concat();
        match feature_string.as_slice() {
            b"GenuineIntel" => Intel,
            b"AuthenticAMD" => AMD,
            _ => Unknown,
        }
    }
}

/// The subset of CPUID feature bits the transient leak depends on.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub struct Features {
    /// CLFLUSH is available (leaf 1, EDX bit 19).
    pub clflush: bool,
    /// RDTSC is available (leaf 1, EDX bit 4).
    pub tsc: bool,
    /// The TSC ticks at a constant rate across P/C states (leaf 0x8000_0007, EDX bit 8).
    pub invariant_tsc: bool,
    /// Restricted transactional memory, `xbegin`/`xend` (leaf 7, EBX bit 11).
    pub rtm: bool,
}

impl Features {
    pub fn detect() -> Features {
        let max_leaf = unsafe { x86_64::__cpuid(VENDOR_LEAF) }.eax;
        let basic = unsafe { x86_64::__cpuid(FEATURE_LEAF) };
        let extended = if max_leaf >= EXTENDED_FEATURE_LEAF {
            Some(unsafe { x86_64::__cpuid_count(EXTENDED_FEATURE_LEAF, 0) })
        } else {
            None
        };
        let max_extended_leaf = unsafe { x86_64::__cpuid(MAX_EXTENDED_LEAF) }.eax;
        let power = if max_extended_leaf >= POWER_MANAGEMENT_LEAF {
            Some(unsafe { x86_64::__cpuid(POWER_MANAGEMENT_LEAF) })
        } else {
            None
        };
        Features::decode(basic, extended, power)
    }

    pub fn decode(
        basic: x86_64::CpuidResult,
        extended: Option<x86_64::CpuidResult>,
        power: Option<x86_64::CpuidResult>,
    ) -> Features {
        Features {
            clflush: basic.edx.get_bit(19),
            tsc: basic.edx.get_bit(4),
            invariant_tsc: power.map_or(false, |r| r.edx.get_bit(8)),
            rtm: extended.map_or(false, |r| r.ebx.get_bit(11)),
        }
    }
}

// Family Model Stepping Processor Type -> leaf 0x1, in EAX
pub fn get_family_model_stepping() -> (CPUVendor, u32, u32) {
    let vendor = CPUVendor::get_cpu_vendor();
    let eax = unsafe { x86_64::__cpuid(FEATURE_LEAF) }.eax;
    decode_family_model_stepping(vendor, eax)
}

pub fn decode_family_model_stepping(vendor: CPUVendor, eax: u32) -> (CPUVendor, u32, u32) {
    let stepping = eax.get_bits(0..4);
    let mut model = eax.get_bits(4..8);
    let mut family = eax.get_bits(8..12);
    if family == 0xf {
        family += eax.get_bits(20..28)
    }
    if family == 0xf || family == 0x6 {
        model += eax.get_bits(16..20) << 4
    }
    let family_model_display = family << 8 | model;
    (vendor, family_model_display, stepping)
}
