#![allow(clippy::missing_safety_doc)]

use crate::platform::Platform;

use core::cmp::min;
use itertools::Itertools;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Clone, Copy)]
pub enum Verbosity {
    NoOutput,
    Thresholds,
    RawResult,
}

#[derive(Debug, Clone, Copy)]
pub struct HistParams {
    pub iterations: u32,
    pub bucket_size: usize,
    pub bucket_number: usize,
}

pub const BUCKET_SIZE: usize = 5;
pub const BUCKET_NUMBER: usize = 250;
pub const NUM_ITERATIONS: u32 = 1 << 14;

impl Default for HistParams {
    fn default() -> Self {
        HistParams {
            iterations: NUM_ITERATIONS,
            bucket_size: BUCKET_SIZE,
            bucket_number: BUCKET_NUMBER,
        }
    }
}

/// Fenced load latency of `p`, in cycles.
///
/// mfence, lfence, read the counter, lfence, load, lfence, read the counter.
/// The fences on both sides of each counter read keep the load from being
/// reordered out of the measured interval.
pub unsafe fn only_reload<P: Platform + ?Sized>(platform: &P, p: *const u8) -> u64 {
    platform.store_fence();
    platform.serialize();
    let t = platform.read_cycles();
    platform.serialize();
    unsafe { platform.load(p) };
    platform.serialize();
    platform.read_cycles().wrapping_sub(t)
}

pub unsafe fn flush_and_reload<P: Platform + ?Sized>(platform: &P, p: *const u8) -> u64 {
    unsafe {
        platform.flush(p);
        only_reload(platform, p)
    }
}

/// Latency boundary between a cache hit and a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub bucket_index: usize,
    pub bucket_size: usize,
}

impl Threshold {
    pub fn cycles(&self) -> u64 {
        (self.bucket_index * self.bucket_size) as u64
    }

    pub fn is_hit(&self, time: u64) -> bool {
        time < self.cycles()
    }
}

#[derive(Debug, Clone)]
pub struct Calibration {
    pub hit_histogram: Vec<u32>,
    pub miss_histogram: Vec<u32>,
    pub threshold: Threshold,
}

// Hit and miss histograms of one line, threshold at the least populated bucket
// between the hit peak and the first significant miss bucket.
pub unsafe fn calibrate_access<P: Platform + ?Sized>(
    platform: &P,
    pointer: *const u8,
    params: HistParams,
    verbosity: Verbosity,
) -> Calibration {
    let bucket = |d: u64| min(params.bucket_number - 1, d as usize / params.bucket_size);

    let mut hit_histogram = vec![0u32; params.bucket_number];
    let mut miss_histogram = hit_histogram.clone();

    unsafe { platform.load(pointer) };
    for _ in 0..params.iterations {
        let d = unsafe { only_reload(platform, pointer) };
        hit_histogram[bucket(d)] += 1;
    }

    for _ in 0..params.iterations {
        let d = unsafe { flush_and_reload(platform, pointer) };
        miss_histogram[bucket(d)] += 1;
    }

    let hit_max_i = hit_histogram.iter().position_max().unwrap_or(0);
    let miss_min_i = miss_histogram
        .iter()
        .position(|&count| count > 3 /* Magic */)
        .unwrap_or(params.bucket_number - 1);

    let threshold_i = if hit_max_i < miss_min_i {
        (hit_max_i + 1..=miss_min_i)
            .position_min_by_key(|&i| hit_histogram[i] + miss_histogram[i])
            .map_or(miss_min_i, |p| hit_max_i + 1 + p)
    } else {
        miss_min_i
    };

    if verbosity >= Verbosity::RawResult {
        for i in 0..params.bucket_number {
            println!(
                "{:3}: {:10} {:10}",
                i * params.bucket_size,
                hit_histogram[i],
                miss_histogram[i]
            );
        }
    }
    if verbosity >= Verbosity::Thresholds {
        println!("Miss min {}", miss_min_i * params.bucket_size);
        println!("Max hit {}", hit_max_i * params.bucket_size);
        println!("Threshold {}", threshold_i * params.bucket_size);
    }

    Calibration {
        hit_histogram,
        miss_histogram,
        threshold: Threshold {
            bucket_index: threshold_i,
            bucket_size: params.bucket_size,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedPlatform, SIM_HIT_LATENCY, SIM_MISS_LATENCY};

    #[test]
    fn reload_measures_residency() {
        let p = SimulatedPlatform::new();
        let line = 0x8000 as *const u8;
        let miss = unsafe { flush_and_reload(&p, line) };
        let hit = unsafe { only_reload(&p, line) };
        assert_eq!(miss, SIM_MISS_LATENCY + 1);
        assert_eq!(hit, SIM_HIT_LATENCY + 1);
    }

    #[test]
    fn threshold_separates_simulated_hits_and_misses() {
        let p = SimulatedPlatform::new();
        let params = HistParams {
            iterations: 64,
            ..Default::default()
        };
        let c = unsafe { calibrate_access(&p, 0x8000 as *const u8, params, Verbosity::NoOutput) };
        assert_eq!(c.hit_histogram.iter().sum::<u32>(), 64);
        assert_eq!(c.miss_histogram.iter().sum::<u32>(), 64);
        assert!(c.threshold.is_hit(SIM_HIT_LATENCY + 1));
        assert!(!c.threshold.is_hit(SIM_MISS_LATENCY + 1));
    }
}
