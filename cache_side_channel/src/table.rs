//! Per-slot latencies of one timing pass, and the classifier that turns them
//! into a recovered byte.

use crate::CacheStatus;
use cache_utils::calibration::Threshold;
use itertools::Itertools;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyTable {
    samples: Vec<u32>,
}

impl LatencyTable {
    pub fn new(samples: Vec<u32>) -> Self {
        LatencyTable { samples }
    }

    pub fn samples(&self) -> &[u32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(slot, latency)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.samples.iter().copied().enumerate()
    }

    pub fn median(&self) -> Option<u32> {
        let sorted = self.samples.iter().copied().sorted().collect::<Vec<_>>();
        sorted.get(sorted.len() / 2).copied()
    }

    /// Number of other slots strictly slower than `slot`.
    pub fn slower_than(&self, slot: usize) -> usize {
        match self.samples.get(slot) {
            Some(&t) => self.samples.iter().filter(|&&other| other > t).count(),
            None => 0,
        }
    }

    pub fn status(&self, threshold: &Threshold) -> Vec<CacheStatus> {
        self.samples
            .iter()
            .map(|&t| {
                if threshold.is_hit(t as u64) {
                    CacheStatus::Hit
                } else {
                    CacheStatus::Miss
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    /// Several slots share the minimum latency.
    Tie,
    /// No slot is clearly faster than the rest.
    NoHotSlot,
    /// This many slots look cache resident.
    MultipleHotSlots(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Confident,
    Noisy(NoiseKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub slot: usize,
    pub latency: u32,
    pub confidence: Confidence,
}

impl Classification {
    pub fn is_confident(&self) -> bool {
        self.confidence == Confidence::Confident
    }
}

/// Slot with the strictly smallest latency, lowest index on ties.
///
/// Only relative timings are used: a sample counts as hot when
/// `latency * hot_ratio <= median`. The answer is `Confident` when the minimum
/// is unique and it is the only hot sample.
pub fn classify(table: &LatencyTable, hot_ratio: u32) -> Classification {
    let (slot, latency) = match table.samples.iter().position_min() {
        Some(slot) => (slot, table.samples[slot]),
        None => {
            return Classification {
                slot: 0,
                latency: u32::MAX,
                confidence: Confidence::Noisy(NoiseKind::NoHotSlot),
            }
        }
    };
    let median = table.median().map_or(0, u64::from);
    let hot = table
        .samples
        .iter()
        .filter(|&&t| u64::from(t) * u64::from(hot_ratio) <= median)
        .count();
    let ties = table.samples.iter().filter(|&&t| t == latency).count();

    let confidence = if hot == 0 {
        Confidence::Noisy(NoiseKind::NoHotSlot)
    } else if ties > 1 {
        Confidence::Noisy(NoiseKind::Tie)
    } else if hot > 1 {
        Confidence::Noisy(NoiseKind::MultipleHotSlots(hot))
    } else {
        Confidence::Confident
    };
    Classification {
        slot,
        latency,
        confidence,
    }
}
