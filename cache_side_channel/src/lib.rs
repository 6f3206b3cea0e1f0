#![deny(unsafe_op_in_unsafe_fn)]

use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

pub mod observation;
pub mod oracle;
pub mod table;

pub use observation::{AllocationError, ObservationArray};
pub use table::{classify, Classification, Confidence, LatencyTable, NoiseKind};

/// One candidate slot per possible byte value.
pub const SLOTS: usize = 256;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CacheStatus {
    Hit,
    Miss,
}

pub fn restore_affinity(cpu_set: &CpuSet) -> Result<(), nix::Error> {
    sched_setaffinity(Pid::from_raw(0), cpu_set)
}

#[must_use = "This result must be used to restore affinity"]
pub fn set_affinity(cpu_set: &CpuSet) -> Result<CpuSet, nix::Error> {
    let old = sched_getaffinity(Pid::from_raw(0))?;
    sched_setaffinity(Pid::from_raw(0), cpu_set)?;
    Ok(old)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_round_trip() {
        let current = sched_getaffinity(Pid::from_raw(0)).unwrap();
        let old = set_affinity(&current).unwrap();
        restore_affinity(&old).unwrap();
        let after = sched_getaffinity(Pid::from_raw(0)).unwrap();
        for i in 0..CpuSet::count() {
            assert_eq!(after.is_set(i).unwrap(), current.is_set(i).unwrap());
        }
    }
}
