// Hit/miss threshold of the fenced reload, measured on every core this process
// may run on. Used to check the timing gap exists before trusting a leak.

use cache_utils::calibration::{calibrate_access, HistParams, Verbosity};
use cache_utils::mmap::MMappedMemory;
use cache_utils::x86::X86Platform;
use cache_utils::PAGE_LEN;

use nix::errno::Errno;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use nix::Error::Sys;

pub fn main() {
    let m = match MMappedMemory::try_new(PAGE_LEN, false, false, |i| i as u8) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to map calibration page: {}", e);
            std::process::exit(1);
        }
    };
    let platform = X86Platform::new();
    eprintln!("CPU features: {:?}", platform.features());

    let old = match sched_getaffinity(Pid::from_raw(0)) {
        Ok(old) => old,
        Err(e) => {
            eprintln!("Failed to read affinity: {}", e);
            std::process::exit(1);
        }
    };

    for i in 0..CpuSet::count() {
        if !old.is_set(i).unwrap_or(false) {
            continue;
        }
        let mut core = CpuSet::new();
        if core.set(i).is_err() {
            continue;
        }
        match sched_setaffinity(Pid::from_raw(0), &core) {
            Ok(()) => {
                // Warm-up pass, then the reported one.
                unsafe {
                    calibrate_access(&platform, m.as_ptr(), HistParams::default(), Verbosity::NoOutput);
                }
                println!("Core {}", i);
                unsafe {
                    calibrate_access(&platform, m.as_ptr(), HistParams::default(), Verbosity::Thresholds)
                };
            }
            Err(Sys(Errno::EINVAL)) => {
                continue;
            }
            Err(e) => {
                eprintln!("Unexpected error while setting affinity: {}", e);
                break;
            }
        }
    }
    if let Err(e) = sched_setaffinity(Pid::from_raw(0), &old) {
        eprintln!("Failed to restore affinity: {}", e);
    }
}
