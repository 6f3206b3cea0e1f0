use crate::error::MeltdownError;
use cache_utils::{ZeroGuard, PAGE_SHIFT};

/// Smallest stride that keeps every slot on its own cache line.
pub const MIN_SLOT_SHIFT: u32 = 6;
pub const MAX_SLOT_SHIFT: u32 = 47;
pub const DEFAULT_ZERO_RETRIES: u32 = 1 << 10;

/// When the trigger runs relative to the timing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSchedule {
    /// Once, after the flush and before the first slot is timed.
    Once,
    /// Right before every slot is timed. The trigger always lands on the same
    /// slot, so this only re-warms it; it also survives the line being evicted
    /// while earlier slots are timed.
    PerSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Slot stride is `1 << slot_shift` bytes.
    pub slot_shift: u32,
    pub zero_guard: ZeroGuard,
    pub schedule: TriggerSchedule,
    /// Full runs (each re-flushing first) to try before settling for a noisy answer.
    pub max_attempts: u32,
    /// A sample is hot when `latency * hot_ratio <= median`.
    pub hot_ratio: u32,
    /// Resume faults raised by the non-transactional trigger instead of dying.
    pub contain_faults: bool,
    /// Pin the run to the CPU it starts on.
    pub pin_core: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slot_shift: PAGE_SHIFT,
            zero_guard: ZeroGuard::Retry(DEFAULT_ZERO_RETRIES),
            schedule: TriggerSchedule::PerSlot,
            max_attempts: 3,
            hot_ratio: 2,
            contain_faults: true,
            pin_core: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), MeltdownError> {
        if !(MIN_SLOT_SHIFT..=MAX_SLOT_SHIFT).contains(&self.slot_shift) {
            return Err(MeltdownError::InvalidConfig(format!(
                "slot_shift {} outside {}..={}",
                self.slot_shift, MIN_SLOT_SHIFT, MAX_SLOT_SHIFT
            )));
        }
        if self.max_attempts == 0 {
            return Err(MeltdownError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.hot_ratio < 2 {
            return Err(MeltdownError::InvalidConfig(format!(
                "hot_ratio {} would count half the slots as hot",
                self.hot_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(Config::default().slot_shift, 12);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            Config {
                slot_shift: 5,
                ..Default::default()
            },
            Config {
                slot_shift: 48,
                ..Default::default()
            },
            Config {
                max_attempts: 0,
                ..Default::default()
            },
            Config {
                hot_ratio: 1,
                ..Default::default()
            },
        ];
        for config in bad.iter() {
            assert!(matches!(
                config.validate(),
                Err(MeltdownError::InvalidConfig(_))
            ));
        }
    }
}
