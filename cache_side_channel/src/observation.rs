//! The probe array the leak writes its result into: one slot per byte value,
//! `1 << shift` bytes apart so neighbouring slots never share a line or get
//! pulled in together by the adjacent-line prefetcher.

use crate::SLOTS;
use cache_utils::mmap::MMappedMemory;
use cache_utils::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("observation array of {slots} slots of 2^{shift} bytes does not fit the address space")]
    TooLarge { slots: usize, shift: u32 },
    #[error("mmap failed: {0}")]
    Map(#[from] nix::Error),
}

#[derive(Debug)]
pub struct ObservationArray {
    memory: MMappedMemory<u8>,
    slots: usize,
    shift: u32,
}

impl ObservationArray {
    pub fn allocate(slots: usize, shift: u32) -> Result<ObservationArray, AllocationError> {
        let size = 1usize
            .checked_shl(shift)
            .and_then(|stride| stride.checked_mul(slots))
            .ok_or(AllocationError::TooLarge { slots, shift })?;
        let memory = MMappedMemory::try_new(size, false, false, |_| 0u8)?;
        Ok(ObservationArray {
            memory,
            slots,
            shift,
        })
    }

    /// One slot per byte value.
    pub fn for_bytes(shift: u32) -> Result<ObservationArray, AllocationError> {
        Self::allocate(SLOTS, shift)
    }

    pub fn base(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn stride(&self) -> usize {
        1 << self.shift
    }

    pub fn slot(&self, index: usize) -> *const u8 {
        assert!(index < self.slots);
        self.memory[index << self.shift..].as_ptr()
    }

    /// Evict the first line of every slot. Nothing may touch the array between
    /// this and the trigger, or the touched slot reads as hot.
    pub fn flush_all<P: Platform + ?Sized>(&self, platform: &P) {
        for i in 0..self.slots {
            unsafe { platform.flush(self.slot(i)) };
        }
        platform.store_fence();
    }
}
