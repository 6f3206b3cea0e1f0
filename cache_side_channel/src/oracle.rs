use crate::observation::ObservationArray;
use cache_utils::calibration::only_reload;
use cache_utils::Platform;

/// Latency of one fenced load of `addr`, truncated to 32 bits like the
/// `sub eax, esi` of a raw `rdtsc` pair.
///
/// # Safety
///
/// `addr` must be valid for reads.
pub unsafe fn measure<P: Platform + ?Sized>(platform: &P, addr: *const u8) -> u32 {
    unsafe { only_reload(platform, addr) as u32 }
}

/// Time every slot of `array`, in increasing slot order, calling `before_each`
/// with the slot index right before that slot is loaded.
pub fn measure_slots<P, F>(platform: &P, array: &ObservationArray, mut before_each: F) -> Vec<u32>
where
    P: Platform + ?Sized,
    F: FnMut(usize),
{
    (0..array.slots())
        .map(|i| {
            before_each(i);
            unsafe { measure(platform, array.slot(i)) }
        })
        .collect()
}
