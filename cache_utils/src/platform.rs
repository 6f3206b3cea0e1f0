//! Capability interface for the micro-architectural operations the leak relies on.
//!
//! Everything architecture specific sits behind this trait, so the conditioning,
//! timing and classification logic is written once and can run either on the
//! real CPU ([`crate::x86::X86Platform`]) or on the cache model in [`crate::sim`].

/// Policy for a rescaled secret that comes out as zero inside the transient window.
///
/// A zero product is what a rolled-back read produces, so it cannot be told
/// apart from a genuine `0x00` on a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroGuard {
    /// Issue the dependent load with whatever product the first read gave.
    Disabled,
    /// Re-read the secret up to this many extra times while the product is zero.
    /// If every read gave zero, the dependent load goes to offset 0.
    Retry(u32),
}

impl ZeroGuard {
    pub fn retries(self) -> u32 {
        match self {
            ZeroGuard::Disabled => 0,
            ZeroGuard::Retry(n) => n,
        }
    }
}

pub trait Platform {
    /// Evict the line containing `p` from every cache level.
    ///
    /// # Safety
    ///
    /// `p` must point into mapped memory.
    unsafe fn flush(&self, p: *const u8);

    /// Store-serializing barrier (`mfence`).
    fn store_fence(&self);

    /// Load and instruction serializing barrier (`lfence`).
    fn serialize(&self);

    /// Monotonic cycle counter.
    fn read_cycles(&self) -> u64;

    /// # Safety
    ///
    /// `p` must be valid for reads.
    unsafe fn load(&self, p: *const u8);

    /// Whether [`Platform::transactional_region`] can be used at all.
    fn supports_transactions(&self) -> bool;

    /// Run `body` inside a hardware transaction. Returns true if it committed.
    ///
    /// A fault inside the region aborts it instead of reaching the process.
    /// Cache residency changes made before the abort are kept.
    ///
    /// # Safety
    ///
    /// [`Platform::supports_transactions`] must be true.
    unsafe fn transactional_region(&self, body: &mut dyn FnMut()) -> bool;

    /// Read `*secret`, rescale it by `shift` and load `probe + (secret << shift)`.
    ///
    /// The secret value is never written anywhere architecturally visible.
    ///
    /// # Safety
    ///
    /// `probe` must be valid for reads over `256 << shift` bytes. `shift` must be
    /// in `1..64`. A faulting `secret` kills the process unless the call is made
    /// inside a transactional region or a [`crate::fault::FaultBoundary`] is alive.
    unsafe fn transient_leak(&self, secret: *const u8, probe: *const u8, shift: u32, guard: ZeroGuard);
}
