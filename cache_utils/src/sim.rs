//! Deterministic cache model implementing [`Platform`].
//!
//! Lines are either resident or not; a load costs `hit_latency` or
//! `miss_latency` cycles and makes its line resident, a flush evicts it. The
//! cycle counter advances by one per read plus the cost of every load. The
//! transient read can be told to come back as zero a number of times, which is
//! what a rolled-back read looks like, and the secret can be marked as faulting.

use crate::line_of;
use crate::platform::{Platform, ZeroGuard};

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

pub const SIM_HIT_LATENCY: u64 = 40;
pub const SIM_MISS_LATENCY: u64 = 300;

#[derive(Debug)]
pub struct SimulatedPlatform {
    resident: RefCell<HashSet<usize>>,
    clock: Cell<u64>,
    hit_latency: u64,
    miss_latency: u64,
    rolled_back_reads: Cell<u32>,
    secret_faults: bool,
    transactions: bool,
    faults: Cell<u32>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        SimulatedPlatform {
            resident: RefCell::new(HashSet::new()),
            clock: Cell::new(0),
            hit_latency: SIM_HIT_LATENCY,
            miss_latency: SIM_MISS_LATENCY,
            rolled_back_reads: Cell::new(0),
            secret_faults: false,
            transactions: true,
            faults: Cell::new(0),
        }
    }

    pub fn with_latencies(mut self, hit: u64, miss: u64) -> Self {
        self.hit_latency = hit;
        self.miss_latency = miss;
        self
    }

    /// The next `n` transient reads of the secret observe zero.
    pub fn with_rolled_back_reads(self, n: u32) -> Self {
        self.rolled_back_reads.set(n);
        self
    }

    /// Reading the secret raises an architectural fault.
    pub fn with_faulting_secret(mut self) -> Self {
        self.secret_faults = true;
        self
    }

    pub fn without_transactions(mut self) -> Self {
        self.transactions = false;
        self
    }

    pub fn rearm_rolled_back_reads(&self, n: u32) {
        self.rolled_back_reads.set(n);
    }

    /// Bring a line in from outside the pipeline, as interference would.
    pub fn warm(&self, p: *const u8) {
        self.resident.borrow_mut().insert(line_of(p));
    }

    pub fn is_resident(&self, p: *const u8) -> bool {
        self.resident.borrow().contains(&line_of(p))
    }

    /// Faults raised by secret reads so far.
    pub fn faults(&self) -> u32 {
        self.faults.get()
    }

    fn tick(&self, cycles: u64) {
        self.clock.set(self.clock.get() + cycles);
    }

    fn transient_read(&self, secret: *const u8) -> u8 {
        if self.secret_faults {
            self.faults.set(self.faults.get() + 1);
        }
        let rolled_back = self.rolled_back_reads.get();
        if rolled_back > 0 {
            self.rolled_back_reads.set(rolled_back - 1);
            0
        } else {
            unsafe { core::ptr::read_volatile(secret) }
        }
    }
}

impl Platform for SimulatedPlatform {
    unsafe fn flush(&self, p: *const u8) {
        self.resident.borrow_mut().remove(&line_of(p));
    }

    fn store_fence(&self) {}

    fn serialize(&self) {}

    fn read_cycles(&self) -> u64 {
        self.tick(1);
        self.clock.get()
    }

    unsafe fn load(&self, p: *const u8) {
        let hit = !self.resident.borrow_mut().insert(line_of(p));
        self.tick(if hit {
            self.hit_latency
        } else {
            self.miss_latency
        });
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    unsafe fn transactional_region(&self, body: &mut dyn FnMut()) -> bool {
        let faults = self.faults.get();
        body();
        // Residency changes made by the body survive an abort.
        self.faults.get() == faults
    }

    unsafe fn transient_leak(&self, secret: *const u8, probe: *const u8, shift: u32, guard: ZeroGuard) {
        let mut retries = guard.retries();
        let offset = loop {
            let product = (self.transient_read(secret) as usize) << shift;
            if product != 0 || retries == 0 {
                break product;
            }
            retries -= 1;
        };
        self.resident.borrow_mut().insert(line_of(probe.wrapping_add(offset)));
    }
}
