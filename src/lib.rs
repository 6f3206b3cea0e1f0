#![deny(unsafe_op_in_unsafe_fn)]

//! Recover a byte through a transient read and a Flush+Reload channel.
//!
//! The pipeline: evict every slot of a 256-slot observation array, read the
//! secret transiently and load the slot it selects, time a fenced load of every
//! slot, and take the fastest one as the secret.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod report;
pub mod trigger;

pub use config::{Config, TriggerSchedule};
pub use engine::{Engine, Recovery};
pub use error::MeltdownError;
pub use trigger::{Trigger, TriggerOutcome, Variant};

/// Byte the binaries leak. It lives in this process, standing in for memory
/// the process would not be allowed to read.
pub const DEMO_SECRET: u8 = 0x41;
