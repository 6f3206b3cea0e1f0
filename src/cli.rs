//! Process entry shared by the two binaries.

use crate::config::Config;
use crate::engine::Engine;
use crate::error::MeltdownError;
use crate::report::{write_table, write_winner};
use crate::trigger::Variant;
use crate::DEMO_SECRET;

use cache_side_channel::{restore_affinity, set_affinity};
use cache_utils::x86::X86Platform;
use cache_utils::Platform;
use nix::sched::CpuSet;
use std::io::{self, Write};
use tracing::{debug, warn, Level};

/// Keeps the thread on one CPU until dropped.
pub struct CorePin {
    previous: CpuSet,
}

impl CorePin {
    pub fn current() -> Result<CorePin, MeltdownError> {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            return Err(MeltdownError::Affinity(nix::Error::last()));
        }
        let mut set = CpuSet::new();
        set.set(cpu as usize).map_err(MeltdownError::Affinity)?;
        let previous = set_affinity(&set).map_err(MeltdownError::Affinity)?;
        debug!(cpu, "pinned to core");
        Ok(CorePin { previous })
    }
}

impl Drop for CorePin {
    fn drop(&mut self) {
        if let Err(e) = restore_affinity(&self.previous) {
            warn!(error = %e, "failed to restore affinity");
        }
    }
}

/// Diagnostics go to stderr at a fixed level; stdout only carries results.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::WARN)
        .with_target(false)
        .try_init();
}

fn run<P: Platform, O: Write + ?Sized>(
    platform: P,
    variant: Variant,
    config: Config,
    secret: u8,
    out: &mut O,
) -> Result<(), MeltdownError> {
    let engine = Engine::new(platform, variant, config)?;
    let _pin = if config.pin_core {
        Some(CorePin::current()?)
    } else {
        None
    };
    let recovery = unsafe { engine.recover(&secret) };
    match variant {
        Variant::Baseline => write_table(out, &recovery.table)?,
        Variant::Hardened => write_winner(out, &recovery.classification)?,
    }
    out.flush()?;
    Ok(())
}

/// Run the whole pipeline once against `secret` and print the result.
/// Returns the process exit status.
pub fn main_with<P, O, E>(
    platform: P,
    variant: Variant,
    config: Config,
    secret: u8,
    out: &mut O,
    err: &mut E,
) -> i32
where
    P: Platform,
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    match run(platform, variant, config, secret, out) {
        Ok(()) => 0,
        Err(e) => {
            let _ = writeln!(err, "{}", e);
            e.exit_code()
        }
    }
}

pub fn main_x86(variant: Variant) -> i32 {
    init_logging();
    let platform = X86Platform::new();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut err = stderr.lock();
    if !platform.features().clflush {
        let e = MeltdownError::Unsupported("no clflush");
        let _ = writeln!(err, "{}", e);
        return e.exit_code();
    }
    let mut out = stdout.lock();
    main_with(platform, variant, Config::default(), DEMO_SECRET, &mut out, &mut err)
}
