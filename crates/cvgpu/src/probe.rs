//! CUDA capability probe
//!
//! The first probe initializes the engine and asks it for the number of
//! CUDA enabled devices. The answer is cached for the life of the probe and
//! never re-queried. Initialization failures, native errors and panics all
//! read as "no device".

use crate::engine::ComputeEngine;
use crate::error::GpuResult;
use crate::native::NativeEngine;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

static GLOBAL_PROBE: CapabilityProbe = CapabilityProbe::new();

/// Whether the process can use a CUDA device through the native engine.
///
/// The native libraries are loaded on the first call only.
pub fn has_cuda() -> bool {
    GLOBAL_PROBE.probe_with(|| NativeEngine::global().map(|engine| engine as Arc<dyn ComputeEngine>))
}

/// Memoized answer to "is a compute device available"
#[derive(Debug, Default)]
pub struct CapabilityProbe {
    result: OnceLock<bool>,
}

impl CapabilityProbe {
    /// Probe that has not run yet
    pub const fn new() -> Self {
        Self {
            result: OnceLock::new(),
        }
    }

    /// Probe the engine produced by `init`. `init` runs at most once; if it
    /// fails, no device query is made.
    pub fn probe_with<F>(&self, init: F) -> bool
    where
        F: FnOnce() -> GpuResult<Arc<dyn ComputeEngine>>,
    {
        *self.result.get_or_init(|| {
            match panic::catch_unwind(AssertUnwindSafe(init)) {
                Ok(Ok(engine)) => query(engine.as_ref()),
                Ok(Err(err)) => {
                    debug!(error = %err, "compute engine unavailable");
                    report(false, 0)
                }
                Err(_) => {
                    debug!("compute engine initialization panicked");
                    report(false, 0)
                }
            }
        })
    }

    /// Probe an engine that is already initialized
    pub fn has_compute(&self, engine: &dyn ComputeEngine) -> bool {
        *self.result.get_or_init(|| query(engine))
    }

    /// Cached answer, if a probe has completed
    pub fn cached(&self) -> Option<bool> {
        self.result.get().copied()
    }
}

fn query(engine: &dyn ComputeEngine) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.device_count())) {
        Ok(Ok(count)) => report(count > 0, count),
        Ok(Err(err)) => {
            debug!(engine = engine.name(), error = %err, "device count query failed");
            report(false, 0)
        }
        Err(_) => {
            debug!(engine = engine.name(), "device count query panicked");
            report(false, 0)
        }
    }
}

fn report(available: bool, devices: i32) -> bool {
    info!(available, devices, "CUDA capability probed");
    available
}
