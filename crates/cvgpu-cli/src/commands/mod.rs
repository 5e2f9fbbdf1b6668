//! Command implementations
//!
//! Commands write to any `io::Write` so they can be exercised against the
//! mock engine in tests.

mod devices;
mod probe;
mod selftest;

pub use devices::run_devices;
pub use probe::run_probe;
pub use selftest::run_selftest;

use anyhow::{Context, Result};
use cvgpu::{ComputeEngine, EngineConfig, GpuContext, GpuResult, MockEngine, NativeEngine};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Where commands get their engine from
#[derive(Debug, Clone)]
pub enum EngineSource {
    /// Native libraries located by `EngineConfig`
    Native(EngineConfig),
    /// A shared mock engine
    Mock(Arc<MockEngine>),
}

impl EngineSource {
    /// Resolve the engine source from command line flags
    pub fn from_flags(mock: bool, config: Option<&Path>) -> Result<Self> {
        if mock {
            return Ok(Self::Mock(Arc::new(MockEngine::new())));
        }
        let config = match config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => EngineConfig::from_env(),
        };
        debug!(?config, "engine configuration");
        Ok(Self::Native(config))
    }

    /// Short name shown in command output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Mock(_) => "mock",
        }
    }

    /// Initialize the engine
    pub fn engine(&self) -> GpuResult<Arc<dyn ComputeEngine>> {
        match self {
            Self::Native(config) => Ok(Arc::new(NativeEngine::load(config)?)),
            Self::Mock(engine) => Ok(engine.clone()),
        }
    }

    /// Context over a freshly initialized engine
    pub fn context(&self) -> Result<GpuContext> {
        let engine = self
            .engine()
            .with_context(|| format!("failed to initialize the {} engine", self.name()))?;
        Ok(GpuContext::new(engine))
    }
}
