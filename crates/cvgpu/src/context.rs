//! Compute context: the engine every matrix and matcher is created on

use crate::config::EngineConfig;
use crate::device::{self, DeviceInfo};
use crate::engine::ComputeEngine;
use crate::error::{GpuError, GpuResult};
use crate::host::HostMat;
use crate::mat::GpuMat;
use crate::matcher::BruteForceMatcher;
use crate::native::NativeEngine;
use crate::probe;
use crate::types::{DistanceType, MatType};
use std::fmt;
use std::sync::Arc;

/// Cheap, clonable owner of a compute engine
#[derive(Clone)]
pub struct GpuContext {
    engine: Arc<dyn ComputeEngine>,
}

impl GpuContext {
    /// Context over any engine
    pub fn new(engine: Arc<dyn ComputeEngine>) -> Self {
        Self { engine }
    }

    /// Context over a concrete engine type
    pub fn from_engine<E: ComputeEngine + 'static>(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Context over the process-wide native engine.
    ///
    /// Returns [`GpuError::CapabilityAbsent`] when the capability probe
    /// reports no device; callers that check [`probe::has_cuda`] first never
    /// see this error.
    pub fn native() -> GpuResult<Self> {
        if !probe::has_cuda() {
            return Err(GpuError::CapabilityAbsent);
        }
        Ok(Self::from_engine(NativeEngine::global()?))
    }

    /// Context over a native engine loaded from `config`
    pub fn with_config(config: &EngineConfig) -> GpuResult<Self> {
        Ok(Self::from_engine(Arc::new(NativeEngine::load(config)?)))
    }

    /// Engine behind this context
    pub fn engine(&self) -> &Arc<dyn ComputeEngine> {
        &self.engine
    }

    /// Number of CUDA enabled devices
    pub fn device_count(&self) -> GpuResult<i32> {
        device::device_count(self.engine.as_ref())
    }

    /// Descriptors of every device
    pub fn devices(&self) -> GpuResult<Vec<DeviceInfo>> {
        device::enumerate_devices(self.engine.as_ref())
    }

    /// Index of the current device
    pub fn current_device(&self) -> GpuResult<i32> {
        device::current_device(self.engine.as_ref())
    }

    /// Allocate a device matrix
    pub fn allocate(&self, rows: i32, cols: i32, mat_type: MatType) -> GpuResult<GpuMat> {
        GpuMat::new(self, rows, cols, mat_type)
    }

    /// Allocate a device matrix holding a copy of `host`
    pub fn upload(&self, host: &HostMat) -> GpuResult<GpuMat> {
        GpuMat::from_host(self, host)
    }

    /// Create a brute-force descriptor matcher
    pub fn matcher(&self, distance: DistanceType) -> GpuResult<BruteForceMatcher> {
        BruteForceMatcher::new(self, distance)
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("engine", &self.engine.name())
            .finish()
    }
}
