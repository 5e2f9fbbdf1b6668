//! CUDA device enumeration

use crate::engine::ComputeEngine;
use crate::error::{GpuError, GpuResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute capability of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComputeCapability {
    /// Major version
    pub major: i32,
    /// Minor version
    pub minor: i32,
}

impl ComputeCapability {
    /// Create a capability
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }

    /// Check if this capability meets minimum requirements
    pub fn meets_minimum(&self, min_major: i32, min_minor: i32) -> bool {
        self.major > min_major || (self.major == min_major && self.minor >= min_minor)
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Description of one CUDA device. Queried on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device index
    pub index: i32,
    /// Device name
    pub name: String,
    /// Compute capability
    pub compute_capability: ComputeCapability,
    /// Number of streaming multiprocessors
    pub multiprocessor_count: i32,
}

impl DeviceInfo {
    /// Query the device at `index`
    pub fn query(engine: &dyn ComputeEngine, index: i32) -> GpuResult<Self> {
        let count = device_count(engine)?;
        if index < 0 || index >= count {
            return Err(GpuError::InvalidDevice { device: index });
        }
        Self::query_unchecked(engine, index)
    }

    fn query_unchecked(engine: &dyn ComputeEngine, index: i32) -> GpuResult<Self> {
        let name = engine.device_name(index)?;
        let (major, minor) = engine.compute_capability(index)?;
        let multiprocessor_count = engine.multiprocessor_count(index)?;
        Ok(Self {
            index,
            name,
            compute_capability: ComputeCapability::new(major, minor),
            multiprocessor_count,
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (compute {}, {} SMs)",
            self.index, self.name, self.compute_capability, self.multiprocessor_count
        )
    }
}

/// Number of CUDA enabled devices; a negative native count reads as zero.
pub fn device_count(engine: &dyn ComputeEngine) -> GpuResult<i32> {
    Ok(engine.device_count()?.max(0))
}

/// Query every device
pub fn enumerate_devices(engine: &dyn ComputeEngine) -> GpuResult<Vec<DeviceInfo>> {
    let count = device_count(engine)?;
    (0..count)
        .map(|index| DeviceInfo::query_unchecked(engine, index))
        .collect()
}

/// Index of the current device
pub fn current_device(engine: &dyn ComputeEngine) -> GpuResult<i32> {
    engine.current_device()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_capability_display() {
        assert_eq!(ComputeCapability::new(8, 6).to_string(), "8.6");
        assert_eq!(ComputeCapability::new(1, 3).to_string(), "1.3");
    }

    #[test]
    fn test_meets_minimum() {
        let cc = ComputeCapability::new(7, 5);
        assert!(cc.meets_minimum(7, 0));
        assert!(cc.meets_minimum(7, 5));
        assert!(cc.meets_minimum(6, 9));
        assert!(!cc.meets_minimum(7, 6));
        assert!(!cc.meets_minimum(8, 0));
    }

    #[test]
    fn test_capability_ordering() {
        assert!(ComputeCapability::new(8, 0) > ComputeCapability::new(7, 5));
        assert!(ComputeCapability::new(7, 5) > ComputeCapability::new(7, 2));
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            index: 0,
            name: "GeForce GTX 580".to_string(),
            compute_capability: ComputeCapability::new(2, 0),
            multiprocessor_count: 16,
        };
        assert_eq!(info.to_string(), "[0] GeForce GTX 580 (compute 2.0, 16 SMs)");
    }

    #[test]
    fn test_device_info_serialization() {
        let info = DeviceInfo {
            index: 1,
            name: "Tesla C2050".to_string(),
            compute_capability: ComputeCapability::new(2, 0),
            multiprocessor_count: 14,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"name\":\"Tesla C2050\""));
        let back: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
