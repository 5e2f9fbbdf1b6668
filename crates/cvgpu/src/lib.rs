//! Safe Rust binding over the CUDA accelerated image operators of the
//! `cvextern` native library
//!
//! This crate provides:
//! - A memoized CUDA capability probe
//! - Device matrices with scoped ownership of native handles
//! - Blocking host/device transfers
//! - Validated pass-through image operators
//! - Brute-force descriptor matching
//! - Device enumeration
//!
//! Native libraries are opened at runtime; a mock engine stands in for the
//! hardware in tests.

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod device;
pub mod engine;
pub mod error;
pub mod host;
pub mod mat;
pub mod matcher;
pub mod mock;
pub mod native;
pub mod ops;
pub mod probe;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use context::GpuContext;
pub use device::{current_device, device_count, enumerate_devices, ComputeCapability, DeviceInfo};
pub use engine::{ComputeEngine, MatHandle, MatcherHandle};
pub use error::{GpuError, GpuResult};
pub use host::HostMat;
pub use mat::GpuMat;
pub use matcher::{BruteForceMatcher, KnnMatches, Match};
pub use mock::{MockDevice, MockEngine};
pub use native::NativeEngine;
pub use probe::{has_cuda, CapabilityProbe};
pub use types::{
    ColorConversion, Depth, DistanceType, Interpolation, MatType, MinMaxLoc, Point, Size,
};

/// Re-export common types
pub mod prelude {
    pub use crate::ops;
    pub use crate::{
        has_cuda, BruteForceMatcher, CapabilityProbe, ColorConversion, ComputeCapability,
        ComputeEngine, Depth, DeviceInfo, DistanceType, EngineConfig, GpuContext, GpuError,
        GpuMat, GpuResult, HostMat, Interpolation, KnnMatches, Match, MatType, MinMaxLoc,
        MockDevice, MockEngine, NativeEngine, Point, Size,
    };
}

#[cfg(test)]
mod tests;
