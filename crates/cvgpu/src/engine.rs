//! The compute engine seam
//!
//! `ComputeEngine` has one method per native entry point. Implementations
//! forward each call to exactly one native function (or, for the mock, to a
//! host-memory stand-in) without interpreting the result. Validation of
//! operand types and sizes happens above this layer, in `ops`, `mat` and
//! `matcher`.

use crate::error::GpuResult;
use crate::host::HostMat;
use crate::types::{ColorConversion, DistanceType, Interpolation, MinMaxLoc, Point, Size};
use std::fmt;

/// Opaque reference to a device-resident matrix owned by the engine.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatHandle(usize);

impl MatHandle {
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub(crate) fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Debug for MatHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatHandle({:#x})", self.0)
    }
}

/// Opaque reference to a native brute-force matcher.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatcherHandle(usize);

impl MatcherHandle {
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub(crate) fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Debug for MatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatcherHandle({:#x})", self.0)
    }
}

/// Native compute engine entry points.
///
/// Every call is synchronous and blocks until the native side returns.
/// Destination handles are written in place.
pub trait ComputeEngine: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    // Device information

    /// Number of CUDA enabled devices
    fn device_count(&self) -> GpuResult<i32>;
    /// Name of the device at `device`
    fn device_name(&self, device: i32) -> GpuResult<String>;
    /// Index of the current device
    fn current_device(&self) -> GpuResult<i32>;
    /// Compute capability as (major, minor)
    fn compute_capability(&self, device: i32) -> GpuResult<(i32, i32)>;
    /// Number of streaming multiprocessors
    fn multiprocessor_count(&self, device: i32) -> GpuResult<i32>;

    // Matrix lifecycle

    /// Allocate a `rows x cols` matrix with the native type code `mat_type`
    fn mat_create(&self, rows: i32, cols: i32, mat_type: i32) -> GpuResult<MatHandle>;
    /// Allocate a matrix shaped like `host` and fill it with its content
    fn mat_create_from_host(&self, host: &HostMat) -> GpuResult<MatHandle>;
    /// Release the matrix in `slot` and leave the slot empty.
    /// An empty slot makes no native call.
    fn mat_release(&self, slot: &mut Option<MatHandle>);
    /// Width (columns) and height (rows)
    fn mat_size(&self, mat: MatHandle) -> GpuResult<Size>;
    /// Channel count
    fn mat_channels(&self, mat: MatHandle) -> GpuResult<i32>;

    // Data movement

    /// Blocking host to device copy
    fn mat_upload(&self, mat: MatHandle, host: &HostMat) -> GpuResult<()>;
    /// Blocking device to host copy
    fn mat_download(&self, mat: MatHandle, host: &mut HostMat) -> GpuResult<()>;
    /// Device to device copy; only elements with a non-zero mask value when a mask is given
    fn mat_copy(&self, src: MatHandle, dst: MatHandle, mask: Option<MatHandle>) -> GpuResult<()>;

    // Operators

    /// Color space conversion
    fn cvt_color(&self, src: MatHandle, dst: MatHandle, code: ColorConversion) -> GpuResult<()>;
    /// c = a + b
    fn add(&self, a: MatHandle, b: MatHandle, c: MatHandle) -> GpuResult<()>;
    /// c = a - b
    fn subtract(&self, a: MatHandle, b: MatHandle, c: MatHandle) -> GpuResult<()>;
    /// Generalized Sobel derivative
    fn sobel(
        &self,
        src: MatHandle,
        dst: MatHandle,
        dx: i32,
        dy: i32,
        ksize: i32,
        scale: f64,
    ) -> GpuResult<()>;
    /// Arbitrary linear filter with a host kernel
    fn filter_2d(
        &self,
        src: MatHandle,
        dst: MatHandle,
        kernel: &HostMat,
        anchor: Point,
    ) -> GpuResult<()>;
    /// dst(i) = table(src(i))
    fn lut(&self, src: MatHandle, table: &HostMat, dst: MatHandle) -> GpuResult<()>;
    /// Resize `src` into the size of `dst`
    fn resize(&self, src: MatHandle, dst: MatHandle, interpolation: Interpolation)
        -> GpuResult<()>;
    /// Split channels into single-channel matrices
    fn split(&self, src: MatHandle, dst: &[MatHandle]) -> GpuResult<()>;
    /// Merge single-channel matrices into one
    fn merge(&self, src: &[MatHandle], dst: MatHandle) -> GpuResult<()>;
    /// Minimum and maximum values and their locations
    fn min_max_loc(&self, src: MatHandle, mask: Option<MatHandle>) -> GpuResult<MinMaxLoc>;
    /// Number of non-zero elements
    fn count_non_zero(&self, src: MatHandle) -> GpuResult<i32>;
    /// dst = a ^ b where mask is non-zero
    fn bitwise_xor(
        &self,
        a: MatHandle,
        b: MatHandle,
        dst: MatHandle,
        mask: Option<MatHandle>,
    ) -> GpuResult<()>;
    /// Laplacian with aperture 1 or 3
    fn laplacian(&self, src: MatHandle, dst: MatHandle, ksize: i32, scale: f64) -> GpuResult<()>;

    // Brute-force matcher

    /// Create a matcher using `distance`
    fn matcher_create(&self, distance: DistanceType) -> GpuResult<MatcherHandle>;
    /// Release the matcher in `slot` and leave the slot empty
    fn matcher_release(&self, slot: &mut Option<MatcherHandle>);
    /// k nearest neighbours of every query row among the train rows
    #[allow(clippy::too_many_arguments)]
    fn matcher_knn_match(
        &self,
        matcher: MatcherHandle,
        query: MatHandle,
        train: MatHandle,
        train_idx: MatHandle,
        distance: MatHandle,
        k: i32,
        mask: Option<MatHandle>,
    ) -> GpuResult<()>;
}
