//! Host-memory engine for running without a CUDA device
//!
//! The mock keeps matrices in host memory and implements everything that
//! only moves or describes data: device queries, matrix lifecycle, upload,
//! download and (masked) copy. Pixel operators return
//! [`GpuError::MockMode`] naming the native entry point they would have
//! called.
//!
//! Counters expose how often the device count was queried and how many
//! releases happened, so callers can check caching and release discipline.

use crate::engine::{ComputeEngine, MatHandle, MatcherHandle};
use crate::error::{status, GpuError, GpuResult};
use crate::host::{checked_len, HostMat};
use crate::types::{ColorConversion, DistanceType, Interpolation, MatType, MinMaxLoc, Point, Size};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use tracing::trace;

/// First handle value handed out; keeps handles away from null.
const HANDLE_BASE: usize = 0x1000;
/// Distance between consecutive handles.
const HANDLE_STRIDE: usize = 0x10;

/// A simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    /// Device name
    pub name: String,
    /// Compute capability major version
    pub major: i32,
    /// Compute capability minor version
    pub minor: i32,
    /// Streaming multiprocessor count
    pub multiprocessors: i32,
}

impl MockDevice {
    /// Create a device description
    pub fn new(name: impl Into<String>, major: i32, minor: i32, multiprocessors: i32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
            multiprocessors,
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new("Mock CUDA Device", 8, 6, 28)
    }
}

#[derive(Debug, Clone)]
struct MockMat {
    rows: i32,
    cols: i32,
    mat_type: MatType,
    data: Vec<u8>,
}

impl MockMat {
    fn size(&self) -> Size {
        Size::new(self.cols, self.rows)
    }
}

/// Host-memory [`ComputeEngine`]
pub struct MockEngine {
    devices: RwLock<Vec<MockDevice>>,
    current_device: AtomicI32,
    fail_device_query: AtomicBool,
    panic_on_device_query: AtomicBool,
    memory_limit: Option<usize>,
    next_handle: AtomicUsize,
    mats: Mutex<HashMap<usize, MockMat>>,
    matchers: Mutex<HashMap<usize, DistanceType>>,
    device_queries: AtomicUsize,
    releases: AtomicUsize,
    invalid_releases: AtomicUsize,
}

impl MockEngine {
    /// Engine with a single default device
    pub fn new() -> Self {
        Self::with_devices(vec![MockDevice::default()])
    }

    /// Engine with the given devices
    pub fn with_devices(devices: Vec<MockDevice>) -> Self {
        Self {
            devices: RwLock::new(devices),
            current_device: AtomicI32::new(0),
            fail_device_query: AtomicBool::new(false),
            panic_on_device_query: AtomicBool::new(false),
            memory_limit: None,
            next_handle: AtomicUsize::new(HANDLE_BASE),
            mats: Mutex::new(HashMap::new()),
            matchers: Mutex::new(HashMap::new()),
            device_queries: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            invalid_releases: AtomicUsize::new(0),
        }
    }

    /// Engine without devices
    pub fn without_devices() -> Self {
        Self::with_devices(Vec::new())
    }

    /// Limit the total bytes of live matrices; allocations beyond it fail
    /// with a native out-of-memory error.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Replace the simulated devices
    pub fn set_devices(&self, devices: Vec<MockDevice>) {
        *self.devices.write() = devices;
    }

    /// Make device count queries fail with a native error
    pub fn set_fail_device_query(&self, fail: bool) {
        self.fail_device_query.store(fail, Ordering::SeqCst);
    }

    /// Make device count queries panic
    pub fn set_panic_on_device_query(&self, panic: bool) {
        self.panic_on_device_query.store(panic, Ordering::SeqCst);
    }

    /// Number of device count queries made so far
    pub fn device_queries(&self) -> usize {
        self.device_queries.load(Ordering::SeqCst)
    }

    /// Number of native releases (matrices and matchers)
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Releases of handles that were not live
    pub fn invalid_releases(&self) -> usize {
        self.invalid_releases.load(Ordering::SeqCst)
    }

    /// Number of live matrices
    pub fn live_mats(&self) -> usize {
        self.mats.lock().len()
    }

    /// Number of live matchers
    pub fn live_matchers(&self) -> usize {
        self.matchers.lock().len()
    }

    fn allocate_handle(&self) -> usize {
        self.next_handle.fetch_add(HANDLE_STRIDE, Ordering::SeqCst)
    }

    fn check_device(&self, device: i32) -> GpuResult<MockDevice> {
        let devices = self.devices.read();
        usize::try_from(device)
            .ok()
            .and_then(|index| devices.get(index).cloned())
            .ok_or_else(|| native_error(status::BAD_ARGUMENT, "cv::gpu::getDevice", "invalid device"))
    }

    fn insert_mat(&self, mat: MockMat) -> GpuResult<MatHandle> {
        let mut mats = self.mats.lock();
        if let Some(limit) = self.memory_limit {
            let used: usize = mats.values().map(|m| m.data.len()).sum();
            if used + mat.data.len() > limit {
                return Err(native_error(
                    status::NO_MEMORY,
                    "cv::gpu::GpuMat::create",
                    "out of device memory",
                ));
            }
        }
        let raw = self.allocate_handle();
        mats.insert(raw, mat);
        let handle = MatHandle::from_raw(raw);
        trace!(?handle, "mock matrix allocated");
        Ok(handle)
    }

    fn with_mat<T>(&self, mat: MatHandle, f: impl FnOnce(&MockMat) -> T) -> GpuResult<T> {
        let mats = self.mats.lock();
        mats.get(&mat.as_raw()).map(f).ok_or_else(unknown_handle)
    }
}

impl fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEngine")
            .field("devices", &self.devices.read().len())
            .field("live_mats", &self.live_mats())
            .field("live_matchers", &self.live_matchers())
            .finish()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn native_error(status: i32, function: &str, message: &str) -> GpuError {
    GpuError::Native {
        status,
        function: function.to_string(),
        message: message.to_string(),
        file: "mock".to_string(),
        line: 0,
    }
}

fn unknown_handle() -> GpuError {
    native_error(status::NULL_POINTER, "cv::gpu::GpuMat", "unknown matrix handle")
}

fn mock_mode<T>(operation: &'static str) -> GpuResult<T> {
    Err(GpuError::MockMode { operation })
}

impl ComputeEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn device_count(&self) -> GpuResult<i32> {
        self.device_queries.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_device_query.load(Ordering::SeqCst) {
            panic!("mock device query panicked");
        }
        if self.fail_device_query.load(Ordering::SeqCst) {
            return Err(native_error(
                status::BAD_ARGUMENT,
                "cv::gpu::getCudaEnabledDeviceCount",
                "CUDA driver version is insufficient",
            ));
        }
        Ok(self.devices.read().len() as i32)
    }

    fn device_name(&self, device: i32) -> GpuResult<String> {
        Ok(self.check_device(device)?.name)
    }

    fn current_device(&self) -> GpuResult<i32> {
        Ok(self.current_device.load(Ordering::SeqCst))
    }

    fn compute_capability(&self, device: i32) -> GpuResult<(i32, i32)> {
        let device = self.check_device(device)?;
        Ok((device.major, device.minor))
    }

    fn multiprocessor_count(&self, device: i32) -> GpuResult<i32> {
        Ok(self.check_device(device)?.multiprocessors)
    }

    fn mat_create(&self, rows: i32, cols: i32, mat_type: i32) -> GpuResult<MatHandle> {
        let mat_type = MatType::from_raw(mat_type).map_err(|_| {
            native_error(
                status::UNSUPPORTED_FORMAT,
                "cv::gpu::GpuMat::create",
                "unsupported type",
            )
        })?;
        if rows < 0 || cols < 0 {
            return Err(native_error(
                status::BAD_ARGUMENT,
                "cv::gpu::GpuMat::create",
                "negative size",
            ));
        }
        let len = checked_len(rows, cols, mat_type).ok_or_else(|| {
            native_error(
                status::NO_MEMORY,
                "cv::gpu::GpuMat::create",
                "size overflows device memory",
            )
        })?;
        self.insert_mat(MockMat {
            rows,
            cols,
            mat_type,
            data: vec![0; len],
        })
    }

    fn mat_create_from_host(&self, host: &HostMat) -> GpuResult<MatHandle> {
        self.insert_mat(MockMat {
            rows: host.rows(),
            cols: host.cols(),
            mat_type: host.mat_type(),
            data: host.as_bytes().to_vec(),
        })
    }

    fn mat_release(&self, slot: &mut Option<MatHandle>) {
        if let Some(handle) = slot.take() {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.mats.lock().remove(&handle.as_raw()).is_none() {
                self.invalid_releases.fetch_add(1, Ordering::SeqCst);
            }
            trace!(?handle, "mock matrix released");
        }
    }

    fn mat_size(&self, mat: MatHandle) -> GpuResult<Size> {
        self.with_mat(mat, MockMat::size)
    }

    fn mat_channels(&self, mat: MatHandle) -> GpuResult<i32> {
        self.with_mat(mat, |m| m.mat_type.channels())
    }

    fn mat_upload(&self, mat: MatHandle, host: &HostMat) -> GpuResult<()> {
        let mut mats = self.mats.lock();
        let target = mats.get_mut(&mat.as_raw()).ok_or_else(unknown_handle)?;
        // Upload reallocates on shape or type change, as the native side does.
        target.rows = host.rows();
        target.cols = host.cols();
        target.mat_type = host.mat_type();
        target.data.clear();
        target.data.extend_from_slice(host.as_bytes());
        Ok(())
    }

    fn mat_download(&self, mat: MatHandle, host: &mut HostMat) -> GpuResult<()> {
        let mats = self.mats.lock();
        let source = mats.get(&mat.as_raw()).ok_or_else(unknown_handle)?;
        if source.size() != host.size() || source.mat_type != host.mat_type() {
            return Err(native_error(
                status::UNMATCHED_SIZES,
                "cv::gpu::GpuMat::download",
                "host array does not match device matrix",
            ));
        }
        host.as_bytes_mut().copy_from_slice(&source.data);
        Ok(())
    }

    fn mat_copy(&self, src: MatHandle, dst: MatHandle, mask: Option<MatHandle>) -> GpuResult<()> {
        let mut mats = self.mats.lock();
        let source = mats.get(&src.as_raw()).cloned().ok_or_else(unknown_handle)?;
        let mask = match mask {
            Some(mask) => Some(mats.get(&mask.as_raw()).cloned().ok_or_else(unknown_handle)?),
            None => None,
        };
        let target = mats.get_mut(&dst.as_raw()).ok_or_else(unknown_handle)?;

        match mask {
            None => {
                *target = source;
            }
            Some(mask) => {
                if mask.mat_type != MatType::CV_8UC1
                    || mask.size() != source.size()
                    || target.size() != source.size()
                    || target.mat_type != source.mat_type
                {
                    return Err(native_error(
                        status::UNMATCHED_SIZES,
                        "cv::gpu::GpuMat::copyTo",
                        "mask, source and destination must be co-sized",
                    ));
                }
                let elem = source.mat_type.elem_size();
                for (index, &selected) in mask.data.iter().enumerate() {
                    if selected != 0 {
                        let range = index * elem..(index + 1) * elem;
                        target.data[range.clone()].copy_from_slice(&source.data[range]);
                    }
                }
            }
        }
        Ok(())
    }

    fn cvt_color(&self, _src: MatHandle, _dst: MatHandle, _code: ColorConversion) -> GpuResult<()> {
        mock_mode("gpuMatCvtColor")
    }

    fn add(&self, _a: MatHandle, _b: MatHandle, _c: MatHandle) -> GpuResult<()> {
        mock_mode("gpuMatAdd")
    }

    fn subtract(&self, _a: MatHandle, _b: MatHandle, _c: MatHandle) -> GpuResult<()> {
        mock_mode("gpuMatSubtract")
    }

    fn sobel(
        &self,
        _src: MatHandle,
        _dst: MatHandle,
        _dx: i32,
        _dy: i32,
        _ksize: i32,
        _scale: f64,
    ) -> GpuResult<()> {
        mock_mode("gpuMatSobel")
    }

    fn filter_2d(
        &self,
        _src: MatHandle,
        _dst: MatHandle,
        _kernel: &HostMat,
        _anchor: Point,
    ) -> GpuResult<()> {
        mock_mode("gpuMatFilter2D")
    }

    fn lut(&self, _src: MatHandle, _table: &HostMat, _dst: MatHandle) -> GpuResult<()> {
        mock_mode("gpuMatLUT")
    }

    fn resize(
        &self,
        _src: MatHandle,
        _dst: MatHandle,
        _interpolation: Interpolation,
    ) -> GpuResult<()> {
        mock_mode("gpuMatResize")
    }

    fn split(&self, _src: MatHandle, _dst: &[MatHandle]) -> GpuResult<()> {
        mock_mode("gpuMatSplit")
    }

    fn merge(&self, _src: &[MatHandle], _dst: MatHandle) -> GpuResult<()> {
        mock_mode("gpuMatMerge")
    }

    fn min_max_loc(&self, _src: MatHandle, _mask: Option<MatHandle>) -> GpuResult<MinMaxLoc> {
        mock_mode("gpuMatMinMaxLoc")
    }

    fn count_non_zero(&self, _src: MatHandle) -> GpuResult<i32> {
        mock_mode("gpuMatCountNonZero")
    }

    fn bitwise_xor(
        &self,
        _a: MatHandle,
        _b: MatHandle,
        _dst: MatHandle,
        _mask: Option<MatHandle>,
    ) -> GpuResult<()> {
        mock_mode("gpuMatBitwiseXor")
    }

    fn laplacian(&self, _src: MatHandle, _dst: MatHandle, _ksize: i32, _scale: f64) -> GpuResult<()> {
        mock_mode("gpuMatLaplacian")
    }

    fn matcher_create(&self, distance: DistanceType) -> GpuResult<MatcherHandle> {
        let raw = self.allocate_handle();
        self.matchers.lock().insert(raw, distance);
        Ok(MatcherHandle::from_raw(raw))
    }

    fn matcher_release(&self, slot: &mut Option<MatcherHandle>) {
        if let Some(handle) = slot.take() {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.matchers.lock().remove(&handle.as_raw()).is_none() {
                self.invalid_releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn matcher_knn_match(
        &self,
        _matcher: MatcherHandle,
        _query: MatHandle,
        _train: MatHandle,
        _train_idx: MatHandle,
        _distance: MatHandle,
        _k: i32,
        _mask: Option<MatHandle>,
    ) -> GpuResult<()> {
        mock_mode("gpuBruteForceMatcherKnnMatch")
    }
}
