//! Native engine backed by the `cvextern` and OpenCV core shared libraries
//!
//! Entry points are resolved at runtime with `libloading`, so a machine
//! without the libraries (or without a driver) can still link and run the
//! crate; `NativeEngine::load` simply fails and the capability probe
//! reports `false`.
//!
//! Native failures are captured through an error callback registered with
//! `cvRedirectError` when the engine loads. The native side raises right
//! after invoking the callback, so the callback stores the failure in a
//! per-thread slot and unwinds back to the calling entry point itself. Every
//! call catches that unwind and returns the stored failure as an error.
//!
//! Entry points are declared `C-unwind`. A native exception that bypasses
//! the callback still cannot be recovered; it aborts the process instead of
//! crossing into Rust frames unchecked.

use crate::config::EngineConfig;
use crate::engine::{ComputeEngine, MatHandle, MatcherHandle};
use crate::error::{GpuError, GpuResult};
use crate::host::HostMat;
use crate::types::{ColorConversion, DistanceType, Interpolation, MinMaxLoc, Point, Size};
use libloading::{Library, Symbol};
use std::cell::RefCell;
use std::ffi::{c_char, c_double, c_int, c_void, CStr};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace};

/// Size of the buffer handed to `gpuGetDeviceName`.
const DEVICE_NAME_CAPACITY: usize = 1024;

type CvErrorCallback = unsafe extern "C-unwind" fn(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
    userdata: *mut c_void,
) -> c_int;

type FnRedirectError = unsafe extern "C-unwind" fn(
    callback: Option<CvErrorCallback>,
    userdata: *mut c_void,
    prev_userdata: *mut *mut c_void,
) -> Option<CvErrorCallback>;
type FnCreateMatHeader = unsafe extern "C-unwind" fn(rows: c_int, cols: c_int, mat_type: c_int) -> *mut c_void;
type FnSetData = unsafe extern "C-unwind" fn(arr: *mut c_void, data: *mut c_void, step: c_int);
type FnReleaseMat = unsafe extern "C-unwind" fn(mat: *mut *mut c_void);

type FnDeviceCount = unsafe extern "C-unwind" fn() -> c_int;
type FnDeviceName = unsafe extern "C-unwind" fn(device: c_int, buffer: *mut c_char, max_size: c_int);
type FnCurrentDevice = unsafe extern "C-unwind" fn() -> c_int;
type FnComputeCapability = unsafe extern "C-unwind" fn(device: c_int, major: *mut c_int, minor: *mut c_int);
type FnMultiprocessorCount = unsafe extern "C-unwind" fn(device: c_int) -> c_int;

type FnMatCreate = unsafe extern "C-unwind" fn(rows: c_int, cols: c_int, mat_type: c_int) -> *mut c_void;
type FnMatCreateFromArr = unsafe extern "C-unwind" fn(arr: *mut c_void) -> *mut c_void;
type FnMatRelease = unsafe extern "C-unwind" fn(mat: *mut *mut c_void);
type FnMatGetSize = unsafe extern "C-unwind" fn(mat: *mut c_void) -> Size;
type FnMatGetChannels = unsafe extern "C-unwind" fn(mat: *mut c_void) -> c_int;
type FnMatTransfer = unsafe extern "C-unwind" fn(mat: *mut c_void, arr: *mut c_void);
type FnMatCopy = unsafe extern "C-unwind" fn(src: *mut c_void, dst: *mut c_void, mask: *mut c_void);

type FnMatCvtColor = unsafe extern "C-unwind" fn(src: *mut c_void, dst: *mut c_void, code: c_int);
type FnMatBinary = unsafe extern "C-unwind" fn(a: *mut c_void, b: *mut c_void, c: *mut c_void);
type FnMatSobel = unsafe extern "C-unwind" fn(
    src: *mut c_void,
    dst: *mut c_void,
    dx: c_int,
    dy: c_int,
    ksize: c_int,
    scale: c_double,
);
type FnMatFilter2D =
    unsafe extern "C-unwind" fn(src: *mut c_void, dst: *mut c_void, kernel: *mut c_void, anchor: Point);
type FnMatLut = unsafe extern "C-unwind" fn(src: *mut c_void, lut: *mut c_void, dst: *mut c_void);
type FnMatResize = unsafe extern "C-unwind" fn(src: *mut c_void, dst: *mut c_void, interpolation: c_int);
type FnMatSplit = unsafe extern "C-unwind" fn(src: *mut c_void, dst_array: *mut *mut c_void);
type FnMatMerge = unsafe extern "C-unwind" fn(src_array: *mut *mut c_void, dst: *mut c_void);
type FnMatMinMaxLoc = unsafe extern "C-unwind" fn(
    mat: *mut c_void,
    min_val: *mut c_double,
    max_val: *mut c_double,
    min_loc: *mut Point,
    max_loc: *mut Point,
    mask: *mut c_void,
);
type FnMatCountNonZero = unsafe extern "C-unwind" fn(src: *mut c_void) -> c_int;
type FnMatBitwiseXor =
    unsafe extern "C-unwind" fn(a: *mut c_void, b: *mut c_void, dst: *mut c_void, mask: *mut c_void);
type FnMatLaplacian =
    unsafe extern "C-unwind" fn(src: *mut c_void, dst: *mut c_void, ksize: c_int, scale: c_double);

type FnMatcherCreate = unsafe extern "C-unwind" fn(distance: c_int) -> *mut c_void;
type FnMatcherRelease = unsafe extern "C-unwind" fn(matcher: *mut *mut c_void);
type FnMatcherKnnMatch = unsafe extern "C-unwind" fn(
    matcher: *mut c_void,
    query: *mut c_void,
    train: *mut c_void,
    train_idx: *mut c_void,
    distance: *mut c_void,
    k: c_int,
    mask: *mut c_void,
);

thread_local! {
    static NATIVE_ERROR: RefCell<Option<GpuError>> = const { RefCell::new(None) };
}

/// Unwind payload raised by [`on_native_error`]
struct NativeRaise;

/// Error callback registered with `cvRedirectError`.
///
/// Records the failure, then unwinds to the entry point wrapper in
/// [`guarded`] so the native `throw` that follows the callback never runs.
unsafe extern "C-unwind" fn on_native_error(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
    _userdata: *mut c_void,
) -> c_int {
    // SAFETY: forwarded from the native caller.
    unsafe { record_native_error(status, func_name, err_msg, file_name, line) };
    panic::resume_unwind(Box::new(NativeRaise))
}

/// Keep the first failure raised during a call
unsafe fn record_native_error(
    status: c_int,
    func_name: *const c_char,
    err_msg: *const c_char,
    file_name: *const c_char,
    line: c_int,
) {
    // SAFETY: the native library passes NUL-terminated strings or null.
    let failure = unsafe {
        GpuError::Native {
            status,
            function: lossy(func_name),
            message: lossy(err_msg),
            file: lossy(file_name),
            line,
        }
    };
    let _ = NATIVE_ERROR.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
    });
}

unsafe fn lossy(text: *const c_char) -> String {
    if text.is_null() {
        String::new()
    } else {
        // SAFETY: caller guarantees a valid NUL-terminated string.
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }
}

fn clear_native_error() {
    NATIVE_ERROR.with(|slot| slot.borrow_mut().take());
}

fn take_native_error() -> Option<GpuError> {
    NATIVE_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Run one native call and turn a failure reported through the error
/// callback into an error. Panics that did not come from the callback are
/// resumed.
fn guarded<T>(entry: &'static str, f: impl FnOnce() -> T) -> GpuResult<T> {
    clear_native_error();
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    let failure = match outcome {
        Ok(value) => match take_native_error() {
            None => return Ok(value),
            Some(err) => err,
        },
        Err(payload) if payload.is::<NativeRaise>() => {
            take_native_error().unwrap_or_else(|| GpuError::Native {
                status: 0,
                function: entry.to_string(),
                message: "native call raised without a recorded error".to_string(),
                file: String::new(),
                line: 0,
            })
        }
        Err(payload) => panic::resume_unwind(payload),
    };
    debug!(entry, error = %failure, "native call failed");
    Err(failure)
}

fn mat_ptr(mat: MatHandle) -> *mut c_void {
    mat.as_raw() as *mut c_void
}

fn mask_ptr(mask: Option<MatHandle>) -> *mut c_void {
    mask.map_or(ptr::null_mut(), mat_ptr)
}

/// Resolved entry points
struct Symbols {
    redirect_error: FnRedirectError,
    create_mat_header: FnCreateMatHeader,
    set_data: FnSetData,
    release_mat: FnReleaseMat,

    device_count: FnDeviceCount,
    device_name: FnDeviceName,
    current_device: FnCurrentDevice,
    compute_capability: FnComputeCapability,
    multiprocessor_count: FnMultiprocessorCount,

    mat_create: FnMatCreate,
    mat_create_from_arr: FnMatCreateFromArr,
    mat_release: FnMatRelease,
    mat_get_size: FnMatGetSize,
    mat_get_channels: FnMatGetChannels,
    mat_upload: FnMatTransfer,
    mat_download: FnMatTransfer,
    mat_copy: FnMatCopy,

    mat_cvt_color: FnMatCvtColor,
    mat_add: FnMatBinary,
    mat_subtract: FnMatBinary,
    mat_sobel: FnMatSobel,
    mat_filter_2d: FnMatFilter2D,
    mat_lut: FnMatLut,
    mat_resize: FnMatResize,
    mat_split: FnMatSplit,
    mat_merge: FnMatMerge,
    mat_min_max_loc: FnMatMinMaxLoc,
    mat_count_non_zero: FnMatCountNonZero,
    mat_bitwise_xor: FnMatBitwiseXor,
    mat_laplacian: FnMatLaplacian,

    matcher_create: FnMatcherCreate,
    matcher_release: FnMatcherRelease,
    matcher_knn_match: FnMatcherKnnMatch,
}

impl Symbols {
    /// # Safety
    /// The libraries must export the entry points with the signatures
    /// declared above.
    unsafe fn resolve(core: &Library, ext: &Library) -> GpuResult<Self> {
        // SAFETY: forwarded from the caller.
        unsafe {
            Ok(Self {
                redirect_error: load_fn(core, "cvRedirectError")?,
                create_mat_header: load_fn(core, "cvCreateMatHeader")?,
                set_data: load_fn(core, "cvSetData")?,
                release_mat: load_fn(core, "cvReleaseMat")?,

                device_count: load_fn(ext, "gpuGetCudaEnabledDeviceCount")?,
                device_name: load_fn(ext, "gpuGetDeviceName")?,
                current_device: load_fn(ext, "gpuGetDevice")?,
                compute_capability: load_fn(ext, "gpuGetComputeCapability")?,
                multiprocessor_count: load_fn(ext, "gpuGetNumberOfSMs")?,

                mat_create: load_fn(ext, "gpuMatCreate")?,
                mat_create_from_arr: load_fn(ext, "gpuMatCreateFromArr")?,
                mat_release: load_fn(ext, "gpuMatRelease")?,
                mat_get_size: load_fn(ext, "gpuMatGetSize")?,
                mat_get_channels: load_fn(ext, "gpuMatGetChannels")?,
                mat_upload: load_fn(ext, "gpuMatUpload")?,
                mat_download: load_fn(ext, "gpuMatDownload")?,
                mat_copy: load_fn(ext, "gpuMatCopy")?,

                mat_cvt_color: load_fn(ext, "gpuMatCvtColor")?,
                mat_add: load_fn(ext, "gpuMatAdd")?,
                mat_subtract: load_fn(ext, "gpuMatSubtract")?,
                mat_sobel: load_fn(ext, "gpuMatSobel")?,
                mat_filter_2d: load_fn(ext, "gpuMatFilter2D")?,
                mat_lut: load_fn(ext, "gpuMatLUT")?,
                mat_resize: load_fn(ext, "gpuMatResize")?,
                mat_split: load_fn(ext, "gpuMatSplit")?,
                mat_merge: load_fn(ext, "gpuMatMerge")?,
                mat_min_max_loc: load_fn(ext, "gpuMatMinMaxLoc")?,
                mat_count_non_zero: load_fn(ext, "gpuMatCountNonZero")?,
                mat_bitwise_xor: load_fn(ext, "gpuMatBitwiseXor")?,
                mat_laplacian: load_fn(ext, "gpuMatLaplacian")?,

                matcher_create: load_fn(ext, "gpuBruteForceMatcherCreate")?,
                matcher_release: load_fn(ext, "gpuBruteForceMatcherRelease")?,
                matcher_knn_match: load_fn(ext, "gpuBruteForceMatcherKnnMatch")?,
            })
        }
    }
}

unsafe fn load_fn<F: Copy>(lib: &Library, name: &str) -> GpuResult<F> {
    // SAFETY: the caller asserts that `F` matches the exported signature.
    let symbol: Symbol<F> =
        unsafe { lib.get(name.as_bytes()) }.map_err(|e| GpuError::MissingSymbol {
            symbol: name.to_string(),
            message: e.to_string(),
        })?;
    Ok(*symbol)
}

fn open_library(config: &EngineConfig, library: &str) -> GpuResult<Library> {
    let mut last_err = String::from("no candidate paths");
    for candidate in config.candidates(library) {
        // SAFETY: loading runs the library's initializers; the configured
        // libraries are the OpenCV binaries this crate binds to.
        match unsafe { Library::new(&candidate) } {
            Ok(lib) => {
                info!(library = %candidate.to_string_lossy(), "loaded native library");
                return Ok(lib);
            }
            Err(e) => {
                debug!(
                    library = %candidate.to_string_lossy(),
                    error = %e,
                    "failed to load native library"
                );
                last_err = e.to_string();
            }
        }
    }
    Err(GpuError::LibraryLoad {
        library: library.to_string(),
        message: last_err,
    })
}

/// `CvMat` header wrapping a `HostMat` buffer for the length of one call.
struct HostHeader<'a> {
    symbols: &'a Symbols,
    header: *mut c_void,
    _buffer: PhantomData<&'a mut [u8]>,
}

impl<'a> HostHeader<'a> {
    fn new(engine: &'a NativeEngine, host: &'a HostMat, data: *mut u8) -> GpuResult<Self> {
        let symbols = &engine.symbols;
        let header = engine.call("cvCreateMatHeader", || {
            // SAFETY: plain allocation of a header; dimensions were validated by HostMat.
            unsafe { (symbols.create_mat_header)(host.rows(), host.cols(), host.mat_type().to_raw()) }
        })?;
        if header.is_null() {
            return Err(GpuError::NullHandle {
                operation: "cvCreateMatHeader",
            });
        }
        let guard = Self {
            symbols,
            header,
            _buffer: PhantomData,
        };
        let step = c_int::try_from(host.step()).map_err(|_| GpuError::InvalidParameter {
            parameter: "step",
            reason: format!("{} bytes per row exceeds the native row stride", host.step()),
        })?;
        engine.call("cvSetData", || {
            // SAFETY: `data` points to rows * step bytes owned by `host`, which
            // outlives the header.
            unsafe { (symbols.set_data)(header, data.cast(), step) }
        })?;
        Ok(guard)
    }

    fn as_ptr(&self) -> *mut c_void {
        self.header
    }
}

impl Drop for HostHeader<'_> {
    fn drop(&mut self) {
        let release = self.symbols.release_mat;
        let header = &mut self.header;
        // SAFETY: the header came from cvCreateMatHeader and owns no data.
        let _ = guarded("cvReleaseMat", || unsafe { release(header) });
    }
}

/// Engine calling into the native libraries
pub struct NativeEngine {
    symbols: Symbols,
    // Kept alive for the lifetime of `symbols`.
    _extern_lib: Library,
    _core_lib: Library,
}

static GLOBAL_ENGINE: OnceLock<GpuResult<Arc<NativeEngine>>> = OnceLock::new();

impl NativeEngine {
    /// Open the configured libraries, resolve every entry point and register
    /// the error callback.
    pub fn load(config: &EngineConfig) -> GpuResult<Self> {
        let core_lib = open_library(config, &config.core_library)?;
        let extern_lib = open_library(config, &config.extern_library)?;

        // SAFETY: the libraries are the OpenCV core C API and the cvextern
        // shim; the declared signatures mirror their exports.
        let symbols = unsafe { Symbols::resolve(&core_lib, &extern_lib)? };

        let mut prev_userdata: *mut c_void = ptr::null_mut();
        // SAFETY: the callback only unwinds into entry points declared
        // `C-unwind`, and every such call runs inside `guarded`.
        unsafe {
            (symbols.redirect_error)(
                Some(on_native_error),
                ptr::null_mut(),
                &mut prev_userdata,
            )
        };
        debug!("native error callback registered");

        Ok(Self {
            symbols,
            _extern_lib: extern_lib,
            _core_lib: core_lib,
        })
    }

    /// Process-wide engine configured from the environment.
    ///
    /// The first call loads the libraries; the outcome (engine or error) is
    /// shared by every later call.
    pub fn global() -> GpuResult<Arc<NativeEngine>> {
        GLOBAL_ENGINE
            .get_or_init(|| NativeEngine::load(&EngineConfig::from_env()).map(Arc::new))
            .clone()
    }

    fn call<T>(&self, entry: &'static str, f: impl FnOnce() -> T) -> GpuResult<T> {
        guarded(entry, f)
    }

    fn new_mat(&self, entry: &'static str, raw: *mut c_void) -> GpuResult<MatHandle> {
        if raw.is_null() {
            return Err(GpuError::NullHandle { operation: entry });
        }
        let handle = MatHandle::from_raw(raw as usize);
        trace!(entry, ?handle, "allocated device matrix");
        Ok(handle)
    }
}

impl ComputeEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn device_count(&self) -> GpuResult<i32> {
        let f = self.symbols.device_count;
        // SAFETY: no arguments.
        self.call("gpuGetCudaEnabledDeviceCount", || unsafe { f() })
    }

    fn device_name(&self, device: i32) -> GpuResult<String> {
        let f = self.symbols.device_name;
        let mut buffer = vec![0u8; DEVICE_NAME_CAPACITY];
        // SAFETY: the buffer holds DEVICE_NAME_CAPACITY bytes.
        self.call("gpuGetDeviceName", || unsafe {
            f(device, buffer.as_mut_ptr().cast(), DEVICE_NAME_CAPACITY as c_int)
        })?;
        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
    }

    fn current_device(&self) -> GpuResult<i32> {
        let f = self.symbols.current_device;
        // SAFETY: no arguments.
        self.call("gpuGetDevice", || unsafe { f() })
    }

    fn compute_capability(&self, device: i32) -> GpuResult<(i32, i32)> {
        let f = self.symbols.compute_capability;
        let (mut major, mut minor): (c_int, c_int) = (0, 0);
        // SAFETY: both out-pointers reference live locals.
        self.call("gpuGetComputeCapability", || unsafe {
            f(device, &mut major, &mut minor)
        })?;
        Ok((major, minor))
    }

    fn multiprocessor_count(&self, device: i32) -> GpuResult<i32> {
        let f = self.symbols.multiprocessor_count;
        // SAFETY: scalar argument only.
        self.call("gpuGetNumberOfSMs", || unsafe { f(device) })
    }

    fn mat_create(&self, rows: i32, cols: i32, mat_type: i32) -> GpuResult<MatHandle> {
        let f = self.symbols.mat_create;
        // SAFETY: scalar arguments only.
        let raw = self.call("gpuMatCreate", || unsafe { f(rows, cols, mat_type) })?;
        self.new_mat("gpuMatCreate", raw)
    }

    fn mat_create_from_host(&self, host: &HostMat) -> GpuResult<MatHandle> {
        let f = self.symbols.mat_create_from_arr;
        // The native side only reads through the header.
        let header = HostHeader::new(self, host, host.data_ptr().cast_mut())?;
        // SAFETY: the header is valid until `header` drops.
        let raw = self.call("gpuMatCreateFromArr", || unsafe { f(header.as_ptr()) })?;
        self.new_mat("gpuMatCreateFromArr", raw)
    }

    fn mat_release(&self, slot: &mut Option<MatHandle>) {
        if let Some(handle) = slot.take() {
            let f = self.symbols.mat_release;
            let mut raw = mat_ptr(handle);
            trace!(?handle, "releasing device matrix");
            // SAFETY: `handle` came from gpuMatCreate* and was taken out of
            // its slot, so it is released exactly once.
            let _ = self.call("gpuMatRelease", || unsafe { f(&mut raw) });
        }
    }

    fn mat_size(&self, mat: MatHandle) -> GpuResult<Size> {
        let f = self.symbols.mat_get_size;
        // SAFETY: `mat` is a live matrix handle.
        self.call("gpuMatGetSize", || unsafe { f(mat_ptr(mat)) })
    }

    fn mat_channels(&self, mat: MatHandle) -> GpuResult<i32> {
        let f = self.symbols.mat_get_channels;
        // SAFETY: `mat` is a live matrix handle.
        self.call("gpuMatGetChannels", || unsafe { f(mat_ptr(mat)) })
    }

    fn mat_upload(&self, mat: MatHandle, host: &HostMat) -> GpuResult<()> {
        let f = self.symbols.mat_upload;
        // The native side only reads through the header.
        let header = HostHeader::new(self, host, host.data_ptr().cast_mut())?;
        // SAFETY: `mat` is live and the header outlives the call.
        self.call("gpuMatUpload", || unsafe { f(mat_ptr(mat), header.as_ptr()) })
    }

    fn mat_download(&self, mat: MatHandle, host: &mut HostMat) -> GpuResult<()> {
        let f = self.symbols.mat_download;
        let data = host.data_mut_ptr();
        let header = HostHeader::new(self, host, data)?;
        // SAFETY: `mat` is live; shape and type were checked by the caller
        // so the native side writes inside the buffer.
        self.call("gpuMatDownload", || unsafe { f(mat_ptr(mat), header.as_ptr()) })
    }

    fn mat_copy(&self, src: MatHandle, dst: MatHandle, mask: Option<MatHandle>) -> GpuResult<()> {
        let f = self.symbols.mat_copy;
        // SAFETY: live handles; a null mask means "no mask".
        self.call("gpuMatCopy", || unsafe {
            f(mat_ptr(src), mat_ptr(dst), mask_ptr(mask))
        })
    }

    fn cvt_color(&self, src: MatHandle, dst: MatHandle, code: ColorConversion) -> GpuResult<()> {
        let f = self.symbols.mat_cvt_color;
        // SAFETY: live handles.
        self.call("gpuMatCvtColor", || unsafe {
            f(mat_ptr(src), mat_ptr(dst), code.code())
        })
    }

    fn add(&self, a: MatHandle, b: MatHandle, c: MatHandle) -> GpuResult<()> {
        let f = self.symbols.mat_add;
        // SAFETY: live handles.
        self.call("gpuMatAdd", || unsafe { f(mat_ptr(a), mat_ptr(b), mat_ptr(c)) })
    }

    fn subtract(&self, a: MatHandle, b: MatHandle, c: MatHandle) -> GpuResult<()> {
        let f = self.symbols.mat_subtract;
        // SAFETY: live handles.
        self.call("gpuMatSubtract", || unsafe {
            f(mat_ptr(a), mat_ptr(b), mat_ptr(c))
        })
    }

    fn sobel(
        &self,
        src: MatHandle,
        dst: MatHandle,
        dx: i32,
        dy: i32,
        ksize: i32,
        scale: f64,
    ) -> GpuResult<()> {
        let f = self.symbols.mat_sobel;
        // SAFETY: live handles and scalars.
        self.call("gpuMatSobel", || unsafe {
            f(mat_ptr(src), mat_ptr(dst), dx, dy, ksize, scale)
        })
    }

    fn filter_2d(
        &self,
        src: MatHandle,
        dst: MatHandle,
        kernel: &HostMat,
        anchor: Point,
    ) -> GpuResult<()> {
        let f = self.symbols.mat_filter_2d;
        // The native side only reads the kernel.
        let header = HostHeader::new(self, kernel, kernel.data_ptr().cast_mut())?;
        // SAFETY: live handles; the kernel header outlives the call.
        self.call("gpuMatFilter2D", || unsafe {
            f(mat_ptr(src), mat_ptr(dst), header.as_ptr(), anchor)
        })
    }

    fn lut(&self, src: MatHandle, table: &HostMat, dst: MatHandle) -> GpuResult<()> {
        let f = self.symbols.mat_lut;
        // The native side only reads the table.
        let header = HostHeader::new(self, table, table.data_ptr().cast_mut())?;
        // SAFETY: live handles; the table header outlives the call.
        self.call("gpuMatLUT", || unsafe {
            f(mat_ptr(src), header.as_ptr(), mat_ptr(dst))
        })
    }

    fn resize(
        &self,
        src: MatHandle,
        dst: MatHandle,
        interpolation: Interpolation,
    ) -> GpuResult<()> {
        let f = self.symbols.mat_resize;
        // SAFETY: live handles.
        self.call("gpuMatResize", || unsafe {
            f(mat_ptr(src), mat_ptr(dst), interpolation.code())
        })
    }

    fn split(&self, src: MatHandle, dst: &[MatHandle]) -> GpuResult<()> {
        let f = self.symbols.mat_split;
        let mut planes: Vec<*mut c_void> = dst.iter().copied().map(mat_ptr).collect();
        // SAFETY: `planes` holds one live handle per source channel.
        self.call("gpuMatSplit", || unsafe { f(mat_ptr(src), planes.as_mut_ptr()) })
    }

    fn merge(&self, src: &[MatHandle], dst: MatHandle) -> GpuResult<()> {
        let f = self.symbols.mat_merge;
        let mut planes: Vec<*mut c_void> = src.iter().copied().map(mat_ptr).collect();
        // SAFETY: `planes` holds one live handle per destination channel.
        self.call("gpuMatMerge", || unsafe { f(planes.as_mut_ptr(), mat_ptr(dst)) })
    }

    fn min_max_loc(&self, src: MatHandle, mask: Option<MatHandle>) -> GpuResult<MinMaxLoc> {
        let f = self.symbols.mat_min_max_loc;
        let mut out = MinMaxLoc::default();
        // SAFETY: every out-pointer references a field of `out`.
        self.call("gpuMatMinMaxLoc", || unsafe {
            f(
                mat_ptr(src),
                &mut out.min_val,
                &mut out.max_val,
                &mut out.min_loc,
                &mut out.max_loc,
                mask_ptr(mask),
            )
        })?;
        Ok(out)
    }

    fn count_non_zero(&self, src: MatHandle) -> GpuResult<i32> {
        let f = self.symbols.mat_count_non_zero;
        // SAFETY: live handle.
        self.call("gpuMatCountNonZero", || unsafe { f(mat_ptr(src)) })
    }

    fn bitwise_xor(
        &self,
        a: MatHandle,
        b: MatHandle,
        dst: MatHandle,
        mask: Option<MatHandle>,
    ) -> GpuResult<()> {
        let f = self.symbols.mat_bitwise_xor;
        // SAFETY: live handles; a null mask means "no mask".
        self.call("gpuMatBitwiseXor", || unsafe {
            f(mat_ptr(a), mat_ptr(b), mat_ptr(dst), mask_ptr(mask))
        })
    }

    fn laplacian(&self, src: MatHandle, dst: MatHandle, ksize: i32, scale: f64) -> GpuResult<()> {
        let f = self.symbols.mat_laplacian;
        // SAFETY: live handles.
        self.call("gpuMatLaplacian", || unsafe {
            f(mat_ptr(src), mat_ptr(dst), ksize, scale)
        })
    }

    fn matcher_create(&self, distance: DistanceType) -> GpuResult<MatcherHandle> {
        let f = self.symbols.matcher_create;
        // SAFETY: scalar argument only.
        let raw = self.call("gpuBruteForceMatcherCreate", || unsafe { f(distance.code()) })?;
        if raw.is_null() {
            return Err(GpuError::NullHandle {
                operation: "gpuBruteForceMatcherCreate",
            });
        }
        Ok(MatcherHandle::from_raw(raw as usize))
    }

    fn matcher_release(&self, slot: &mut Option<MatcherHandle>) {
        if let Some(handle) = slot.take() {
            let f = self.symbols.matcher_release;
            let mut raw = handle.as_raw() as *mut c_void;
            trace!(?handle, "releasing matcher");
            // SAFETY: taken out of its slot, so released exactly once.
            let _ = self.call("gpuBruteForceMatcherRelease", || unsafe { f(&mut raw) });
        }
    }

    fn matcher_knn_match(
        &self,
        matcher: MatcherHandle,
        query: MatHandle,
        train: MatHandle,
        train_idx: MatHandle,
        distance: MatHandle,
        k: i32,
        mask: Option<MatHandle>,
    ) -> GpuResult<()> {
        let f = self.symbols.matcher_knn_match;
        // SAFETY: live handles; outputs were pre-allocated with the shapes
        // the native matcher produces.
        self.call("gpuBruteForceMatcherKnnMatch", || unsafe {
            f(
                matcher.as_raw() as *mut c_void,
                mat_ptr(query),
                mat_ptr(train),
                mat_ptr(train_idx),
                mat_ptr(distance),
                k,
                mask_ptr(mask),
            )
        })
    }
}
