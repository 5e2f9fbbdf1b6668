//! Device-resident matrices
//!
//! A `GpuMat` owns exactly one native matrix handle. The handle is released
//! once, either by [`GpuMat::release`] or when the value is dropped; the
//! slot is emptied first, so releasing twice never reaches the native side.
//! Any later use of a released matrix returns [`GpuError::Released`].

use crate::context::GpuContext;
use crate::engine::{ComputeEngine, MatHandle};
use crate::error::{GpuError, GpuResult};
use crate::host::{check_dims, HostMat};
use crate::ops;
use crate::types::{Depth, MatType, Size};
use std::fmt;
use std::sync::Arc;

/// Matrix stored in device memory
pub struct GpuMat {
    engine: Arc<dyn ComputeEngine>,
    handle: Option<MatHandle>,
    rows: i32,
    cols: i32,
    mat_type: MatType,
}

impl GpuMat {
    /// Allocate an uninitialized `rows x cols` matrix
    pub fn new(ctx: &GpuContext, rows: i32, cols: i32, mat_type: MatType) -> GpuResult<Self> {
        Self::allocate(ctx.engine().clone(), rows, cols, mat_type)
    }

    /// Allocate a matrix shaped like `host` and upload its content
    pub fn from_host(ctx: &GpuContext, host: &HostMat) -> GpuResult<Self> {
        let engine = ctx.engine().clone();
        let handle = engine.mat_create_from_host(host)?;
        Ok(Self {
            engine,
            handle: Some(handle),
            rows: host.rows(),
            cols: host.cols(),
            mat_type: host.mat_type(),
        })
    }

    /// Allocate another matrix on the same engine with the same shape and type
    pub fn new_like(&self) -> GpuResult<Self> {
        Self::allocate(self.engine.clone(), self.rows, self.cols, self.mat_type)
    }

    /// Allocate another matrix on the same engine
    pub fn new_on_same_engine(&self, rows: i32, cols: i32, mat_type: MatType) -> GpuResult<Self> {
        Self::allocate(self.engine.clone(), rows, cols, mat_type)
    }

    pub(crate) fn allocate(
        engine: Arc<dyn ComputeEngine>,
        rows: i32,
        cols: i32,
        mat_type: MatType,
    ) -> GpuResult<Self> {
        check_dims(rows, cols)?;
        let handle = engine.mat_create(rows, cols, mat_type.to_raw())?;
        Ok(Self {
            engine,
            handle: Some(handle),
            rows,
            cols,
            mat_type,
        })
    }

    /// Rows requested at allocation
    pub fn rows(&self) -> i32 {
        self.rows
    }

    /// Columns requested at allocation
    pub fn cols(&self) -> i32 {
        self.cols
    }

    /// Shape requested at allocation, without a native call
    pub fn dims(&self) -> Size {
        Size::new(self.cols, self.rows)
    }

    /// Element type
    pub fn mat_type(&self) -> MatType {
        self.mat_type
    }

    /// Per-channel depth
    pub fn depth(&self) -> Depth {
        self.mat_type.depth()
    }

    /// Size reported by the native engine (width == cols, height == rows)
    pub fn size(&self) -> GpuResult<Size> {
        self.engine.mat_size(self.handle("size")?)
    }

    /// Channel count reported by the native engine
    pub fn channels(&self) -> GpuResult<i32> {
        self.engine.mat_channels(self.handle("channels")?)
    }

    /// Blocking copy of `host` into this matrix. Shape and type must match.
    pub fn upload(&mut self, host: &HostMat) -> GpuResult<()> {
        let handle = self.handle("upload")?;
        self.check_host("upload", host)?;
        self.engine.mat_upload(handle, host)
    }

    /// Blocking copy of this matrix into `host`. Shape and type must match.
    pub fn download(&self, host: &mut HostMat) -> GpuResult<()> {
        let handle = self.handle("download")?;
        self.check_host("download", host)?;
        self.engine.mat_download(handle, host)
    }

    /// Download into a freshly allocated host matrix
    pub fn to_host(&self) -> GpuResult<HostMat> {
        let mut host = HostMat::zeros(self.rows, self.cols, self.mat_type)?;
        self.download(&mut host)?;
        Ok(host)
    }

    /// Device to device copy, restricted to non-zero `mask` elements when given
    pub fn copy_to(&self, dst: &mut GpuMat, mask: Option<&GpuMat>) -> GpuResult<()> {
        ops::copy(self, dst, mask)
    }

    /// Release the native matrix. Later calls do nothing.
    pub fn release(&mut self) {
        self.engine.mat_release(&mut self.handle);
    }

    /// Whether the native matrix has been released
    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    pub(crate) fn handle(&self, operation: &'static str) -> GpuResult<MatHandle> {
        self.handle.ok_or(GpuError::Released { operation })
    }

    pub(crate) fn engine(&self) -> &Arc<dyn ComputeEngine> {
        &self.engine
    }

    fn check_host(&self, operation: &'static str, host: &HostMat) -> GpuResult<()> {
        if host.size() != self.dims() {
            return Err(GpuError::SizeMismatch {
                operation,
                expected: self.dims(),
                actual: host.size(),
            });
        }
        if host.channels() != self.mat_type.channels() {
            return Err(GpuError::ChannelMismatch {
                operation,
                expected: self.mat_type.channels(),
                actual: host.channels(),
            });
        }
        if host.mat_type() != self.mat_type {
            return Err(GpuError::UnsupportedType {
                operation,
                mat_type: host.mat_type(),
            });
        }
        Ok(())
    }
}

impl Drop for GpuMat {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for GpuMat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuMat")
            .field("engine", &self.engine.name())
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("type", &format_args!("{}", self.mat_type))
            .field("released", &self.is_released())
            .finish()
    }
}

/// Whether two engine references point at the same engine
pub(crate) fn same_engine(a: &Arc<dyn ComputeEngine>, b: &Arc<dyn ComputeEngine>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
