//! Image operators
//!
//! Every operator validates its operands on the host, then makes exactly one
//! call into the engine. Destinations are allocated by the caller with the
//! type and size the operator documents; nothing here reallocates them.
//! A rejected call never reaches the engine.

use crate::engine::{ComputeEngine, MatHandle};
use crate::error::{GpuError, GpuResult};
use crate::host::HostMat;
use crate::mat::{same_engine, GpuMat};
use crate::types::{ColorConversion, Depth, Interpolation, MatType, MinMaxLoc, Point, Size};
use std::sync::Arc;

const ARITHMETIC_TYPES: &[MatType] = &[
    MatType::CV_8UC1,
    MatType::CV_8UC4,
    MatType::CV_32SC1,
    MatType::CV_32FC1,
];

const SOBEL_TYPES: &[MatType] = &[
    MatType::CV_8UC1,
    MatType::CV_8UC4,
    MatType::CV_16SC1,
    MatType::CV_16SC2,
    MatType::CV_32SC1,
    MatType::CV_32FC1,
];

const IMAGE_TYPES: &[MatType] = &[MatType::CV_8UC1, MatType::CV_8UC4];

const LUT_TYPES: &[MatType] = &[MatType::CV_8UC1, MatType::CV_8UC3];

/// Entries in a lookup table
pub const LUT_ENTRIES: usize = 256;

/// Convert `src` between color spaces.
///
/// `src` must have depth 8U, 16U or 32F and the channel count `code` reads;
/// `dst` has the same depth and size and the channel count `code` writes.
pub fn cvt_color(src: &GpuMat, dst: &mut GpuMat, code: ColorConversion) -> GpuResult<()> {
    const OP: &str = "cvt_color";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, src, &[&*dst])?;

    if !matches!(src.depth(), Depth::U8 | Depth::U16 | Depth::F32) {
        return Err(unsupported(OP, src));
    }
    require_channels(OP, src, code.src_channels())?;
    require_size(OP, src.dims(), dst)?;
    require_channels(OP, dst, code.dst_channels())?;
    if dst.depth() != src.depth() {
        return Err(unsupported(OP, dst));
    }

    engine.cvt_color(src_h, dst_h, code)
}

/// Copy `src` into `dst`, only where `mask` is non-zero when a mask is given
pub fn copy(src: &GpuMat, dst: &mut GpuMat, mask: Option<&GpuMat>) -> GpuResult<()> {
    const OP: &str = "copy";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, src, &[&*dst])?;
    require_like(OP, src, dst)?;
    let mask_h = mask_handle(OP, engine, mask, src.dims())?;

    engine.mat_copy(src_h, dst_h, mask_h)
}

/// c = a + b, saturating for integer types
pub fn add(a: &GpuMat, b: &GpuMat, c: &mut GpuMat) -> GpuResult<()> {
    const OP: &str = "add";
    let (engine, a_h, b_h, c_h) = binary_operands(OP, a, b, c, ARITHMETIC_TYPES)?;
    engine.add(a_h, b_h, c_h)
}

/// c = a - b, saturating for integer types
pub fn subtract(a: &GpuMat, b: &GpuMat, c: &mut GpuMat) -> GpuResult<()> {
    const OP: &str = "subtract";
    let (engine, a_h, b_h, c_h) = binary_operands(OP, a, b, c, ARITHMETIC_TYPES)?;
    engine.subtract(a_h, b_h, c_h)
}

/// Sobel derivative of order (`dx`, `dy`) with aperture `ksize`, scaled by `scale`.
///
/// `ksize` is 1, 3, 5 or 7. Aperture 1 uses a 3-tap kernel, so it accepts
/// derivative orders up to 2.
pub fn sobel(
    src: &GpuMat,
    dst: &mut GpuMat,
    dx: i32,
    dy: i32,
    ksize: i32,
    scale: f64,
) -> GpuResult<()> {
    const OP: &str = "sobel";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, src, &[&*dst])?;
    require_type(OP, src, SOBEL_TYPES)?;
    require_like(OP, src, dst)?;
    check_sobel_params(dx, dy, ksize)?;

    engine.sobel(src_h, dst_h, dx, dy, ksize, scale)
}

/// Correlate `src` with a host `kernel` of type 32FC1.
///
/// `anchor` is a point inside the kernel or [`Point::KERNEL_CENTER`].
pub fn filter_2d(src: &GpuMat, dst: &mut GpuMat, kernel: &HostMat, anchor: Point) -> GpuResult<()> {
    const OP: &str = "filter_2d";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, src, &[&*dst])?;
    require_type(OP, src, IMAGE_TYPES)?;
    require_like(OP, src, dst)?;

    if kernel.mat_type() != MatType::CV_32FC1 {
        return Err(GpuError::UnsupportedType {
            operation: OP,
            mat_type: kernel.mat_type(),
        });
    }
    check_anchor(anchor, kernel.size())?;

    engine.filter_2d(src_h, dst_h, kernel, anchor)
}

/// dst(i) = table(src(i)).
///
/// `table` holds 256 entries with one channel or as many channels as `src`.
/// `dst` has the depth of the table and the channel count of `src`.
pub fn lut(src: &GpuMat, table: &HostMat, dst: &mut GpuMat) -> GpuResult<()> {
    const OP: &str = "lut";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, src, &[&*dst])?;
    require_type(OP, src, LUT_TYPES)?;

    let entries = table.size().area();
    if entries != LUT_ENTRIES {
        return Err(GpuError::InvalidParameter {
            parameter: "table",
            reason: format!("expected {LUT_ENTRIES} entries, got {entries}"),
        });
    }
    let table_channels = table.channels();
    if table_channels != 1 && table_channels != src.mat_type().channels() {
        return Err(GpuError::ChannelMismatch {
            operation: OP,
            expected: src.mat_type().channels(),
            actual: table_channels,
        });
    }

    require_size(OP, src.dims(), dst)?;
    let expected = MatType::new(table.mat_type().depth(), src.mat_type().channels())?;
    require_type(OP, dst, &[expected])?;

    engine.lut(src_h, table, dst_h)
}

/// Resize `src` to the size of `dst`. Only nearest and linear interpolation
/// are available.
pub fn resize(src: &GpuMat, dst: &mut GpuMat, interpolation: Interpolation) -> GpuResult<()> {
    const OP: &str = "resize";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    if !interpolation.is_resize_supported() {
        return Err(GpuError::UnsupportedInterpolation {
            interpolation: interpolation.name().to_string(),
        });
    }
    let engine = engine_for(OP, src, &[&*dst])?;
    require_type(OP, src, IMAGE_TYPES)?;
    require_type(OP, dst, &[src.mat_type()])?;

    engine.resize(src_h, dst_h, interpolation)
}

/// Split a multi-channel matrix into newly allocated single-channel matrices.
///
/// All outputs are allocated before the native call; if it fails they are
/// released together.
pub fn split(src: &GpuMat) -> GpuResult<Vec<GpuMat>> {
    const OP: &str = "split";
    src.handle(OP)?;
    let channels = src.mat_type().channels();
    if channels < 2 {
        return Err(unsupported(OP, src));
    }
    let plane = src.mat_type().with_channels(1)?;
    let mut planes = (0..channels)
        .map(|_| src.new_on_same_engine(src.rows(), src.cols(), plane))
        .collect::<GpuResult<Vec<_>>>()?;
    split_into(src, &mut planes)?;
    Ok(planes)
}

/// Split `src` into caller-allocated single-channel matrices, one per channel
pub fn split_into(src: &GpuMat, dst: &mut [GpuMat]) -> GpuResult<()> {
    const OP: &str = "split";
    let src_h = src.handle(OP)?;
    let channels = src.mat_type().channels();
    if channels < 2 {
        return Err(unsupported(OP, src));
    }
    if dst.len() != channels as usize {
        return Err(GpuError::ChannelMismatch {
            operation: OP,
            expected: channels,
            actual: dst.len() as i32,
        });
    }

    let engine = src.engine();
    let plane = src.mat_type().with_channels(1)?;
    let mut handles = Vec::with_capacity(dst.len());
    for mat in dst.iter() {
        handles.push(mat.handle(OP)?);
        if !same_engine(engine, mat.engine()) {
            return Err(GpuError::EngineMismatch { operation: OP });
        }
        require_size(OP, src.dims(), mat)?;
        require_type(OP, mat, &[plane])?;
    }

    engine.split(src_h, &handles)
}

/// Merge 2 to 4 single-channel matrices of one type and size into `dst`
pub fn merge(src: &[&GpuMat], dst: &mut GpuMat) -> GpuResult<()> {
    const OP: &str = "merge";
    let dst_h = dst.handle(OP)?;
    let first = match src.first() {
        Some(first) if (2..=4).contains(&src.len()) => *first,
        _ => {
            return Err(GpuError::InvalidParameter {
                parameter: "src",
                reason: format!("expected 2 to 4 matrices, got {}", src.len()),
            })
        }
    };
    let engine = engine_for(OP, first, &[&*dst])?;
    require_channels(OP, first, 1)?;

    let mut handles = Vec::with_capacity(src.len());
    for mat in src {
        handles.push(mat.handle(OP)?);
        if !same_engine(engine, mat.engine()) {
            return Err(GpuError::EngineMismatch { operation: OP });
        }
        require_like(OP, first, mat)?;
    }

    require_size(OP, first.dims(), dst)?;
    let merged = first.mat_type().with_channels(src.len() as i32)?;
    require_type(OP, dst, &[merged])?;

    engine.merge(&handles, dst_h)
}

/// Minimum and maximum of a single-channel matrix with their locations
pub fn min_max_loc(src: &GpuMat, mask: Option<&GpuMat>) -> GpuResult<MinMaxLoc> {
    const OP: &str = "min_max_loc";
    let src_h = src.handle(OP)?;
    require_channels(OP, src, 1)?;
    let mask_h = mask_handle(OP, src.engine(), mask, src.dims())?;

    src.engine().min_max_loc(src_h, mask_h)
}

/// Number of non-zero elements in a single-channel matrix
pub fn count_non_zero(src: &GpuMat) -> GpuResult<usize> {
    const OP: &str = "count_non_zero";
    let src_h = src.handle(OP)?;
    require_channels(OP, src, 1)?;

    let count = src.engine().count_non_zero(src_h)?;
    Ok(count.max(0) as usize)
}

/// dst = a ^ b, only where `mask` is non-zero when a mask is given
pub fn bitwise_xor(a: &GpuMat, b: &GpuMat, dst: &mut GpuMat, mask: Option<&GpuMat>) -> GpuResult<()> {
    const OP: &str = "bitwise_xor";
    let (a_h, b_h, dst_h) = (a.handle(OP)?, b.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, a, &[b, &*dst])?;
    require_like(OP, a, b)?;
    require_like(OP, a, dst)?;
    let mask_h = mask_handle(OP, engine, mask, a.dims())?;

    engine.bitwise_xor(a_h, b_h, dst_h, mask_h)
}

/// Laplacian of `src` with aperture 1 or 3, scaled by `scale`
pub fn laplacian(src: &GpuMat, dst: &mut GpuMat, ksize: i32, scale: f64) -> GpuResult<()> {
    const OP: &str = "laplacian";
    let (src_h, dst_h) = (src.handle(OP)?, dst.handle(OP)?);
    let engine = engine_for(OP, src, &[&*dst])?;
    require_type(OP, src, IMAGE_TYPES)?;
    require_like(OP, src, dst)?;
    if ksize != 1 && ksize != 3 {
        return Err(GpuError::InvalidParameter {
            parameter: "ksize",
            reason: format!("{ksize} is not 1 or 3"),
        });
    }

    engine.laplacian(src_h, dst_h, ksize, scale)
}

type BinaryOperands<'a> = (&'a Arc<dyn ComputeEngine>, MatHandle, MatHandle, MatHandle);

fn binary_operands<'a>(
    operation: &'static str,
    a: &'a GpuMat,
    b: &GpuMat,
    c: &GpuMat,
    accepted: &[MatType],
) -> GpuResult<BinaryOperands<'a>> {
    let (a_h, b_h, c_h) = (a.handle(operation)?, b.handle(operation)?, c.handle(operation)?);
    let engine = engine_for(operation, a, &[b, c])?;
    require_type(operation, a, accepted)?;
    require_like(operation, a, b)?;
    require_like(operation, a, c)?;
    Ok((engine, a_h, b_h, c_h))
}

pub(crate) fn engine_for<'a>(
    operation: &'static str,
    first: &'a GpuMat,
    rest: &[&GpuMat],
) -> GpuResult<&'a Arc<dyn ComputeEngine>> {
    let engine = first.engine();
    if rest.iter().all(|mat| same_engine(engine, mat.engine())) {
        Ok(engine)
    } else {
        Err(GpuError::EngineMismatch { operation })
    }
}

/// Validate an optional 8UC1 mask of `size` and return its handle
pub(crate) fn mask_handle(
    operation: &'static str,
    engine: &Arc<dyn ComputeEngine>,
    mask: Option<&GpuMat>,
    size: Size,
) -> GpuResult<Option<MatHandle>> {
    let Some(mask) = mask else {
        return Ok(None);
    };
    let handle = mask.handle(operation)?;
    if !same_engine(engine, mask.engine()) {
        return Err(GpuError::EngineMismatch { operation });
    }
    require_type(operation, mask, &[MatType::CV_8UC1])?;
    require_size(operation, size, mask)?;
    Ok(Some(handle))
}

fn unsupported(operation: &'static str, mat: &GpuMat) -> GpuError {
    GpuError::UnsupportedType {
        operation,
        mat_type: mat.mat_type(),
    }
}

pub(crate) fn require_type(
    operation: &'static str,
    mat: &GpuMat,
    accepted: &[MatType],
) -> GpuResult<()> {
    if accepted.contains(&mat.mat_type()) {
        Ok(())
    } else {
        Err(unsupported(operation, mat))
    }
}

pub(crate) fn require_channels(operation: &'static str, mat: &GpuMat, expected: i32) -> GpuResult<()> {
    let actual = mat.mat_type().channels();
    if actual == expected {
        Ok(())
    } else {
        Err(GpuError::ChannelMismatch {
            operation,
            expected,
            actual,
        })
    }
}

pub(crate) fn require_size(operation: &'static str, expected: Size, mat: &GpuMat) -> GpuResult<()> {
    let actual = mat.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(GpuError::SizeMismatch {
            operation,
            expected,
            actual,
        })
    }
}

/// `other` has the size, channel count and type of `reference`
fn require_like(operation: &'static str, reference: &GpuMat, other: &GpuMat) -> GpuResult<()> {
    require_size(operation, reference.dims(), other)?;
    require_channels(operation, other, reference.mat_type().channels())?;
    require_type(operation, other, &[reference.mat_type()])
}

fn check_sobel_params(dx: i32, dy: i32, ksize: i32) -> GpuResult<()> {
    if !matches!(ksize, 1 | 3 | 5 | 7) {
        return Err(GpuError::InvalidParameter {
            parameter: "ksize",
            reason: format!("{ksize} is not 1, 3, 5 or 7"),
        });
    }
    if dx < 0 || dy < 0 || dx + dy == 0 {
        return Err(GpuError::InvalidParameter {
            parameter: "dx/dy",
            reason: format!("orders ({dx}, {dy}) must be non-negative and not both zero"),
        });
    }
    let taps = if ksize == 1 { 3 } else { ksize };
    if dx >= taps || dy >= taps {
        return Err(GpuError::InvalidParameter {
            parameter: "dx/dy",
            reason: format!("orders ({dx}, {dy}) must be below the kernel size {taps}"),
        });
    }
    Ok(())
}

fn check_anchor(anchor: Point, kernel: Size) -> GpuResult<()> {
    if anchor == Point::KERNEL_CENTER {
        return Ok(());
    }
    let inside = (0..kernel.width).contains(&anchor.x) && (0..kernel.height).contains(&anchor.y);
    if inside {
        Ok(())
    } else {
        Err(GpuError::InvalidParameter {
            parameter: "anchor",
            reason: format!(
                "({}, {}) lies outside the {} kernel",
                anchor.x, anchor.y, kernel
            ),
        })
    }
}
