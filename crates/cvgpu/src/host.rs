//! Host-side matrices used as upload sources and download targets

use crate::error::{GpuError, GpuResult};
use crate::types::{MatType, Size};
use bytemuck::Pod;

/// A contiguous, row-major matrix in host memory.
///
/// The native host descriptor is built around `data` only for the duration
/// of a single native call; the buffer itself always stays owned here.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMat {
    rows: i32,
    cols: i32,
    mat_type: MatType,
    data: Vec<u8>,
}

impl HostMat {
    /// Zero-filled matrix
    pub fn zeros(rows: i32, cols: i32, mat_type: MatType) -> GpuResult<Self> {
        let len = buffer_len(rows, cols, mat_type)?;
        Ok(Self {
            rows,
            cols,
            mat_type,
            data: vec![0; len],
        })
    }

    /// Matrix with every byte set to `value`
    pub fn filled(rows: i32, cols: i32, mat_type: MatType, value: u8) -> GpuResult<Self> {
        let mut mat = Self::zeros(rows, cols, mat_type)?;
        mat.data.fill(value);
        Ok(mat)
    }

    /// Build from channel values laid out row-major, e.g. `&[u8]` for 8U
    /// types or `&[f32]` for 32F types.
    pub fn from_elements<T: Pod>(
        rows: i32,
        cols: i32,
        mat_type: MatType,
        values: &[T],
    ) -> GpuResult<Self> {
        check_dims(rows, cols)?;
        if std::mem::size_of::<T>() != mat_type.depth().size() {
            return Err(GpuError::InvalidParameter {
                parameter: "values",
                reason: format!(
                    "{}-byte values do not match {} channel depth",
                    std::mem::size_of::<T>(),
                    mat_type
                ),
            });
        }
        let bytes: &[u8] = bytemuck::cast_slice(values);
        Self::from_bytes(rows, cols, mat_type, bytes.to_vec())
    }

    /// Build from raw bytes
    pub fn from_bytes(rows: i32, cols: i32, mat_type: MatType, data: Vec<u8>) -> GpuResult<Self> {
        let expected = buffer_len(rows, cols, mat_type)?;
        if data.len() != expected {
            return Err(GpuError::InvalidParameter {
                parameter: "data",
                reason: format!("expected {expected} bytes, got {}", data.len()),
            });
        }
        Ok(Self {
            rows,
            cols,
            mat_type,
            data,
        })
    }

    /// Number of rows
    pub fn rows(&self) -> i32 {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> i32 {
        self.cols
    }

    /// Size as width (cols) by height (rows)
    pub fn size(&self) -> Size {
        Size::new(self.cols, self.rows)
    }

    /// Element type
    pub fn mat_type(&self) -> MatType {
        self.mat_type
    }

    /// Channels per element
    pub fn channels(&self) -> i32 {
        self.mat_type.channels()
    }

    /// Bytes per row. Never overflows: the whole buffer length was checked
    /// at construction.
    pub fn step(&self) -> usize {
        self.cols as usize * self.mat_type.elem_size()
    }

    /// Raw row-major bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw row-major bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Take the underlying buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Copy out the channel values as `T`.
    pub fn to_elements<T: Pod>(&self) -> GpuResult<Vec<T>> {
        if std::mem::size_of::<T>() != self.mat_type.depth().size() {
            return Err(GpuError::InvalidParameter {
                parameter: "T",
                reason: format!(
                    "{}-byte values do not match {} channel depth",
                    std::mem::size_of::<T>(),
                    self.mat_type
                ),
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Bytes of the element at (`row`, `col`), all channels.
    pub fn element(&self, row: i32, col: i32) -> Option<&[u8]> {
        if row < 0 || col < 0 || row >= self.rows || col >= self.cols {
            return None;
        }
        let elem = self.mat_type.elem_size();
        let start = row as usize * self.step() + col as usize * elem;
        self.data.get(start..start + elem)
    }

    pub(crate) fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub(crate) fn data_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}

/// Bytes needed by a dense `rows x cols` matrix of `mat_type`.
///
/// Fails on non-positive dimensions and on sizes that do not fit in `usize`.
pub fn buffer_len(rows: i32, cols: i32, mat_type: MatType) -> GpuResult<usize> {
    check_dims(rows, cols)?;
    checked_len(rows, cols, mat_type).ok_or_else(|| GpuError::InvalidParameter {
        parameter: "size",
        reason: format!("{rows}x{cols} {mat_type} does not fit in host memory"),
    })
}

/// Byte length for non-negative dimensions, `None` on overflow
pub(crate) fn checked_len(rows: i32, cols: i32, mat_type: MatType) -> Option<usize> {
    usize::try_from(rows)
        .ok()?
        .checked_mul(usize::try_from(cols).ok()?)?
        .checked_mul(mat_type.elem_size())
}

pub(crate) fn check_dims(rows: i32, cols: i32) -> GpuResult<()> {
    if rows <= 0 {
        return Err(GpuError::InvalidParameter {
            parameter: "rows",
            reason: format!("{rows} is not positive"),
        });
    }
    if cols <= 0 {
        return Err(GpuError::InvalidParameter {
            parameter: "cols",
            reason: format!("{cols} is not positive"),
        });
    }
    Ok(())
}
