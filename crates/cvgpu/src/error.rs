//! GPU binding error types and result handling

use crate::types::{MatType, Size};
use thiserror::Error;

/// Status codes reported by the native library through its error callback.
pub mod status {
    /// Insufficient memory (`CV_StsNoMem`)
    pub const NO_MEMORY: i32 = -4;
    /// Function argument is invalid (`CV_StsBadArg`)
    pub const BAD_ARGUMENT: i32 = -5;
    /// Null pointer (`CV_StsNullPtr`)
    pub const NULL_POINTER: i32 = -27;
    /// Sizes of input arguments do not match (`CV_StsUnmatchedSizes`)
    pub const UNMATCHED_SIZES: i32 = -209;
    /// Unsupported format (`CV_StsUnsupportedFormat`)
    pub const UNSUPPORTED_FORMAT: i32 = -210;
}

/// GPU binding errors
#[derive(Debug, Clone, Error)]
pub enum GpuError {
    /// No CUDA capable device is present
    #[error("no CUDA capable device available")]
    CapabilityAbsent,

    /// A native library could not be opened
    #[error("failed to load native library {library}: {message}")]
    LibraryLoad {
        /// Library name or path
        library: String,
        /// Loader message
        message: String,
    },

    /// A native entry point is missing from a loaded library
    #[error("native entry point {symbol} not found: {message}")]
    MissingSymbol {
        /// Entry point name
        symbol: String,
        /// Loader message
        message: String,
    },

    /// Failure reported by the native library
    #[error("native error {status} in {function}: {message} ({file}:{line})")]
    Native {
        /// Native status code
        status: i32,
        /// Native function that raised the error
        function: String,
        /// Native error message
        message: String,
        /// Source file reported by the native library
        file: String,
        /// Source line reported by the native library
        line: i32,
    },

    /// An allocation entry point returned a null handle
    #[error("{operation} returned a null handle")]
    NullHandle {
        /// Entry point name
        operation: &'static str,
    },

    /// The matrix or matcher has already been released
    #[error("{operation} called on a released handle")]
    Released {
        /// Operation name
        operation: &'static str,
    },

    /// Operands were created by different engines
    #[error("{operation}: operands belong to different compute engines")]
    EngineMismatch {
        /// Operation name
        operation: &'static str,
    },

    /// Element type not supported by an operation
    #[error("{operation} does not support {mat_type}")]
    UnsupportedType {
        /// Operation name
        operation: &'static str,
        /// Offending element type
        mat_type: MatType,
    },

    /// Interpolation mode not supported by resize
    #[error("interpolation {interpolation} is not supported, use nearest or linear")]
    UnsupportedInterpolation {
        /// Requested interpolation name
        interpolation: String,
    },

    /// Operand sizes differ
    #[error("{operation}: size mismatch, expected {expected}, got {actual}")]
    SizeMismatch {
        /// Operation name
        operation: &'static str,
        /// Expected size
        expected: Size,
        /// Actual size
        actual: Size,
    },

    /// Operand channel counts differ from what the operation needs
    #[error("{operation}: expected {expected} channel(s), got {actual}")]
    ChannelMismatch {
        /// Operation name
        operation: &'static str,
        /// Expected channel count
        expected: i32,
        /// Actual channel count
        actual: i32,
    },

    /// Invalid scalar parameter
    #[error("invalid value for {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Device index out of range
    #[error("invalid CUDA device: {device}")]
    InvalidDevice {
        /// Device index
        device: i32,
    },

    /// Operation not available on the mock engine
    #[error("{operation} is not supported in mock mode")]
    MockMode {
        /// Native entry point name
        operation: &'static str,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl GpuError {
    /// Native status code, if the error came from the native library.
    pub fn native_status(&self) -> Option<i32> {
        match self {
            GpuError::Native { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the native engine was never reached.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GpuError::Released { .. }
                | GpuError::EngineMismatch { .. }
                | GpuError::UnsupportedType { .. }
                | GpuError::UnsupportedInterpolation { .. }
                | GpuError::SizeMismatch { .. }
                | GpuError::ChannelMismatch { .. }
                | GpuError::InvalidParameter { .. }
        )
    }
}

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;
