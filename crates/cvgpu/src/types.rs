//! Element types, geometry and operator parameters shared with the native library

use crate::error::{GpuError, GpuResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit shift separating the channel count from the depth in a native type code.
const CHANNEL_SHIFT: i32 = 3;
/// Largest channel count the binding accepts.
pub const MAX_CHANNELS: i32 = 4;

/// Element depth of a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Depth {
    /// 8-bit unsigned
    U8 = 0,
    /// 8-bit signed
    S8 = 1,
    /// 16-bit unsigned
    U16 = 2,
    /// 16-bit signed
    S16 = 3,
    /// 32-bit signed
    S32 = 4,
    /// 32-bit float
    F32 = 5,
    /// 64-bit float
    F64 = 6,
}

impl Depth {
    /// Size of one channel value in bytes
    pub const fn size(self) -> usize {
        match self {
            Depth::U8 | Depth::S8 => 1,
            Depth::U16 | Depth::S16 => 2,
            Depth::S32 | Depth::F32 => 4,
            Depth::F64 => 8,
        }
    }

    fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Depth::U8,
            1 => Depth::S8,
            2 => Depth::U16,
            3 => Depth::S16,
            4 => Depth::S32,
            5 => Depth::F32,
            6 => Depth::F64,
            _ => return None,
        })
    }

    fn suffix(self) -> &'static str {
        match self {
            Depth::U8 => "8U",
            Depth::S8 => "8S",
            Depth::U16 => "16U",
            Depth::S16 => "16S",
            Depth::S32 => "32S",
            Depth::F32 => "32F",
            Depth::F64 => "64F",
        }
    }
}

/// Matrix element type: depth plus channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatType {
    depth: Depth,
    channels: i32,
}

impl MatType {
    /// 8-bit unsigned, 1 channel
    pub const CV_8UC1: MatType = MatType::make(Depth::U8, 1);
    /// 8-bit unsigned, 2 channels
    pub const CV_8UC2: MatType = MatType::make(Depth::U8, 2);
    /// 8-bit unsigned, 3 channels
    pub const CV_8UC3: MatType = MatType::make(Depth::U8, 3);
    /// 8-bit unsigned, 4 channels
    pub const CV_8UC4: MatType = MatType::make(Depth::U8, 4);
    /// 8-bit signed, 1 channel
    pub const CV_8SC1: MatType = MatType::make(Depth::S8, 1);
    /// 16-bit unsigned, 1 channel
    pub const CV_16UC1: MatType = MatType::make(Depth::U16, 1);
    /// 16-bit unsigned, 3 channels
    pub const CV_16UC3: MatType = MatType::make(Depth::U16, 3);
    /// 16-bit signed, 1 channel
    pub const CV_16SC1: MatType = MatType::make(Depth::S16, 1);
    /// 16-bit signed, 2 channels
    pub const CV_16SC2: MatType = MatType::make(Depth::S16, 2);
    /// 32-bit signed, 1 channel
    pub const CV_32SC1: MatType = MatType::make(Depth::S32, 1);
    /// 32-bit float, 1 channel
    pub const CV_32FC1: MatType = MatType::make(Depth::F32, 1);
    /// 32-bit float, 3 channels
    pub const CV_32FC3: MatType = MatType::make(Depth::F32, 3);
    /// 32-bit float, 4 channels
    pub const CV_32FC4: MatType = MatType::make(Depth::F32, 4);
    /// 64-bit float, 1 channel
    pub const CV_64FC1: MatType = MatType::make(Depth::F64, 1);

    const fn make(depth: Depth, channels: i32) -> Self {
        Self { depth, channels }
    }

    /// Create a type from a depth and a channel count in `1..=4`
    pub fn new(depth: Depth, channels: i32) -> GpuResult<Self> {
        if !(1..=MAX_CHANNELS).contains(&channels) {
            return Err(GpuError::InvalidParameter {
                parameter: "channels",
                reason: format!("{channels} is outside 1..={MAX_CHANNELS}"),
            });
        }
        Ok(Self::make(depth, channels))
    }

    /// Decode a native type code
    pub fn from_raw(raw: i32) -> GpuResult<Self> {
        let depth = Depth::from_raw(raw & ((1 << CHANNEL_SHIFT) - 1)).ok_or_else(|| {
            GpuError::InvalidParameter {
                parameter: "type",
                reason: format!("unknown depth in type code {raw}"),
            }
        })?;
        Self::new(depth, (raw >> CHANNEL_SHIFT) + 1)
    }

    /// Native type code (`depth + ((channels - 1) << 3)`)
    pub const fn to_raw(self) -> i32 {
        self.depth as i32 + ((self.channels - 1) << CHANNEL_SHIFT)
    }

    /// Per-channel depth
    pub const fn depth(self) -> Depth {
        self.depth
    }

    /// Channels per element, `1..=4`
    pub const fn channels(self) -> i32 {
        self.channels
    }

    /// Size of one element (all channels) in bytes
    pub const fn elem_size(self) -> usize {
        self.depth.size() * self.channels as usize
    }

    /// Same depth with a different channel count
    pub fn with_channels(self, channels: i32) -> GpuResult<Self> {
        Self::new(self.depth, channels)
    }
}

impl fmt::Display for MatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}C{}", self.depth.suffix(), self.channels)
    }
}

/// Matrix size: width == columns, height == rows
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Columns
    pub width: i32,
    /// Rows
    pub height: i32,
}

impl Size {
    /// Size of `width` columns by `height` rows
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Number of elements
    pub fn area(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Integer 2D point
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Point {
    /// Anchor value meaning "the kernel center"
    pub const KERNEL_CENTER: Point = Point { x: -1, y: -1 };

    /// Point at column `x`, row `y`
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Color space conversion codes understood by `gpuMatCvtColor`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorConversion {
    /// BGR to BGRA
    Bgr2Bgra,
    /// BGRA to BGR
    Bgra2Bgr,
    /// BGR to RGBA
    Bgr2Rgba,
    /// RGBA to BGR
    Rgba2Bgr,
    /// BGR to RGB
    Bgr2Rgb,
    /// BGRA to RGBA
    Bgra2Rgba,
    /// BGR to grayscale
    Bgr2Gray,
    /// RGB to grayscale
    Rgb2Gray,
    /// Grayscale to BGR
    Gray2Bgr,
    /// Grayscale to BGRA
    Gray2Bgra,
    /// BGRA to grayscale
    Bgra2Gray,
    /// RGBA to grayscale
    Rgba2Gray,
    /// BGR to CIE XYZ
    Bgr2Xyz,
    /// RGB to CIE XYZ
    Rgb2Xyz,
    /// CIE XYZ to BGR
    Xyz2Bgr,
    /// CIE XYZ to RGB
    Xyz2Rgb,
    /// BGR to YCrCb
    Bgr2YCrCb,
    /// RGB to YCrCb
    Rgb2YCrCb,
    /// YCrCb to BGR
    YCrCb2Bgr,
    /// YCrCb to RGB
    YCrCb2Rgb,
    /// BGR to HSV
    Bgr2Hsv,
    /// RGB to HSV
    Rgb2Hsv,
    /// BGR to HLS
    Bgr2Hls,
    /// RGB to HLS
    Rgb2Hls,
    /// HSV to BGR
    Hsv2Bgr,
    /// HSV to RGB
    Hsv2Rgb,
    /// HLS to BGR
    Hls2Bgr,
    /// HLS to RGB
    Hls2Rgb,
}

impl ColorConversion {
    /// Native conversion code
    pub const fn code(self) -> i32 {
        use ColorConversion::*;
        match self {
            Bgr2Bgra => 0,
            Bgra2Bgr => 1,
            Bgr2Rgba => 2,
            Rgba2Bgr => 3,
            Bgr2Rgb => 4,
            Bgra2Rgba => 5,
            Bgr2Gray => 6,
            Rgb2Gray => 7,
            Gray2Bgr => 8,
            Gray2Bgra => 9,
            Bgra2Gray => 10,
            Rgba2Gray => 11,
            Bgr2Xyz => 32,
            Rgb2Xyz => 33,
            Xyz2Bgr => 34,
            Xyz2Rgb => 35,
            Bgr2YCrCb => 36,
            Rgb2YCrCb => 37,
            YCrCb2Bgr => 38,
            YCrCb2Rgb => 39,
            Bgr2Hsv => 40,
            Rgb2Hsv => 41,
            Bgr2Hls => 52,
            Rgb2Hls => 53,
            Hsv2Bgr => 54,
            Hsv2Rgb => 55,
            Hls2Bgr => 60,
            Hls2Rgb => 61,
        }
    }

    /// Channel count of the source image
    pub const fn src_channels(self) -> i32 {
        use ColorConversion::*;
        match self {
            Gray2Bgr | Gray2Bgra => 1,
            Bgra2Bgr | Rgba2Bgr | Bgra2Rgba | Bgra2Gray | Rgba2Gray => 4,
            _ => 3,
        }
    }

    /// Channel count of the destination image
    pub const fn dst_channels(self) -> i32 {
        use ColorConversion::*;
        match self {
            Bgr2Gray | Rgb2Gray | Bgra2Gray | Rgba2Gray => 1,
            Bgr2Bgra | Bgr2Rgba | Gray2Bgra | Bgra2Rgba => 4,
            _ => 3,
        }
    }
}

/// Interpolation modes. Only `Nearest` and `Linear` are accepted by resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    /// Nearest neighbour
    Nearest = 0,
    /// Bilinear
    Linear = 1,
    /// Bicubic over a 4x4 neighbourhood
    Cubic = 2,
    /// Pixel area relation
    Area = 3,
    /// Lanczos over an 8x8 neighbourhood
    Lanczos4 = 4,
}

impl Interpolation {
    /// Native interpolation code
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Whether `gpuMatResize` accepts the mode
    pub const fn is_resize_supported(self) -> bool {
        matches!(self, Interpolation::Nearest | Interpolation::Linear)
    }

    /// Lower-case name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
            Interpolation::Cubic => "cubic",
            Interpolation::Area => "area",
            Interpolation::Lanczos4 => "lanczos4",
        }
    }
}

impl TryFrom<i32> for Interpolation {
    type Error = GpuError;

    fn try_from(code: i32) -> GpuResult<Self> {
        Ok(match code {
            0 => Interpolation::Nearest,
            1 => Interpolation::Linear,
            2 => Interpolation::Cubic,
            3 => Interpolation::Area,
            4 => Interpolation::Lanczos4,
            other => {
                return Err(GpuError::UnsupportedInterpolation {
                    interpolation: format!("code {other}"),
                })
            }
        })
    }
}

/// Distance metric of the brute-force matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceType {
    /// Sum of absolute differences
    L1 = 0,
    /// Euclidean distance
    L2 = 1,
    /// Count of differing bits
    Hamming = 2,
}

impl DistanceType {
    /// Native distance code
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Result of a min/max reduction
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MinMaxLoc {
    /// Smallest value
    pub min_val: f64,
    /// Largest value
    pub max_val: f64,
    /// Location of the smallest value
    pub min_loc: Point,
    /// Location of the largest value
    pub max_loc: Point,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(MatType::CV_8UC1.to_raw(), 0);
        assert_eq!(MatType::CV_8UC3.to_raw(), 16);
        assert_eq!(MatType::CV_8UC4.to_raw(), 24);
        assert_eq!(MatType::CV_32SC1.to_raw(), 4);
        assert_eq!(MatType::CV_32FC1.to_raw(), 5);
        assert_eq!(MatType::CV_16SC2.to_raw(), 11);
    }

    #[test]
    fn test_type_from_raw() {
        assert_eq!(MatType::from_raw(24).unwrap(), MatType::CV_8UC4);
        assert_eq!(MatType::from_raw(5).unwrap(), MatType::CV_32FC1);
        assert!(MatType::from_raw(7).is_err());
        // channel count 5 is above the supported range
        assert!(MatType::from_raw(32).is_err());
    }

    #[test]
    fn test_type_new_rejects_channels() {
        assert!(MatType::new(Depth::U8, 0).is_err());
        assert!(MatType::new(Depth::U8, 5).is_err());
        assert_eq!(MatType::new(Depth::F32, 3).unwrap(), MatType::CV_32FC3);
    }

    #[test]
    fn test_elem_size() {
        assert_eq!(MatType::CV_8UC1.elem_size(), 1);
        assert_eq!(MatType::CV_8UC4.elem_size(), 4);
        assert_eq!(MatType::CV_32FC3.elem_size(), 12);
        assert_eq!(MatType::CV_64FC1.elem_size(), 8);
    }

    #[test]
    fn test_type_display() {
        assert_eq!(MatType::CV_8UC1.to_string(), "8UC1");
        assert_eq!(MatType::CV_32FC4.to_string(), "32FC4");
        assert_eq!(MatType::CV_16SC2.to_string(), "16SC2");
    }

    #[test]
    fn test_size() {
        let size = Size::new(8, 12);
        assert_eq!(size.area(), 96);
        assert_eq!(size.to_string(), "8x12");
        assert_eq!(Size::new(-1, 5).area(), 0);
    }

    #[test]
    fn test_color_conversion_channels() {
        assert_eq!(ColorConversion::Bgr2Gray.code(), 6);
        assert_eq!(ColorConversion::Bgr2Gray.src_channels(), 3);
        assert_eq!(ColorConversion::Bgr2Gray.dst_channels(), 1);
        assert_eq!(ColorConversion::Gray2Bgra.src_channels(), 1);
        assert_eq!(ColorConversion::Gray2Bgra.dst_channels(), 4);
        assert_eq!(ColorConversion::Bgra2Rgba.src_channels(), 4);
        assert_eq!(ColorConversion::Bgra2Rgba.dst_channels(), 4);
        assert_eq!(ColorConversion::Bgr2Hsv.code(), 40);
        assert_eq!(ColorConversion::Hls2Rgb.code(), 61);
    }

    #[test]
    fn test_interpolation() {
        assert!(Interpolation::Nearest.is_resize_supported());
        assert!(Interpolation::Linear.is_resize_supported());
        assert!(!Interpolation::Cubic.is_resize_supported());
        assert!(!Interpolation::Area.is_resize_supported());
        assert_eq!(Interpolation::try_from(1).unwrap(), Interpolation::Linear);
        assert!(matches!(
            Interpolation::try_from(9),
            Err(GpuError::UnsupportedInterpolation { .. })
        ));
    }

    #[test]
    fn test_distance_codes() {
        assert_eq!(DistanceType::L1.code(), 0);
        assert_eq!(DistanceType::L2.code(), 1);
        assert_eq!(DistanceType::Hamming.code(), 2);
    }
}
