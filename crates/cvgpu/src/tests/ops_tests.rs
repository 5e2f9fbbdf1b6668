//! Tests for operator validation and dispatch

use super::mock_context;
use crate::error::{GpuError, GpuResult};
use crate::host::HostMat;
use crate::ops;
use crate::types::{ColorConversion, Interpolation, MatType, Point};

fn assert_entry<T: std::fmt::Debug>(result: GpuResult<T>, entry: &str) {
    match result {
        Err(GpuError::MockMode { operation }) => assert_eq!(operation, entry),
        other => panic!("expected {entry} to be reached, got {other:?}"),
    }
}

#[test]
fn test_operators_forward_to_native_entries() {
    let (ctx, _) = mock_context();
    let a = ctx.allocate(8, 8, MatType::CV_8UC1).unwrap();
    let b = ctx.allocate(8, 8, MatType::CV_8UC1).unwrap();
    let mut c = ctx.allocate(8, 8, MatType::CV_8UC1).unwrap();

    assert_entry(ops::add(&a, &b, &mut c), "gpuMatAdd");
    assert_entry(ops::subtract(&a, &b, &mut c), "gpuMatSubtract");
    assert_entry(ops::sobel(&a, &mut c, 1, 0, 3, 1.0), "gpuMatSobel");
    assert_entry(ops::laplacian(&a, &mut c, 3, 1.0), "gpuMatLaplacian");
    assert_entry(ops::bitwise_xor(&a, &b, &mut c, None), "gpuMatBitwiseXor");
    assert_entry(ops::min_max_loc(&a, None), "gpuMatMinMaxLoc");
    assert_entry(ops::count_non_zero(&a), "gpuMatCountNonZero");

    let kernel = HostMat::filled(3, 3, MatType::CV_32FC1, 0).unwrap();
    assert_entry(
        ops::filter_2d(&a, &mut c, &kernel, Point::KERNEL_CENTER),
        "gpuMatFilter2D",
    );

    let table = HostMat::zeros(1, 256, MatType::CV_8UC1).unwrap();
    assert_entry(ops::lut(&a, &table, &mut c), "gpuMatLUT");

    let mut small = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert_entry(ops::resize(&a, &mut small, Interpolation::Linear), "gpuMatResize");
}

#[test]
fn test_color_and_channel_operators_forward() {
    let (ctx, _) = mock_context();
    let bgr = ctx.allocate(4, 4, MatType::CV_8UC3).unwrap();
    let mut gray = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert_entry(
        ops::cvt_color(&bgr, &mut gray, ColorConversion::Bgr2Gray),
        "gpuMatCvtColor",
    );

    let mut planes = vec![
        ctx.allocate(4, 4, MatType::CV_8UC1).unwrap(),
        ctx.allocate(4, 4, MatType::CV_8UC1).unwrap(),
        ctx.allocate(4, 4, MatType::CV_8UC1).unwrap(),
    ];
    assert_entry(ops::split_into(&bgr, &mut planes), "gpuMatSplit");

    let mut merged = ctx.allocate(4, 4, MatType::CV_8UC3).unwrap();
    let refs: Vec<_> = planes.iter().collect();
    assert_entry(ops::merge(&refs, &mut merged), "gpuMatMerge");
}

#[test]
fn test_resize_rejects_unsupported_interpolation() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(8, 8, MatType::CV_8UC1).unwrap();
    let mut dst = ctx.allocate(16, 16, MatType::CV_8UC1).unwrap();

    for mode in [Interpolation::Cubic, Interpolation::Area, Interpolation::Lanczos4] {
        match ops::resize(&src, &mut dst, mode) {
            Err(GpuError::UnsupportedInterpolation { interpolation }) => {
                assert_eq!(interpolation, mode.name())
            }
            other => panic!("unexpected result for {mode:?}: {other:?}"),
        }
    }
}

#[test]
fn test_resize_rejects_type_change() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(8, 8, MatType::CV_8UC4).unwrap();
    let mut dst = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::resize(&src, &mut dst, Interpolation::Nearest),
        Err(GpuError::UnsupportedType { operation: "resize", .. })
    ));
}

#[test]
fn test_add_rejects_unsupported_type() {
    let (ctx, _) = mock_context();
    let a = ctx.allocate(4, 4, MatType::CV_16UC3).unwrap();
    let b = ctx.allocate(4, 4, MatType::CV_16UC3).unwrap();
    let mut c = ctx.allocate(4, 4, MatType::CV_16UC3).unwrap();

    let err = ops::add(&a, &b, &mut c).unwrap_err();
    assert_eq!(err.to_string(), "add does not support 16UC3");
}

#[test]
fn test_add_rejects_mismatched_operands() {
    let (ctx, _) = mock_context();
    let a = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let b = ctx.allocate(4, 5, MatType::CV_8UC1).unwrap();
    let mut c = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::add(&a, &b, &mut c),
        Err(GpuError::SizeMismatch { operation: "add", .. })
    ));

    let b = ctx.allocate(4, 4, MatType::CV_32FC1).unwrap();
    assert!(matches!(
        ops::subtract(&a, &b, &mut c),
        Err(GpuError::UnsupportedType { .. })
    ));
}

#[test]
fn test_sobel_validation() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(8, 8, MatType::CV_16SC2).unwrap();
    let mut dst = ctx.allocate(8, 8, MatType::CV_16SC2).unwrap();

    assert!(matches!(
        ops::sobel(&src, &mut dst, 0, 0, 3, 1.0),
        Err(GpuError::InvalidParameter { .. })
    ));
    assert!(matches!(
        ops::sobel(&src, &mut dst, 1, 0, 4, 1.0),
        Err(GpuError::InvalidParameter { parameter: "ksize", .. })
    ));
    assert_entry(ops::sobel(&src, &mut dst, 0, 1, 5, 2.0), "gpuMatSobel");

    let wrong = ctx.allocate(8, 8, MatType::CV_8UC3).unwrap();
    let mut wrong_dst = ctx.allocate(8, 8, MatType::CV_8UC3).unwrap();
    assert!(matches!(
        ops::sobel(&wrong, &mut wrong_dst, 1, 0, 3, 1.0),
        Err(GpuError::UnsupportedType { .. })
    ));
}

#[test]
fn test_filter_2d_validation() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(8, 8, MatType::CV_8UC4).unwrap();
    let mut dst = ctx.allocate(8, 8, MatType::CV_8UC4).unwrap();

    let int_kernel = HostMat::zeros(3, 3, MatType::CV_32SC1).unwrap();
    assert!(matches!(
        ops::filter_2d(&src, &mut dst, &int_kernel, Point::KERNEL_CENTER),
        Err(GpuError::UnsupportedType { .. })
    ));

    let kernel = HostMat::zeros(3, 3, MatType::CV_32FC1).unwrap();
    assert!(matches!(
        ops::filter_2d(&src, &mut dst, &kernel, Point::new(3, 1)),
        Err(GpuError::InvalidParameter { parameter: "anchor", .. })
    ));
    assert_entry(
        ops::filter_2d(&src, &mut dst, &kernel, Point::new(0, 2)),
        "gpuMatFilter2D",
    );
}

#[test]
fn test_lut_validation() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(4, 4, MatType::CV_8UC3).unwrap();

    let short = HostMat::zeros(1, 128, MatType::CV_8UC1).unwrap();
    let mut dst = ctx.allocate(4, 4, MatType::CV_8UC3).unwrap();
    assert!(matches!(
        ops::lut(&src, &short, &mut dst),
        Err(GpuError::InvalidParameter { parameter: "table", .. })
    ));

    let two_channel = HostMat::zeros(1, 256, MatType::CV_8UC2).unwrap();
    assert!(matches!(
        ops::lut(&src, &two_channel, &mut dst),
        Err(GpuError::ChannelMismatch { .. })
    ));

    // Destination takes the table depth and the source channel count.
    let float_table = HostMat::zeros(16, 16, MatType::CV_32FC3).unwrap();
    assert!(matches!(
        ops::lut(&src, &float_table, &mut dst),
        Err(GpuError::UnsupportedType { operation: "lut", .. })
    ));
    let mut float_dst = ctx.allocate(4, 4, MatType::CV_32FC3).unwrap();
    assert_entry(ops::lut(&src, &float_table, &mut float_dst), "gpuMatLUT");
}

#[test]
fn test_cvt_color_validation() {
    let (ctx, _) = mock_context();
    let bgra = ctx.allocate(4, 4, MatType::CV_8UC4).unwrap();
    let mut gray = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();

    assert!(matches!(
        ops::cvt_color(&bgra, &mut gray, ColorConversion::Bgr2Gray),
        Err(GpuError::ChannelMismatch { expected: 3, actual: 4, .. })
    ));
    assert_entry(
        ops::cvt_color(&bgra, &mut gray, ColorConversion::Bgra2Gray),
        "gpuMatCvtColor",
    );

    let mut gray16 = ctx.allocate(4, 4, MatType::CV_16UC1).unwrap();
    assert!(matches!(
        ops::cvt_color(&bgra, &mut gray16, ColorConversion::Bgra2Gray),
        Err(GpuError::UnsupportedType { .. })
    ));

    let signed = ctx.allocate(4, 4, MatType::CV_16SC1).unwrap();
    let mut out = ctx.allocate(4, 4, MatType::CV_16SC1).unwrap();
    assert!(matches!(
        ops::cvt_color(&signed, &mut out, ColorConversion::Gray2Bgr),
        Err(GpuError::UnsupportedType { .. })
    ));
}

#[test]
fn test_split_allocates_and_releases_on_failure() {
    let (ctx, engine) = mock_context();
    let src = ctx.allocate(4, 4, MatType::CV_8UC4).unwrap();

    assert_entry(ops::split(&src), "gpuMatSplit");
    assert_eq!(engine.live_mats(), 1);
    assert_eq!(engine.releases(), 4);
}

#[test]
fn test_split_validation() {
    let (ctx, _) = mock_context();
    let single = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::split(&single),
        Err(GpuError::UnsupportedType { operation: "split", .. })
    ));

    let src = ctx.allocate(4, 4, MatType::CV_8UC4).unwrap();
    let mut too_few = vec![ctx.allocate(4, 4, MatType::CV_8UC1).unwrap()];
    assert!(matches!(
        ops::split_into(&src, &mut too_few),
        Err(GpuError::ChannelMismatch { expected: 4, actual: 1, .. })
    ));
}

#[test]
fn test_merge_validation() {
    let (ctx, _) = mock_context();
    let a = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let b = ctx.allocate(4, 4, MatType::CV_32FC1).unwrap();
    let mut dst = ctx.allocate(4, 4, MatType::CV_8UC2).unwrap();

    assert!(matches!(
        ops::merge(&[&a], &mut dst),
        Err(GpuError::InvalidParameter { parameter: "src", .. })
    ));
    assert!(matches!(
        ops::merge(&[&a, &b], &mut dst),
        Err(GpuError::UnsupportedType { .. })
    ));

    let mut wrong_dst = ctx.allocate(4, 4, MatType::CV_8UC3).unwrap();
    let c = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::merge(&[&a, &c], &mut wrong_dst),
        Err(GpuError::UnsupportedType { operation: "merge", .. })
    ));
    assert_entry(ops::merge(&[&a, &c], &mut dst), "gpuMatMerge");
}

#[test]
fn test_reductions_need_single_channel() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(4, 4, MatType::CV_8UC4).unwrap();
    assert!(matches!(
        ops::count_non_zero(&src),
        Err(GpuError::ChannelMismatch { .. })
    ));
    assert!(matches!(
        ops::min_max_loc(&src, None),
        Err(GpuError::ChannelMismatch { .. })
    ));

    let gray = ctx.allocate(4, 4, MatType::CV_32FC1).unwrap();
    let mask = ctx.allocate(2, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::min_max_loc(&gray, Some(&mask)),
        Err(GpuError::SizeMismatch { .. })
    ));
}

#[test]
fn test_laplacian_aperture() {
    let (ctx, _) = mock_context();
    let src = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let mut dst = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::laplacian(&src, &mut dst, 5, 1.0),
        Err(GpuError::InvalidParameter { parameter: "ksize", .. })
    ));
    assert_entry(ops::laplacian(&src, &mut dst, 1, 1.0), "gpuMatLaplacian");
}

#[test]
fn test_bitwise_xor_any_type_with_mask() {
    let (ctx, _) = mock_context();
    let a = ctx.allocate(4, 4, MatType::CV_16UC3).unwrap();
    let b = ctx.allocate(4, 4, MatType::CV_16UC3).unwrap();
    let mut dst = ctx.allocate(4, 4, MatType::CV_16UC3).unwrap();
    let mask = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert_entry(ops::bitwise_xor(&a, &b, &mut dst, Some(&mask)), "gpuMatBitwiseXor");
}

#[test]
fn test_operator_on_released_operand() {
    let (ctx, _) = mock_context();
    let mut a = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let b = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let mut c = ctx.allocate(4, 4, MatType::CV_8UC1).unwrap();
    a.release();
    assert!(matches!(
        ops::add(&a, &b, &mut c),
        Err(GpuError::Released { operation: "add" })
    ));
}

#[test]
fn test_operator_across_engines() {
    let (ctx_a, _) = mock_context();
    let (ctx_b, _) = mock_context();
    let a = ctx_a.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let b = ctx_b.allocate(4, 4, MatType::CV_8UC1).unwrap();
    let mut c = ctx_a.allocate(4, 4, MatType::CV_8UC1).unwrap();
    assert!(matches!(
        ops::bitwise_xor(&a, &b, &mut c, None),
        Err(GpuError::EngineMismatch { .. })
    ));
}
