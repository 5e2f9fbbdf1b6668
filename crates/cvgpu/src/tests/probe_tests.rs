//! Tests for the capability probe

use crate::engine::ComputeEngine;
use crate::error::GpuError;
use crate::mock::{MockDevice, MockEngine};
use crate::probe::CapabilityProbe;
use std::sync::Arc;

#[test]
fn test_probe_reports_device() {
    let engine = MockEngine::new();
    let probe = CapabilityProbe::new();
    assert!(probe.has_compute(&engine));
    assert_eq!(probe.cached(), Some(true));
}

#[test]
fn test_probe_without_devices() {
    let engine = MockEngine::without_devices();
    let probe = CapabilityProbe::new();
    assert!(!probe.has_compute(&engine));
}

#[test]
fn test_probe_is_idempotent() {
    let engine = MockEngine::new();
    let probe = CapabilityProbe::new();
    assert!(probe.has_compute(&engine));

    engine.set_devices(Vec::new());
    for _ in 0..5 {
        assert!(probe.has_compute(&engine));
    }
    assert_eq!(engine.device_queries(), 1);
}

#[test]
fn test_probe_caches_absence() {
    let engine = MockEngine::without_devices();
    let probe = CapabilityProbe::new();
    assert!(!probe.has_compute(&engine));

    engine.set_devices(vec![MockDevice::default()]);
    assert!(!probe.has_compute(&engine));
    assert_eq!(engine.device_queries(), 1);
}

#[test]
fn test_probe_swallows_query_error() {
    let engine = MockEngine::new();
    engine.set_fail_device_query(true);
    let probe = CapabilityProbe::new();
    assert!(!probe.has_compute(&engine));
    assert_eq!(engine.device_queries(), 1);
}

#[test]
fn test_probe_swallows_query_panic() {
    let engine = MockEngine::new();
    engine.set_panic_on_device_query(true);
    let probe = CapabilityProbe::new();
    assert!(!probe.has_compute(&engine));
    assert_eq!(probe.cached(), Some(false));
}

#[test]
fn test_probe_init_failure_makes_no_query() {
    let engine = Arc::new(MockEngine::new());
    let probe = CapabilityProbe::new();
    let available = probe.probe_with(|| {
        Err(GpuError::LibraryLoad {
            library: "cvextern".to_string(),
            message: "not found".to_string(),
        })
    });
    assert!(!available);

    // A later probe with a working engine keeps the cached answer.
    let working: Arc<dyn ComputeEngine> = engine.clone();
    assert!(!probe.probe_with(move || Ok(working)));
    assert_eq!(engine.device_queries(), 0);
}

#[test]
fn test_probe_init_panic() {
    let probe = CapabilityProbe::new();
    assert!(!probe.probe_with(|| panic!("loader exploded")));
}

#[test]
fn test_probe_with_runs_init_once() {
    let engine = Arc::new(MockEngine::new());
    let probe = CapabilityProbe::new();
    let mut inits = 0;
    for _ in 0..3 {
        let e: Arc<dyn ComputeEngine> = engine.clone();
        assert!(probe.probe_with(|| {
            inits += 1;
            Ok(e)
        }));
    }
    assert_eq!(inits, 1);
    assert_eq!(engine.device_queries(), 1);
}

#[test]
fn test_concurrent_probes_query_once() {
    let engine = Arc::new(MockEngine::new());
    let probe = Arc::new(CapabilityProbe::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let probe = probe.clone();
            std::thread::spawn(move || probe.has_compute(engine.as_ref()))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(engine.device_queries(), 1);
}
