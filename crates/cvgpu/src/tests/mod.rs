//! Test suite for the binding, driven by the mock engine

use crate::context::GpuContext;
use crate::mock::MockEngine;
use std::sync::Arc;

mod ops_tests;
mod probe_tests;

/// Context over a fresh single-device mock, plus the mock for inspection
pub(crate) fn mock_context() -> (GpuContext, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::new());
    (GpuContext::from_engine(engine.clone()), engine)
}
