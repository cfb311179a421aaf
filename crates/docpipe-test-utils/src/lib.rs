//! Testing utilities for the docpipe workspace
//!
//! Mock annotator services, a scripted driver, and document fixtures.

#![allow(missing_docs)]

pub mod driver;
pub mod fixtures;
pub mod service;
pub mod wire;

pub use driver::{RecordedCall, Reply, ScriptedDriver};
pub use fixtures::{
    audio_document, empty_document, scenario_document, segment_spans, SCENARIO_SPANS,
    SCENARIO_TEXT,
};
pub use service::{Behaviour, MockService, MOCK_VERSION};

/// Install a test-friendly tracing subscriber; repeated calls are ignored
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
