//! # docpipe Composer
//!
//! Runs a shared [`Document`](docpipe_document::Document) through an ordered
//! chain of annotator services and merges what each one returns.
//!
//! ## Architecture
//!
//! ```text
//! Composer ──▶ InstancePool ──▶ Driver::resolve   (once per stage, cached)
//!    │
//!    └─ per stage: dispatch::plan ─▶ codec ─▶ Driver::call ─▶ codec ─▶ merge
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docpipe_composer::{Composer, ComposerConfig};
//! use docpipe_document::{Document, SegmentSpan};
//! use docpipe_driver::{ComponentDescriptor, RemoteDriver};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let composer = Composer::new(ComposerConfig::default());
//! composer.add_driver(Arc::new(RemoteDriver::new()))?;
//! composer.add(ComponentDescriptor::remote("http://127.0.0.1:9714"))?;
//!
//! let mut doc = Document::with_text("One sentence. Another one.", "en");
//! composer.run(&mut doc).await?;
//!
//! for sentence in doc.select_typed::<SegmentSpan>() {
//!     println!("{}..{}", sentence.begin, sentence.end);
//! }
//! composer.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod codec;
pub mod composer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod telemetry;

// Re-exports
pub use codec::{InterchangeFormat, ScriptingContext};
pub use composer::{Composer, RunSummary};
pub use config::{ComposerConfig, DispatchPolicy, PipelineDefinition, TelemetryConfig};
pub use error::{CodecError, ComposerError, ConfigurationError, ErrorKind, StageError};
pub use pool::{PoolStats, StageId};
pub use protocol::{AnnotationDelta, DocumentSnapshot, ModificationMeta};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
