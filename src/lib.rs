//! Opsight library - shared modules for the opsight and opsight-inspect binaries.
//!
//! This library provides the pieces of the profiling flow: exporting an
//! edge-dialect graph to a lowered program (plus the optional graph record),
//! running the program with an event tracer attached, and inspecting the
//! resulting artifacts.
//!
//! # Modules
//!
//! - [`graph`] - Edge-dialect graph model captured at export time
//! - [`program`] - Lowering and the executable program format
//! - [`record`] - Graph record generation and loading
//! - [`executor`] - Program interpreter with optional event tracing
//! - [`tracer`] - Runtime trace model and event collection
//! - [`inspector`] - Correlates runtime events with graph operators
//! - [`perfetto`] - Runtime trace to Perfetto trace conversion
//! - [`validate`] - Artifact validation
//!
//! # Example
//!
//! ```no_run
//! use opsight::Inspector;
//! use std::path::Path;
//!
//! // Correlate a runtime trace with the record generated at export time
//! // and render every runtime event as a table row.
//! let inspector = Inspector::new(
//!     Path::new("trace.json"),
//!     Some(Path::new("record.json")),
//! ).expect("Failed to load artifacts");
//! inspector.print_data_tabular();
//! ```

pub mod demo;
pub mod executor;
pub mod graph;
pub mod inspector;
pub mod perfetto;
pub mod program;
pub mod record;
pub mod stats;
pub mod tensor;
pub mod tracer;

pub mod validate;

// Re-export for convenience
pub use executor::Executor;
pub use inspector::Inspector;
pub use record::{generate_record, GraphRecord};
pub use tracer::{EventTracer, RunTrace};
pub use validate::{
    cross_validate, validate_record, validate_trace, ValidationError, ValidationResult,
    ValidationWarning,
};
