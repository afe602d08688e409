//! Artifact validation.
//!
//! Validation checks runtime trace and graph record files for internal
//! consistency, and the two against each other. Parse failures are hard
//! errors; everything else is collected into a [`ValidationResult`] so a
//! single pass reports all problems at once.
//!
//! # Example
//!
//! ```no_run
//! use opsight::validate::validate_trace;
//! use std::path::Path;
//!
//! let result = validate_trace(Path::new("trace.json")).unwrap();
//! if result.has_errors() {
//!     for error in &result.errors {
//!         eprintln!("Error: {}", error);
//!     }
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::graph::DebugHandle;
use crate::record::{GraphRecord, RECORD_VERSION};
use crate::tracer::RunTrace;

/// Result of validating one or more artifacts.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Errors that indicate invalid artifact data.
    pub errors: Vec<ValidationError>,
    /// Warnings that indicate potential issues.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Returns true if there are any validation errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any validation warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Returns true if the artifact is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validation error types.
#[derive(Debug)]
pub enum ValidationError {
    /// An event ends before it starts.
    NegativeDuration {
        run: u32,
        instruction: u32,
        start_ns: u64,
        end_ns: u64,
    },
    /// Events within a run block are not ordered by start timestamp.
    OutOfOrderEvent { run: u32, instruction: u32 },
    /// The same instruction appears twice in one run block.
    DuplicateInstruction { run: u32, instruction: u32 },
    /// Run blocks are not numbered densely in file order.
    RunIndexMismatch { expected: u32, got: u32 },
    /// The record schema version is not one this build understands.
    UnsupportedVersion { got: u32, expected: u32 },
    /// The record's embedded graph failed structural validation.
    InvalidGraph { message: String },
    /// The trace names a program the record does not contain.
    UnknownProgram { program: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeDuration {
                run,
                instruction,
                start_ns,
                end_ns,
            } => write!(
                f,
                "run {}: instruction {} ends ({} ns) before it starts ({} ns)",
                run, instruction, end_ns, start_ns
            ),
            Self::OutOfOrderEvent { run, instruction } => write!(
                f,
                "run {}: instruction {} starts before the previous event",
                run, instruction
            ),
            Self::DuplicateInstruction { run, instruction } => write!(
                f,
                "run {}: instruction {} appears more than once",
                run, instruction
            ),
            Self::RunIndexMismatch { expected, got } => write!(
                f,
                "run block {} carries run_index {}",
                expected, got
            ),
            Self::UnsupportedVersion { got, expected } => write!(
                f,
                "record version {} is not supported (expected {})",
                got, expected
            ),
            Self::InvalidGraph { message } => write!(f, "record graph is invalid: {}", message),
            Self::UnknownProgram { program } => write!(
                f,
                "trace was produced by program '{}' which the record does not describe",
                program
            ),
        }
    }
}

/// Validation warning types.
#[derive(Debug)]
pub enum ValidationWarning {
    /// The trace contains no run blocks.
    EmptyTrace,
    /// A run block contains no events.
    EmptyRunBlock { run: u32 },
    /// The record maps an instruction to a debug handle no graph node carries.
    UnknownDebugHandle {
        program: String,
        instruction: u32,
        handle: DebugHandle,
    },
    /// An instruction in the trace has no entry in the record's handle map.
    /// The inspector shows such events uncorrelated.
    UnmappedInstruction { instruction: u32 },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTrace => write!(f, "trace contains no run blocks"),
            Self::EmptyRunBlock { run } => write!(f, "run block {} contains no events", run),
            Self::UnknownDebugHandle {
                program,
                instruction,
                handle,
            } => write!(
                f,
                "program '{}': instruction {} maps to debug handle {} which no graph node carries",
                program, instruction, handle
            ),
            Self::UnmappedInstruction { instruction } => write!(
                f,
                "instruction {} has no debug handle in the record and will be shown uncorrelated",
                instruction
            ),
        }
    }
}

/// Validate a runtime trace file.
pub fn validate_trace(path: &Path) -> Result<ValidationResult> {
    let trace = RunTrace::from_file(path)?;
    Ok(check_trace(&trace))
}

/// Validate a graph record file.
pub fn validate_record(path: &Path) -> Result<ValidationResult> {
    let record = GraphRecord::from_file(path)?;
    Ok(check_record(&record))
}

/// Validate a trace against the record that should describe it.
pub fn cross_validate(trace: &RunTrace, record: &GraphRecord) -> ValidationResult {
    let mut result = ValidationResult::default();

    let Some(program) = record.programs.get(&trace.program_name) else {
        result.add_error(ValidationError::UnknownProgram {
            program: trace.program_name.clone(),
        });
        return result;
    };

    let mut reported = HashSet::new();
    for block in &trace.runs {
        for event in &block.events {
            if program.debug_handle_map.contains_key(&event.instruction_id) {
                continue;
            }
            if reported.insert(event.instruction_id) {
                result.add_warning(ValidationWarning::UnmappedInstruction {
                    instruction: event.instruction_id,
                });
            }
        }
    }
    result
}

fn check_trace(trace: &RunTrace) -> ValidationResult {
    let mut result = ValidationResult::default();

    if trace.runs.is_empty() {
        result.add_warning(ValidationWarning::EmptyTrace);
    }

    for (position, block) in trace.runs.iter().enumerate() {
        if block.run_index != position as u32 {
            result.add_error(ValidationError::RunIndexMismatch {
                expected: position as u32,
                got: block.run_index,
            });
        }
        if block.events.is_empty() {
            result.add_warning(ValidationWarning::EmptyRunBlock {
                run: block.run_index,
            });
        }

        let mut seen = HashSet::new();
        let mut prev_start = 0;
        for event in &block.events {
            if event.end_ns < event.start_ns {
                result.add_error(ValidationError::NegativeDuration {
                    run: block.run_index,
                    instruction: event.instruction_id,
                    start_ns: event.start_ns,
                    end_ns: event.end_ns,
                });
            }
            if event.start_ns < prev_start {
                result.add_error(ValidationError::OutOfOrderEvent {
                    run: block.run_index,
                    instruction: event.instruction_id,
                });
            }
            prev_start = event.start_ns;
            if !seen.insert((event.chain_index, event.instruction_id)) {
                result.add_error(ValidationError::DuplicateInstruction {
                    run: block.run_index,
                    instruction: event.instruction_id,
                });
            }
        }
    }
    result
}

fn check_record(record: &GraphRecord) -> ValidationResult {
    let mut result = ValidationResult::default();

    if record.version != RECORD_VERSION {
        result.add_error(ValidationError::UnsupportedVersion {
            got: record.version,
            expected: RECORD_VERSION,
        });
    }

    if let Err(err) = record.graph.validate() {
        result.add_error(ValidationError::InvalidGraph {
            message: err.to_string(),
        });
    }

    for (name, program) in &record.programs {
        for (instruction, handle) in &program.debug_handle_map {
            if record.graph.node_for_handle(*handle).is_none() {
                result.add_warning(ValidationWarning::UnknownDebugHandle {
                    program: name.clone(),
                    instruction: *instruction,
                    handle: *handle,
                });
            }
        }
    }
    result
}
