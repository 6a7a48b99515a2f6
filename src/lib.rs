//! # oru-risk: Lab Result Risk Flagging for HL7 ORU Batches
//!
//! oru-risk reads batches of HL7 v2 ORU (observation result) messages, matches
//! each lab observation to a metric definition by sonic code, unit, patient
//! age and gender, and flags values outside the accepted range.
//!
//! ## Features
//!
//! - **HL7 parsing**: batch segmentation and delimiter-aware field extraction
//! - **Reference tables**: diagnostic metrics and conditions loaded from CSV
//! - **Batch evaluation**: per-message isolation with a summary report
//! - **HTTP service**: multipart upload endpoint (`oru-api` binary)
//! - **CLI**: offline evaluation and table validation (`oru-risk` binary)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use oru_risk::{BatchEvaluator, ReferenceTable, TableSources};
//!
//! let table = ReferenceTable::load(&TableSources::new("diagnostic_metrics.csv", "conditions.csv"))?;
//! let evaluator = BatchEvaluator::new(Arc::new(table));
//!
//! for result in evaluator.evaluate_batch(&std::fs::read("batch.oru")?) {
//!     println!("{}: {} {} ({})", result.test_name, result.observed_value, result.units, result.everlab_range);
//! }
//! ```

// Core modules
pub mod error;
pub mod extraction;
pub mod demographics;

// HL7 message handling
pub mod hl7;

// Reference data
pub mod reference;

// Evaluation engine
pub mod engine;

// Service plumbing
pub mod config;
pub mod serialization;
pub mod server;

// Re-export key types
pub use error::ObservationError;
pub use extraction::{AddressError, Extractor, FieldAddress, FieldValue};
pub use demographics::{compute_age, parse_date_of_birth, Demographics, Gender};
pub use hl7::{split_messages, Hl7Error, Hl7Message};

// Re-export reference types
pub use reference::{Condition, MetricDefinition, ReferenceTable, TableError, TableSources};

// Re-export engine types
pub use engine::{
    evaluate, select_metric, BatchEvaluator, BatchOutcome, BatchReport, FlaggedResult,
    MetricQuery, Observation, ObservationFields, ObservationScope, Verdict,
};

pub use config::{ConfigError, ServiceConfig};
pub use serialization::{write_outcome, write_results, OutputFormat, SerializationError};
pub use server::{router, AppError, AppState};
