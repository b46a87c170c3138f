//! # kb-anonymity
//!
//! Privacy-preserving release-dataset synthesis for program-based sharing.
//!
//! The pipeline answers one question:
//!
//! > Given a sensitive dataset and the program that consumes it, which
//! > **synthetic** records can be released so that the program behaves the
//! > same, without leaking any real individual's data?
//!
//! ## Core Contract
//!
//! 1. Run the subject program over every record and group records by the
//!    decision path they exercise (their path condition)
//! 2. K-anonymize each group's quasi-identifiers by iterative full-domain
//!    generalization with bounded suppression
//! 3. Synthesize fresh records through an SMT solver, constrained to the
//!    group's path condition and the configured anti-duplication policy
//!
//! ## Architecture
//!
//! ```text
//! Dataset → SubjectProgram → Buckets → Anonymizer → ConstraintBuilder
//!                                                         ↓
//!                               ReleaseSynthesizer (SMT) → release records
//! ```
//!
//! ## Release Guarantees
//!
//! - Every release record exercises the same program path as the bucket it
//!   was synthesized from
//! - Path conditions supported by fewer than `k` records are never released
//! - The anti-duplication policy (P-F, P-T or I-T) decides which observed
//!   values a release record may repeat

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anonymizer;
pub mod bucketer;
pub mod dataset;
pub mod domain;
pub mod hierarchy;
pub mod pipeline;
pub mod synth;
pub mod types;

// Re-exports
pub use anonymizer::{AnonymizeError, Anonymizer, BucketAnonymization};
pub use bucketer::{bucketize, Bucket, BucketStats, ProgramRegistry, SubjectProgram};
pub use dataset::{write_release, Dataset, DatasetError};
pub use domain::{DomainError, StringDomains};
pub use hierarchy::{CsvDgh, Hierarchy, HierarchyError};
pub use pipeline::{ConfigError, Pipeline, PipelineError, RunConfig, RunReport};
pub use synth::{
    BuildError, ConfigOption, ConstraintSpec, ReleaseSynthesizer, SolveError, SpecError,
};
pub use types::{CmpOp, PathCondition, Predicate, Record, RecordView, Schema, Value};

/// Default anonymity level when the caller does not pick one.
pub const DEFAULT_K: usize = 2;
