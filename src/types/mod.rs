//! Core types for the kb-anonymity pipeline.

pub mod predicate;
pub mod record;
pub mod value;

pub use predicate::{CmpOp, PathCondition, Predicate};
pub use record::{Record, RecordView, Schema};
pub use value::Value;
