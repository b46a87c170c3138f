//! Constraint generation and solver-backed record synthesis.

pub mod builder;
pub mod solver;
pub mod spec;

pub use builder::{BuildError, ConfigOption};
pub use solver::{ReleaseSynthesizer, SolveError};
pub use spec::{AttributeSpec, Clause, ConstraintSpec, SpecError};
