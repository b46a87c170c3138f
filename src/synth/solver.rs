//! Release-record synthesis through an external SMT solver.
//!
//! Each attribute is one integer solver variable: reals are scaled ×10 and
//! rounded, string attributes range over `[0, domain size)` and decode back
//! through their value domain. Every `synthesize` call builds a fresh solver
//! instance loaded with the static spec constraints, the call's constraint
//! set and the session accumulator; the only state carried across calls is
//! the accumulator itself.
//!
//! The accumulator is scoped to a maximal run of consecutive calls sharing
//! one path condition. On unsatisfiability it is cleared and the call retried
//! exactly once, so one path's accumulated distinctness pressure cannot
//! permanently starve later records.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::domain::StringDomains;
use crate::synth::spec::{Clause, ConstraintSpec};
use crate::types::{CmpOp, Predicate, Record, Schema, Value};

/// Error raised while encoding constraints or decoding a model. All variants
/// are structural; per-record unsatisfiability is `Ok(None)`, not an error.
#[derive(Debug, Error)]
pub enum SolveError {
    /// A constraint names an attribute outside the dataset header.
    #[error("constraint attribute '{attribute}' does not exist in the dataset header")]
    UnknownAttribute {
        /// The undeclared attribute.
        attribute: String,
    },
    /// A string literal reached the solver without domain translation.
    #[error("literal '{literal}' for attribute '{attribute}' was not encoded through its domain")]
    UnencodedLiteral {
        /// Attribute of the stray literal.
        attribute: String,
        /// The literal itself.
        literal: String,
    },
    /// The model could not be decoded back into a record.
    #[error("solver model has no usable value for attribute '{attribute}'")]
    ModelDecode {
        /// Attribute that failed to decode.
        attribute: String,
    },
}

/// Stateful adapter around the solver, owning the static constraints and the
/// session anti-duplication accumulator.
pub struct ReleaseSynthesizer<'a> {
    schema: &'a Schema,
    domains: &'a StringDomains,
    spec: &'a ConstraintSpec,
    // Column positions modeled scaled ×10.
    scaled: HashSet<usize>,
    // Column positions subject to anti-duplication: bound-constrained spec
    // attributes plus every string attribute.
    tracked: HashSet<usize>,
    // Accumulated "must differ" constraints in model space, scoped to the
    // current run of same-path calls.
    session: Vec<(usize, i64)>,
}

impl<'a> ReleaseSynthesizer<'a> {
    /// Build the adapter from the parsed static constraints.
    pub fn new(schema: &'a Schema, domains: &'a StringDomains, spec: &'a ConstraintSpec) -> Self {
        let mut scaled = HashSet::new();
        let mut tracked = HashSet::new();
        for (i, name) in schema.names().iter().enumerate() {
            if spec.is_scaled(name) {
                scaled.insert(i);
            }
            if spec.is_tracked(name) || domains.is_string(name) {
                tracked.insert(i);
            }
        }
        Self {
            schema,
            domains,
            spec,
            scaled,
            tracked,
            session: Vec::new(),
        }
    }

    /// Number of accumulated session constraints.
    pub fn session_len(&self) -> usize {
        self.session.len()
    }

    /// Try to synthesize one release record satisfying the static
    /// constraints, the call-specific set `constraints` and the session
    /// accumulator. `path_changed` signals that the caller moved to a new
    /// path condition, which resets the accumulator.
    ///
    /// Returns `Ok(None)` when no record exists even after the single
    /// accumulator-clearing retry.
    pub fn synthesize(
        &mut self,
        constraints: &[Predicate],
        path_changed: bool,
    ) -> Result<Option<Record>, SolveError> {
        if path_changed {
            self.session.clear();
        }

        // Bounded retry: at most one extra attempt, after dropping the
        // accumulated distinctness constraints.
        let mut retried = false;
        loop {
            let solver = z3::Solver::new();
            let vars: Vec<z3::ast::Int> = self
                .schema
                .names()
                .iter()
                .map(|name| z3::ast::Int::new_const(name.as_str()))
                .collect();

            self.assert_static(&solver, &vars)?;
            for predicate in constraints {
                self.assert_predicate(&solver, &vars, predicate)?;
            }
            for &(position, value) in &self.session {
                solver.assert(&vars[position].eq(&z3::ast::Int::from_i64(value)).not());
            }

            if matches!(solver.check(), z3::SatResult::Sat) {
                let model = solver.get_model().ok_or_else(|| SolveError::ModelDecode {
                    attribute: self.schema.names()[0].clone(),
                })?;
                return Ok(Some(self.decode(&model, &vars)?));
            }

            if !self.session.is_empty() && !retried {
                debug!("unsatisfiable with session constraints, retrying once without them");
                self.session.clear();
                retried = true;
                continue;
            }
            return Ok(None);
        }
    }

    fn assert_static(
        &self,
        solver: &z3::Solver,
        vars: &[z3::ast::Int],
    ) -> Result<(), SolveError> {
        for attr_spec in self.spec.attrs() {
            let position = self.schema.position(&attr_spec.name).ok_or_else(|| {
                SolveError::UnknownAttribute {
                    attribute: attr_spec.name.clone(),
                }
            })?;
            let var = &vars[position];
            for clause in &attr_spec.clauses {
                match clause {
                    Clause::Membership(members) => {
                        let alternatives: Vec<z3::ast::Bool> = members
                            .iter()
                            .map(|&m| var.eq(&z3::ast::Int::from_i64(m)))
                            .collect();
                        let refs: Vec<&z3::ast::Bool> = alternatives.iter().collect();
                        solver.assert(&z3::ast::Bool::or(&refs));
                    }
                    Clause::Bound(op, value) => {
                        solver.assert(&compare(var, *op, *value));
                    }
                }
            }
        }

        // String attributes range over their discovered domain.
        for name in self.domains.attributes() {
            let Some(position) = self.schema.position(name) else {
                continue;
            };
            let size = self.domains.size(name).unwrap_or(0) as i64;
            solver.assert(&vars[position].ge(&z3::ast::Int::from_i64(0)));
            solver.assert(&vars[position].lt(&z3::ast::Int::from_i64(size)));
        }
        Ok(())
    }

    fn assert_predicate(
        &self,
        solver: &z3::Solver,
        vars: &[z3::ast::Int],
        predicate: &Predicate,
    ) -> Result<(), SolveError> {
        let position = self.schema.position(&predicate.attribute).ok_or_else(|| {
            SolveError::UnknownAttribute {
                attribute: predicate.attribute.clone(),
            }
        })?;
        let value = match &predicate.value {
            Value::Int(n) => {
                if self.scaled.contains(&position) {
                    n * 10
                } else {
                    *n
                }
            }
            Value::Real(r) => {
                if self.scaled.contains(&position) {
                    (r * 10.0).round() as i64
                } else {
                    r.round() as i64
                }
            }
            Value::Str(s) => {
                return Err(SolveError::UnencodedLiteral {
                    attribute: predicate.attribute.clone(),
                    literal: s.clone(),
                })
            }
        };
        solver.assert(&compare(&vars[position], predicate.op, value));
        Ok(())
    }

    fn decode(&mut self, model: &z3::Model, vars: &[z3::ast::Int]) -> Result<Record, SolveError> {
        let mut values = Vec::with_capacity(self.schema.len());
        for (position, name) in self.schema.names().iter().enumerate() {
            let raw = model
                .eval::<z3::ast::Int>(&vars[position], true)
                .and_then(|v| v.as_i64())
                .ok_or_else(|| SolveError::ModelDecode {
                    attribute: name.clone(),
                })?;

            if self.tracked.contains(&position) {
                self.session.push((position, raw));
            }

            let value = if self.domains.is_string(name) {
                let literal = self
                    .domains
                    .literal_at(name, raw as usize)
                    .ok_or_else(|| SolveError::ModelDecode {
                        attribute: name.clone(),
                    })?;
                Value::Str(literal.to_string())
            } else if self.scaled.contains(&position) {
                Value::Real(raw as f64 / 10.0)
            } else {
                Value::Int(raw)
            };
            values.push(value);
        }
        Ok(Record::new(values))
    }
}

// Translate one comparison into a solver term.
fn compare(var: &z3::ast::Int, op: CmpOp, value: i64) -> z3::ast::Bool {
    let literal = z3::ast::Int::from_i64(value);
    match op {
        CmpOp::Eq => var.eq(&literal),
        CmpOp::Ne => var.eq(&literal).not(),
        CmpOp::Lt => var.lt(&literal),
        CmpOp::Le => var.le(&literal),
        CmpOp::Gt => var.gt(&literal),
        CmpOp::Ge => var.ge(&literal),
    }
}
