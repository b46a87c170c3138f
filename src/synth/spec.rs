//! Constraint specification parsing.
//!
//! The spec file declares the static value constraints of the release
//! dataset, one line per attribute:
//!
//! ```text
//! age >= 1 <= 99
//! sex == 0-1
//! oldpeak >= 0.0 <= 6.2
//! ```
//!
//! An `==` line is a disjunctive membership set (dash-separated); any other
//! operator is a simple bound; several operator/value pairs on one line are
//! conjoined. Attributes whose values carry a decimal point are modeled
//! scaled ×10 inside the solver.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::types::{CmpOp, Schema};

/// Error raised while parsing a constraint specification. All variants are
/// structural and abort the run.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Spec file could not be read.
    #[error("cannot read constraint spec '{path}': {source}")]
    Read {
        /// Offending file path.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A line does not follow `ATTRIBUTE OP VALUE [OP VALUE ...]`.
    #[error("constraint spec line {line} is malformed")]
    Malformed {
        /// 1-based line number.
        line: usize,
    },
    /// The attribute is not part of the dataset header.
    #[error("attribute '{attribute}' in constraint spec (line {line}) does not exist")]
    UnknownAttribute {
        /// The undeclared attribute.
        attribute: String,
        /// 1-based line number.
        line: usize,
    },
    /// An operator outside the six comparison operators.
    #[error("operator '{operator}' in constraint spec (line {line}) must not be used")]
    UnknownOperator {
        /// The offending operator token.
        operator: String,
        /// 1-based line number.
        line: usize,
    },
    /// A value that is neither an integer nor a real.
    #[error("value '{value}' in constraint spec (line {line}) is not an int or real")]
    BadValue {
        /// The offending value token.
        value: String,
        /// 1-based line number.
        line: usize,
    },
}

/// One clause of an attribute's static constraints, values already in solver
/// (model) space: reals are scaled ×10 and rounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// The attribute must equal one of these values.
    Membership(Vec<i64>),
    /// An open bound on the attribute.
    Bound(CmpOp, i64),
}

/// Static constraints for one attribute.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    /// Attribute name.
    pub name: String,
    /// Whether the attribute is real-valued (modeled scaled ×10).
    pub scaled: bool,
    /// Whether the attribute participates in session anti-duplication.
    /// Membership-only attributes do not: their tiny domains would starve.
    pub tracked: bool,
    /// Conjoined clauses.
    pub clauses: Vec<Clause>,
}

/// A parsed constraint specification, in file order.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSpec {
    attrs: Vec<AttributeSpec>,
}

impl ConstraintSpec {
    /// Parse a spec file.
    pub fn from_path(path: &Path, schema: &Schema) -> Result<Self, SpecError> {
        let text = fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text, schema)
    }

    /// Parse spec text against a dataset schema.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str, schema: &Schema) -> Result<Self, SpecError> {
        let mut spec = Self::default();

        for (line_idx, raw_line) in text.lines().enumerate() {
            let line = line_idx + 1;
            let tokens: Vec<&str> = raw_line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens.len() < 3 || tokens.len() % 2 == 0 {
                return Err(SpecError::Malformed { line });
            }

            let name = tokens[0];
            if !schema.contains(name) {
                return Err(SpecError::UnknownAttribute {
                    attribute: name.to_string(),
                    line,
                });
            }

            // The first value token decides int vs real for the attribute;
            // membership sets are probed through their first alternative.
            let probe = if tokens[1] == "==" {
                tokens[2].split('-').next().unwrap_or(tokens[2])
            } else {
                tokens[2]
            };
            let scaled = match value_kind(probe) {
                ValueKind::Int => false,
                ValueKind::Real => true,
                ValueKind::Other => {
                    return Err(SpecError::BadValue {
                        value: tokens[2].to_string(),
                        line,
                    })
                }
            };

            let entry = spec.entry(name, scaled);
            for pair in tokens[1..].chunks(2) {
                let op = CmpOp::parse(pair[0]).ok_or_else(|| SpecError::UnknownOperator {
                    operator: pair[0].to_string(),
                    line,
                })?;
                if op == CmpOp::Eq {
                    let mut members = Vec::new();
                    for alt in pair[1].split('-') {
                        members.push(parse_value(alt, scaled).ok_or_else(|| {
                            SpecError::BadValue {
                                value: alt.to_string(),
                                line,
                            }
                        })?);
                    }
                    entry.clauses.push(Clause::Membership(members));
                } else {
                    let value = parse_value(pair[1], scaled).ok_or_else(|| SpecError::BadValue {
                        value: pair[1].to_string(),
                        line,
                    })?;
                    entry.tracked = true;
                    entry.clauses.push(Clause::Bound(op, value));
                }
            }
        }

        Ok(spec)
    }

    // The spec entry for an attribute, created on first sight.
    fn entry(&mut self, name: &str, scaled: bool) -> &mut AttributeSpec {
        if let Some(i) = self.attrs.iter().position(|a| a.name == name) {
            return &mut self.attrs[i];
        }
        self.attrs.push(AttributeSpec {
            name: name.to_string(),
            scaled,
            tracked: false,
            clauses: Vec::new(),
        });
        self.attrs.last_mut().expect("just pushed")
    }

    /// The attribute specs in file order.
    pub fn attrs(&self) -> &[AttributeSpec] {
        &self.attrs
    }

    /// Whether an attribute is real-valued (scaled ×10 in the solver).
    pub fn is_scaled(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name && a.scaled)
    }

    /// Whether an attribute participates in session anti-duplication.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name && a.tracked)
    }
}

enum ValueKind {
    Int,
    Real,
    Other,
}

fn value_kind(token: &str) -> ValueKind {
    if token.parse::<i64>().is_ok() {
        ValueKind::Int
    } else if token.parse::<f64>().is_ok() {
        ValueKind::Real
    } else {
        ValueKind::Other
    }
}

// A value token in model space: ints verbatim, reals ×10 rounded.
fn parse_value(token: &str, scaled: bool) -> Option<i64> {
    if scaled {
        let real: f64 = token.parse().ok()?;
        Some((real * 10.0).round() as i64)
    } else {
        token.parse().ok()
    }
}
