//! Atomic predicates and path conditions.
//!
//! A path condition is the grouping key of the whole pipeline: two records
//! belong to the same bucket iff their canonical predicate sequences are
//! structurally equal. The same `(attribute, operator, value)` shape doubles
//! as the constraint form handed to the solver adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::Value;

/// The six comparison operators allowed in path conditions and constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Parse an operator token. Callers treat `None` as a fatal error: an
    /// unknown operator in a constraint spec or path condition aborts the run.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// One atomic predicate: `attribute op value`.
///
/// In canonical form string literals have already been mapped to their index
/// in the attribute's value domain, so `value` is numeric for every attribute
/// the solver will ever see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Attribute the predicate constrains.
    pub attribute: String,
    /// Comparison operator.
    pub op: CmpOp,
    /// Literal operand.
    pub value: Value,
}

impl Predicate {
    /// Build a predicate.
    pub fn new(attribute: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.op, self.value)
    }
}

/// An ordered, deduplicated sequence of atomic predicates describing one
/// concrete execution path of the subject program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathCondition {
    atoms: Vec<Predicate>,
}

impl PathCondition {
    /// Build a path condition, dropping repeated atoms while keeping the
    /// first occurrence's position.
    pub fn new(atoms: Vec<Predicate>) -> Self {
        let mut deduped: Vec<Predicate> = Vec::with_capacity(atoms.len());
        for atom in atoms {
            if !deduped.contains(&atom) {
                deduped.push(atom);
            }
        }
        Self { atoms: deduped }
    }

    /// The predicates in path order.
    pub fn atoms(&self) -> &[Predicate] {
        &self.atoms
    }

    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the path condition carries no predicates. Records with empty
    /// path conditions are dropped, there is nothing to exploit downstream.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl fmt::Display for PathCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{}", atom)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn operator_parse_and_display() {
        for tok in ["==", "!=", "<", "<=", ">", ">="] {
            let op = CmpOp::parse(tok).unwrap();
            assert_eq!(op.to_string(), tok);
        }
        assert_eq!(CmpOp::parse("=>"), None);
        assert_eq!(CmpOp::parse("="), None);
    }

    #[test]
    fn path_condition_dedupes_preserving_order() {
        let a = Predicate::new("age", CmpOp::Lt, 40);
        let b = Predicate::new("zip_code", CmpOp::Ge, 50000);
        let pc = PathCondition::new(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(pc.atoms(), &[a, b]);
    }

    #[test]
    fn structurally_equal_paths_share_a_bucket_key() {
        let make = || {
            PathCondition::new(vec![
                Predicate::new("age", CmpOp::Lt, 40),
                Predicate::new("disease", CmpOp::Eq, 0),
            ])
        };
        let mut buckets: HashMap<PathCondition, usize> = HashMap::new();
        *buckets.entry(make()).or_default() += 1;
        *buckets.entry(make()).or_default() += 1;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&make()], 2);
    }

    #[test]
    fn ordering_is_part_of_the_key() {
        let a = Predicate::new("age", CmpOp::Lt, 40);
        let b = Predicate::new("zip_code", CmpOp::Lt, 50000);
        let ab = PathCondition::new(vec![a.clone(), b.clone()]);
        let ba = PathCondition::new(vec![b, a]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn display_is_readable() {
        let pc = PathCondition::new(vec![
            Predicate::new("age", CmpOp::Lt, 40),
            Predicate::new("disease", CmpOp::Eq, "Cancer"),
        ]);
        assert_eq!(pc.to_string(), "age < 40 && disease == Cancer");
    }
}
