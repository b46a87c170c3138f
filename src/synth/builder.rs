//! Anti-duplication constraint derivation.
//!
//! Given a focal record and its path-condition peers, derive the constraint
//! set that prevents the synthesized release record from leaking observed
//! values, under one of three run-wide policies:
//!
//! - **P-F**: the release record may not reuse any observed value in any
//!   field anywhere in the bucket.
//! - **P-T**: like P-F but restricted to a caller-declared field subset
//!   (default: the first declared attribute).
//! - **I-T**: generalized ("free") QI fields of the focal record are freshly
//!   synthesized under disequality pressure; every concrete field is pinned
//!   to the focal record's own value.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::domain::{DomainError, StringDomains};
use crate::types::{CmpOp, Predicate, Record, Schema};

/// The run-wide anti-duplication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    /// Same path, no field repeat.
    NoFieldRepeat,
    /// Same path, no tuple repeat over a field subset.
    NoTupleRepeat,
    /// Interactive: resynthesize generalized fields, pin concrete ones.
    Interactive,
}

impl ConfigOption {
    /// Parse the conventional option names `P-F`, `P-T`, `I-T`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "P-F" => Some(Self::NoFieldRepeat),
            "P-T" => Some(Self::NoTupleRepeat),
            "I-T" => Some(Self::Interactive),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoFieldRepeat => "P-F",
            Self::NoTupleRepeat => "P-T",
            Self::Interactive => "I-T",
        };
        write!(f, "{}", s)
    }
}

/// Error raised while deriving constraints.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A caller-declared tuple field is not part of the header. Structural.
    #[error("tuple field '{attribute}' does not exist in the dataset header")]
    UnknownField {
        /// The undeclared field.
        attribute: String,
    },
    /// A value could not be translated through its domain.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Derive the constraint set for one focal record under the configured
/// policy. `peers` is the focal record's raw path-condition bucket.
pub fn build(
    option: ConfigOption,
    peers: &[Record],
    focal: &Record,
    schema: &Schema,
    domains: &StringDomains,
    generic_values: &HashMap<String, Vec<String>>,
    tuple_fields: Option<&[String]>,
) -> Result<Vec<Predicate>, BuildError> {
    match option {
        ConfigOption::NoFieldRepeat => no_field_repeat(peers, schema, domains),
        ConfigOption::NoTupleRepeat => no_tuple_repeat(peers, schema, domains, tuple_fields),
        ConfigOption::Interactive => interactive(peers, focal, schema, domains, generic_values),
    }
}

/// P-F: forbid every observed value of every peer in every field.
pub fn no_field_repeat(
    peers: &[Record],
    schema: &Schema,
    domains: &StringDomains,
) -> Result<Vec<Predicate>, BuildError> {
    let mut constraints = Vec::with_capacity(peers.len() * schema.len());
    for peer in peers {
        for (i, name) in schema.names().iter().enumerate() {
            let value = domains.canonical(name, peer.value_at(i))?;
            constraints.push(Predicate::new(name.clone(), CmpOp::Ne, value));
        }
    }
    Ok(constraints)
}

/// P-T: like P-F restricted to `fields`; with no declared subset the first
/// declared attribute is used.
pub fn no_tuple_repeat(
    peers: &[Record],
    schema: &Schema,
    domains: &StringDomains,
    fields: Option<&[String]>,
) -> Result<Vec<Predicate>, BuildError> {
    let selected: Vec<String> = match fields {
        Some(fields) => {
            for field in fields {
                if !schema.contains(field) {
                    return Err(BuildError::UnknownField {
                        attribute: field.clone(),
                    });
                }
            }
            fields.to_vec()
        }
        None => schema.names().iter().take(1).cloned().collect(),
    };

    let mut constraints = Vec::new();
    for peer in peers {
        for (i, name) in schema.names().iter().enumerate() {
            if selected.iter().any(|f| f == name) {
                let value = domains.canonical(name, peer.value_at(i))?;
                constraints.push(Predicate::new(name.clone(), CmpOp::Ne, value));
            }
        }
    }
    Ok(constraints)
}

/// I-T: disequalities on the focal record's free (generic-valued) attributes
/// against every peer, equalities pinning every other attribute to the focal
/// record's own value. With no free attribute, fall back to P-T's default
/// selection.
pub fn interactive(
    peers: &[Record],
    focal: &Record,
    schema: &Schema,
    domains: &StringDomains,
    generic_values: &HashMap<String, Vec<String>>,
) -> Result<Vec<Predicate>, BuildError> {
    let mut free = vec![false; schema.len()];
    for (i, name) in schema.names().iter().enumerate() {
        if let Some(generics) = generic_values.get(name) {
            let value = focal.value_at(i).to_string();
            free[i] = generics.iter().any(|g| *g == value);
        }
    }

    if !free.iter().any(|&f| f) {
        return no_tuple_repeat(peers, schema, domains, None);
    }

    let mut constraints = Vec::new();
    for peer in peers {
        for (i, name) in schema.names().iter().enumerate() {
            if free[i] {
                let value = domains.canonical(name, peer.value_at(i))?;
                constraints.push(Predicate::new(name.clone(), CmpOp::Ne, value));
            }
        }
    }
    for (i, name) in schema.names().iter().enumerate() {
        if !free[i] {
            let value = domains.canonical(name, focal.value_at(i))?;
            constraints.push(Predicate::new(name.clone(), CmpOp::Eq, value));
        }
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn schema() -> Schema {
        Schema::new(vec![
            "age".to_string(),
            "zip_code".to_string(),
            "disease".to_string(),
        ])
    }

    fn record(age: i64, zip: i64, disease: &str) -> Record {
        Record::new(vec![Value::Int(age), Value::Int(zip), Value::from(disease)])
    }

    fn domains() -> StringDomains {
        let mut d = StringDomains::new();
        d.observe("disease", "Cancer");
        d.observe("disease", "AIDS");
        d
    }

    #[test]
    fn no_field_repeat_forbids_every_observed_value() {
        let peers = vec![record(30, 45000, "Cancer"), record(35, 48000, "AIDS")];
        let s = no_field_repeat(&peers, &schema(), &domains()).unwrap();
        assert_eq!(s.len(), 6);
        assert!(s.contains(&Predicate::new("age", CmpOp::Ne, 30)));
        assert!(s.contains(&Predicate::new("zip_code", CmpOp::Ne, 48000)));
        // String values go through the domain bijection.
        assert!(s.contains(&Predicate::new("disease", CmpOp::Ne, 0)));
        assert!(s.contains(&Predicate::new("disease", CmpOp::Ne, 1)));
    }

    #[test]
    fn no_tuple_repeat_defaults_to_first_declared_attribute() {
        let peers = vec![record(30, 45000, "Cancer"), record(35, 48000, "Cancer")];
        let s = no_tuple_repeat(&peers, &schema(), &domains(), None).unwrap();
        assert_eq!(
            s,
            vec![
                Predicate::new("age", CmpOp::Ne, 30),
                Predicate::new("age", CmpOp::Ne, 35),
            ]
        );
    }

    #[test]
    fn no_tuple_repeat_respects_declared_fields() {
        let peers = vec![record(30, 45000, "Cancer")];
        let fields = vec!["zip_code".to_string(), "disease".to_string()];
        let s = no_tuple_repeat(&peers, &schema(), &domains(), Some(&fields)).unwrap();
        assert_eq!(
            s,
            vec![
                Predicate::new("zip_code", CmpOp::Ne, 45000),
                Predicate::new("disease", CmpOp::Ne, 0),
            ]
        );
    }

    #[test]
    fn unknown_tuple_field_is_fatal() {
        let peers = vec![record(30, 45000, "Cancer")];
        let fields = vec!["salary".to_string()];
        let err = no_tuple_repeat(&peers, &schema(), &domains(), Some(&fields)).unwrap_err();
        assert!(matches!(err, BuildError::UnknownField { .. }));
    }

    #[test]
    fn interactive_splits_free_and_pinned_attributes() {
        let peers = vec![record(30, 45000, "Cancer"), record(35, 48000, "Cancer")];
        // Focal seed has a generalized zip_code.
        let focal = Record::new(vec![
            Value::Int(30),
            Value::from("40000-49999"),
            Value::from("Cancer"),
        ]);
        let mut generics = HashMap::new();
        generics.insert(
            "zip_code".to_string(),
            vec!["40000-49999".to_string(), "*".to_string()],
        );

        let s = interactive(&peers, &focal, &schema(), &domains(), &generics).unwrap();
        assert_eq!(
            s,
            vec![
                // Free attribute: disequalities against both peers.
                Predicate::new("zip_code", CmpOp::Ne, 45000),
                Predicate::new("zip_code", CmpOp::Ne, 48000),
                // Concrete attributes: pinned to the focal record.
                Predicate::new("age", CmpOp::Eq, 30),
                Predicate::new("disease", CmpOp::Eq, 0),
            ]
        );
    }

    #[test]
    fn interactive_without_free_attributes_falls_back_to_default_tuple() {
        let peers = vec![record(30, 45000, "Cancer")];
        let focal = record(30, 45000, "Cancer");
        let mut generics = HashMap::new();
        generics.insert("zip_code".to_string(), vec!["*".to_string()]);

        let s = interactive(&peers, &focal, &schema(), &domains(), &generics).unwrap();
        assert_eq!(s, vec![Predicate::new("age", CmpOp::Ne, 30)]);
    }

    #[test]
    fn option_names_parse_case_insensitively() {
        assert_eq!(ConfigOption::parse("P-F"), Some(ConfigOption::NoFieldRepeat));
        assert_eq!(ConfigOption::parse("p-t"), Some(ConfigOption::NoTupleRepeat));
        assert_eq!(ConfigOption::parse("I-T"), Some(ConfigOption::Interactive));
        assert_eq!(ConfigOption::parse("X-Y"), None);
        assert_eq!(ConfigOption::Interactive.to_string(), "I-T");
    }
}
