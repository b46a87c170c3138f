//! Per-attribute value domains for string fields.
//!
//! String attributes cannot be handed to the integer solver directly, so each
//! string attribute gets an ordered list of the distinct literals observed in
//! the raw dataset (first-seen order, built in a single pass). The list
//! provides the bijection string ⇄ index used both when canonicalizing path
//! conditions and when encoding/decoding solver variables.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::Value;

/// Error raised when a literal cannot be translated through its domain.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A string literal was referenced that never appeared in the dataset.
    /// This is structural: a subject program or constraint comparing against
    /// a literal outside the discovered domain cannot be encoded.
    #[error("literal '{literal}' for attribute '{attribute}' does not appear in the dataset")]
    UnknownLiteral {
        /// Attribute whose domain was consulted.
        attribute: String,
        /// The missing literal.
        literal: String,
    },
}

/// The discovered string domains of a dataset, keyed by attribute name.
#[derive(Debug, Clone, Default)]
pub struct StringDomains {
    domains: HashMap<String, Vec<String>>,
}

impl StringDomains {
    /// Empty domain set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed literal for a string attribute, keeping first-seen
    /// order and dropping repeats. Observing an attribute for the first time
    /// declares it string-valued.
    pub fn observe(&mut self, attribute: &str, literal: &str) {
        let domain = self.domains.entry(attribute.to_string()).or_default();
        if !domain.iter().any(|v| v == literal) {
            domain.push(literal.to_string());
        }
    }

    /// Whether the attribute is string-valued.
    pub fn is_string(&self, attribute: &str) -> bool {
        self.domains.contains_key(attribute)
    }

    /// Index of a literal in its attribute's domain.
    pub fn index_of(&self, attribute: &str, literal: &str) -> Option<usize> {
        self.domains
            .get(attribute)?
            .iter()
            .position(|v| v == literal)
    }

    /// Literal at an index of an attribute's domain.
    pub fn literal_at(&self, attribute: &str, index: usize) -> Option<&str> {
        self.domains
            .get(attribute)?
            .get(index)
            .map(String::as_str)
    }

    /// Domain size of a string attribute.
    pub fn size(&self, attribute: &str) -> Option<usize> {
        self.domains.get(attribute).map(Vec::len)
    }

    /// Names of all string attributes (unordered).
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Canonical form of a value for an attribute: string literals of string
    /// attributes become their domain index, everything else passes through.
    pub fn canonical(&self, attribute: &str, value: &Value) -> Result<Value, DomainError> {
        match value {
            Value::Str(s) if self.is_string(attribute) => {
                let index =
                    self.index_of(attribute, s)
                        .ok_or_else(|| DomainError::UnknownLiteral {
                            attribute: attribute.to_string(),
                            literal: s.clone(),
                        })?;
                Ok(Value::Int(index as i64))
            }
            other => Ok(other.clone()),
        }
    }
}
