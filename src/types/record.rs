//! Records and the dataset schema.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::value::Value;

/// The dataset header: attribute names in declaration order, plus a reverse
/// index from name to column position.
///
/// Declaration order is semantically significant (it drives the anonymizer's
/// tie-break and P-T's default field selection), so the schema is the single
/// owner of attribute ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    names: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema from the header row.
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, index }
    }

    /// Attribute names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Column position of an attribute, if declared.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether the attribute is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema has no attributes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row of the dataset: values in schema column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Build a record from column-ordered values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a column position.
    pub fn value_at(&self, position: usize) -> &Value {
        &self.values[position]
    }

    /// Value of a named attribute.
    pub fn get<'a>(&'a self, schema: &Schema, attribute: &str) -> Option<&'a Value> {
        schema.position(attribute).map(|i| &self.values[i])
    }

    /// Overwrite the value at a column position.
    pub fn set(&mut self, position: usize, value: Value) {
        self.values[position] = value;
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Attribute-keyed read view over one record, handed to subject programs.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    schema: &'a Schema,
    record: &'a Record,
}

impl<'a> RecordView<'a> {
    /// Build a view over a record.
    pub fn new(schema: &'a Schema, record: &'a Record) -> Self {
        Self { schema, record }
    }

    /// Value of a named attribute.
    pub fn get(&self, attribute: &str) -> Option<&'a Value> {
        self.record.get(self.schema, attribute)
    }

    /// Numeric value of a named attribute (integers widen to `f64`).
    pub fn num(&self, attribute: &str) -> Option<f64> {
        self.get(attribute).and_then(Value::as_num)
    }

    /// String value of a named attribute.
    pub fn text(&self, attribute: &str) -> Option<&'a str> {
        self.get(attribute).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            "age".to_string(),
            "zip_code".to_string(),
            "disease".to_string(),
        ])
    }

    #[test]
    fn schema_positions_follow_declaration_order() {
        let s = schema();
        assert_eq!(s.position("age"), Some(0));
        assert_eq!(s.position("disease"), Some(2));
        assert_eq!(s.position("salary"), None);
        assert_eq!(s.names()[1], "zip_code");
    }

    #[test]
    fn record_view_reads_by_attribute() {
        let s = schema();
        let r = Record::new(vec![Value::Int(30), Value::Int(45000), Value::from("Cancer")]);
        let view = RecordView::new(&s, &r);
        assert_eq!(view.num("age"), Some(30.0));
        assert_eq!(view.text("disease"), Some("Cancer"));
        assert_eq!(view.num("disease"), None);
        assert!(view.get("salary").is_none());
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut r = Record::new(vec![Value::Int(45000)]);
        r.set(0, Value::from("40000-49999"));
        assert_eq!(r.value_at(0), &Value::from("40000-49999"));
    }
}
