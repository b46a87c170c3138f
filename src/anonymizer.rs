//! Quasi-identifier anonymization.
//!
//! Stage two: per bucket, iterative full-domain generalization with bounded
//! suppression. Rows are partitioned into frequency groups by their QI value
//! tuple; while more than `k` rows sit in sub-`k` groups and some attribute
//! can still climb its hierarchy, the attribute with the most distinct
//! current values (declaration order breaking ties) is generalized one level
//! and identical groups merge. Leftover sub-`k` groups are suppressed.
//!
//! Termination holds because each round increments exactly one generalization
//! level and levels are bounded by the hierarchy heights.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::bucketer::Bucket;
use crate::hierarchy::Hierarchy;
use crate::types::{Record, Schema, Value};

/// Error raised while anonymizing.
#[derive(Debug, Error)]
pub enum AnonymizeError {
    /// A quasi-identifier is not part of the dataset header. Structural:
    /// aborts the whole run.
    #[error("quasi-identifier '{attribute}' does not exist in the dataset header")]
    UnknownAttribute {
        /// The undeclared attribute.
        attribute: String,
    },
    /// No hierarchy was supplied for a quasi-identifier. Structural.
    #[error("no hierarchy supplied for quasi-identifier '{attribute}'")]
    MissingHierarchy {
        /// The quasi-identifier without a hierarchy.
        attribute: String,
    },
    /// The hierarchy has no mapping for a value it was asked to generalize.
    /// Aborts the current bucket only; other buckets are unaffected.
    #[error("value '{value}' is not in the hierarchy for attribute '{attribute}'")]
    ValueNotInHierarchy {
        /// Attribute whose hierarchy is malformed.
        attribute: String,
        /// The value with no mapping.
        value: String,
    },
}

/// Result of anonymizing one bucket.
#[derive(Debug, Clone)]
pub struct BucketAnonymization {
    /// Anonymized records in original row order. QI fields hold the group's
    /// (possibly generalized) values; every other field is copied verbatim.
    pub records: Vec<Record>,
    /// Rows permanently dropped because their group never reached `k`.
    pub suppressed: usize,
    /// Records discarded by the I-T seed filter (no concrete QI value left).
    pub filtered: usize,
}

// One QI frequency group: occurrence count plus owning row indices.
#[derive(Debug, Clone, Default)]
struct Group {
    count: usize,
    rows: BTreeSet<usize>,
}

/// Per-bucket generalization/suppression engine.
#[derive(Debug)]
pub struct Anonymizer<'a, H: Hierarchy> {
    schema: &'a Schema,
    qi_names: &'a [String],
    qi_positions: Vec<usize>,
    k: usize,
    hierarchies: &'a HashMap<String, H>,
    generic_values: &'a HashMap<String, Vec<String>>,
    interactive: bool,
}

impl<'a, H: Hierarchy> Anonymizer<'a, H> {
    /// Build an anonymizer for a run.
    ///
    /// `interactive` enables the I-T seed filter: anonymized records whose
    /// every generic-capable QI value is already generalized are discarded,
    /// since they cannot seed interactive constraint generation.
    pub fn new(
        schema: &'a Schema,
        qi_names: &'a [String],
        k: usize,
        hierarchies: &'a HashMap<String, H>,
        generic_values: &'a HashMap<String, Vec<String>>,
        interactive: bool,
    ) -> Result<Self, AnonymizeError> {
        let mut qi_positions = Vec::with_capacity(qi_names.len());
        for name in qi_names {
            let position =
                schema
                    .position(name)
                    .ok_or_else(|| AnonymizeError::UnknownAttribute {
                        attribute: name.clone(),
                    })?;
            if !hierarchies.contains_key(name) {
                return Err(AnonymizeError::MissingHierarchy {
                    attribute: name.clone(),
                });
            }
            qi_positions.push(position);
        }
        Ok(Self {
            schema,
            qi_names,
            qi_positions,
            k,
            hierarchies,
            generic_values,
            interactive,
        })
    }

    /// Anonymize one bucket.
    pub fn anonymize_bucket(&self, bucket: &Bucket) -> Result<BucketAnonymization, AnonymizeError> {
        let mut groups: HashMap<Vec<Value>, Group> = HashMap::new();
        for (n, row) in bucket.rows.iter().enumerate() {
            let key: Vec<Value> = self
                .qi_positions
                .iter()
                .map(|&p| row.value_at(p).clone())
                .collect();
            let group = groups.entry(key).or_default();
            group.count += 1;
            group.rows.insert(n);
        }

        let mut gen_levels = vec![0usize; self.qi_names.len()];

        let suppressed = loop {
            let below_k: usize = groups
                .values()
                .filter(|g| g.count < self.k)
                .map(|g| g.count)
                .sum();
            debug!(
                path = %bucket.condition,
                below_k,
                "tuples not yet k-anonymous"
            );

            let target = if below_k > self.k {
                self.pick_attribute(&groups, &gen_levels)
            } else {
                None
            };
            let Some(attribute_idx) = target else {
                break below_k;
            };

            debug!(
                attribute = %self.qi_names[attribute_idx],
                level = gen_levels[attribute_idx],
                "generalizing attribute with most distinct values"
            );
            groups = self.generalize_round(groups, attribute_idx, gen_levels[attribute_idx])?;
            gen_levels[attribute_idx] += 1;
        };

        groups.retain(|_, g| g.count >= self.k);
        if suppressed > 0 {
            warn!(path = %bucket.condition, suppressed, "suppressed tuples below k");
        }

        // Emit in ascending original row order so the release set follows
        // input order deterministically.
        let mut emitted: Vec<(usize, &Vec<Value>)> = groups
            .iter()
            .flat_map(|(key, g)| g.rows.iter().map(move |&n| (n, key)))
            .collect();
        emitted.sort_unstable_by_key(|(n, _)| *n);

        let mut records = Vec::with_capacity(emitted.len());
        let mut filtered = 0usize;
        for (n, key) in emitted {
            let mut record = bucket.rows[n].clone();
            for (j, &p) in self.qi_positions.iter().enumerate() {
                record.set(p, key[j].clone());
            }
            if self.interactive && self.fully_generic(&record) {
                warn!(
                    path = %bucket.condition,
                    row = n,
                    "unsatisfiable case: no concrete QI value left, dropping seed"
                );
                filtered += 1;
                continue;
            }
            records.push(record);
        }

        Ok(BucketAnonymization {
            records,
            suppressed,
            filtered,
        })
    }

    // The QI attribute with the largest set of distinct current values among
    // those that can still climb their hierarchy; first declared wins ties.
    fn pick_attribute(
        &self,
        groups: &HashMap<Vec<Value>, Group>,
        gen_levels: &[usize],
    ) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (j, name) in self.qi_names.iter().enumerate() {
            if gen_levels[j] >= self.hierarchies[name].height() {
                continue;
            }
            let cardinality = groups
                .keys()
                .map(|key| &key[j])
                .collect::<HashSet<_>>()
                .len();
            // Strict comparison keeps the first maximal attribute.
            if best.map_or(true, |(_, c)| cardinality > c) {
                best = Some((j, cardinality));
            }
        }
        best.map(|(j, _)| j)
    }

    // One generalization round over every group for one attribute, merging
    // groups whose keys collide afterwards. Root values stay unchanged.
    fn generalize_round(
        &self,
        groups: HashMap<Vec<Value>, Group>,
        attribute_idx: usize,
        level: usize,
    ) -> Result<HashMap<Vec<Value>, Group>, AnonymizeError> {
        let name = &self.qi_names[attribute_idx];
        let hierarchy = &self.hierarchies[name];
        // Memoized per raw value: distinct raw values hit the hierarchy once.
        let mut lookups: HashMap<String, Option<String>> = HashMap::new();
        let mut merged: HashMap<Vec<Value>, Group> = HashMap::with_capacity(groups.len());

        for (mut key, group) in groups {
            let raw = key[attribute_idx].to_string();
            let generalized = match lookups.get(&raw) {
                Some(cached) => cached.clone(),
                None => {
                    let parent = hierarchy.generalize(&raw, level).map_err(|_| {
                        AnonymizeError::ValueNotInHierarchy {
                            attribute: name.clone(),
                            value: raw.clone(),
                        }
                    })?;
                    lookups.insert(raw, parent.clone());
                    parent
                }
            };
            if let Some(parent) = generalized {
                key[attribute_idx] = Value::parse(&parent);
            }
            let slot = merged.entry(key).or_default();
            slot.count += group.count;
            slot.rows.extend(group.rows);
        }

        Ok(merged)
    }

    // True when every QI attribute with a declared generic-value domain holds
    // a value from that domain, i.e. nothing concrete remains to seed I-T.
    fn fully_generic(&self, record: &Record) -> bool {
        let mut saw_generic_domain = false;
        for (j, name) in self.qi_names.iter().enumerate() {
            let Some(generics) = self.generic_values.get(name) else {
                continue;
            };
            saw_generic_domain = true;
            let value = record.value_at(self.qi_positions[j]).to_string();
            if !generics.iter().any(|g| *g == value) {
                return false;
            }
        }
        saw_generic_domain
    }

    /// The schema this anonymizer operates over.
    pub fn schema(&self) -> &Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyError;
    use crate::types::{CmpOp, PathCondition, Predicate};
    use proptest::prelude::*;

    // Minimal in-memory hierarchy for tests.
    #[derive(Debug)]
    struct MapHierarchy {
        levels: Vec<HashMap<String, Option<String>>>,
    }

    impl MapHierarchy {
        fn from_paths(paths: &[&[&str]]) -> Self {
            let mut levels: Vec<HashMap<String, Option<String>>> = Vec::new();
            for path in paths {
                for (level, value) in path.iter().enumerate() {
                    if levels.len() <= level {
                        levels.push(HashMap::new());
                    }
                    let parent = path.get(level + 1).map(|p| p.to_string());
                    levels[level].entry(value.to_string()).or_insert(parent);
                }
            }
            Self { levels }
        }
    }

    impl Hierarchy for MapHierarchy {
        fn generalize(&self, value: &str, level: usize) -> Result<Option<String>, HierarchyError> {
            self.levels
                .get(level)
                .and_then(|m| m.get(value))
                .cloned()
                .ok_or_else(|| HierarchyError::UnknownValue {
                    value: value.to_string(),
                    level,
                })
        }

        fn height(&self) -> usize {
            self.levels.len().saturating_sub(1)
        }
    }

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

    fn bucket(rows: Vec<Record>) -> Bucket {
        Bucket {
            condition: PathCondition::new(vec![Predicate::new("age", CmpOp::Lt, 40)]),
            rows,
        }
    }

    fn zip_hierarchy() -> MapHierarchy {
        MapHierarchy::from_paths(&[
            &["45000", "40000-49999", "*"],
            &["48000", "40000-49999", "*"],
            &["85000", "80000-99999", "*"],
            &["90000", "80000-99999", "*"],
        ])
    }

    fn no_generics() -> HashMap<String, Vec<String>> {
        HashMap::new()
    }

    #[test]
    fn collapsing_hierarchy_merges_groups_without_suppression() {
        let schema = schema();
        let qi = vec!["zip_code".to_string()];
        let mut hierarchies = HashMap::new();
        hierarchies.insert("zip_code".to_string(), zip_hierarchy());
        let generics = no_generics();
        let anonymizer = Anonymizer::new(&schema, &qi, 2, &hierarchies, &generics, false).unwrap();

        let b = bucket(vec![
            record(30, 45000, "Cancer"),
            record(35, 48000, "Cancer"),
        ]);
        let out = anonymizer.anonymize_bucket(&b).unwrap();

        assert_eq!(out.suppressed, 0);
        assert_eq!(out.records.len(), 2);
        for r in &out.records {
            assert_eq!(r.value_at(1), &Value::from("40000-49999"));
        }
        // Non-QI fields are untouched.
        assert_eq!(out.records[0].value_at(0), &Value::Int(30));
        assert_eq!(out.records[1].value_at(0), &Value::Int(35));
    }

    #[test]
    fn unmergeable_minority_is_suppressed() {
        let schema = schema();
        let qi = vec!["zip_code".to_string()];
        let mut hierarchies = HashMap::new();
        hierarchies.insert(
            "zip_code".to_string(),
            MapHierarchy::from_paths(&[
                &["45000", "40000-49999"],
                &["48000", "40000-49999"],
                &["85000", "80000-99999"],
            ]),
        );
        let generics = no_generics();
        let anonymizer = Anonymizer::new(&schema, &qi, 2, &hierarchies, &generics, false).unwrap();

        // Three rows in sub-k groups: one round generalizes zip_code, the two
        // 4xxxx rows merge, the 85000 row stays alone and is suppressed.
        let b = bucket(vec![
            record(30, 45000, "Cancer"),
            record(35, 48000, "Cancer"),
            record(31, 85000, "Cancer"),
        ]);
        let out = anonymizer.anonymize_bucket(&b).unwrap();

        assert_eq!(out.suppressed, 1);
        assert_eq!(out.records.len(), 2);
        for r in &out.records {
            assert_eq!(r.value_at(1), &Value::from("40000-49999"));
        }
    }

    #[test]
    fn tie_break_prefers_first_declared_attribute() {
        let schema = schema();
        let qi = vec!["age".to_string(), "zip_code".to_string()];
        let mut hierarchies = HashMap::new();
        hierarchies.insert(
            "age".to_string(),
            MapHierarchy::from_paths(&[&["30", "30-39"], &["35", "30-39"]]),
        );
        hierarchies.insert(
            "zip_code".to_string(),
            MapHierarchy::from_paths(&[&["45000", "40000-49999"], &["48000", "40000-49999"]]),
        );
        let generics = no_generics();
        // k = 3 with three distinct rows: every group is sub-k, so below_k
        // (3) > k is false... use k = 2 with four rows instead.
        let anonymizer = Anonymizer::new(&schema, &qi, 2, &hierarchies, &generics, false).unwrap();

        // Two distinct values for each attribute (a cardinality tie), and
        // 4 rows all in sub-k groups, so generalization must happen. The
        // first declared attribute (age) must be picked first; one round on
        // age merges everything into two groups of two.
        let b = bucket(vec![
            record(30, 45000, "Cancer"),
            record(35, 45000, "Cancer"),
            record(30, 48000, "Cancer"),
            record(35, 48000, "Cancer"),
        ]);
        let out = anonymizer.anonymize_bucket(&b).unwrap();

        assert_eq!(out.suppressed, 0);
        assert_eq!(out.records.len(), 4);
        for r in &out.records {
            // age generalized, zip untouched
            assert_eq!(r.value_at(0), &Value::from("30-39"));
            assert!(matches!(r.value_at(1), Value::Int(_)));
        }
    }

    #[test]
    fn malformed_hierarchy_aborts_the_bucket() {
        let schema = schema();
        let qi = vec!["zip_code".to_string()];
        let mut hierarchies = HashMap::new();
        hierarchies.insert(
            "zip_code".to_string(),
            MapHierarchy::from_paths(&[&["45000", "40000-49999"]]),
        );
        let generics = no_generics();
        let anonymizer = Anonymizer::new(&schema, &qi, 2, &hierarchies, &generics, false).unwrap();

        let b = bucket(vec![
            record(30, 45000, "Cancer"),
            record(35, 48000, "Cancer"),
            record(31, 49000, "Cancer"),
        ]);
        let err = anonymizer.anonymize_bucket(&b).unwrap_err();
        match err {
            AnonymizeError::ValueNotInHierarchy { attribute, value } => {
                assert_eq!(attribute, "zip_code");
                assert!(value == "48000" || value == "49000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_qi_is_structural() {
        let schema = schema();
        let qi = vec!["salary".to_string()];
        let hierarchies: HashMap<String, MapHierarchy> = HashMap::new();
        let generics = no_generics();
        let err = Anonymizer::new(&schema, &qi, 2, &hierarchies, &generics, false).unwrap_err();
        assert!(matches!(err, AnonymizeError::UnknownAttribute { .. }));
    }

    #[test]
    fn interactive_filter_drops_fully_generic_seeds() {
        let schema = schema();
        let qi = vec!["zip_code".to_string()];
        let mut hierarchies = HashMap::new();
        hierarchies.insert(
            "zip_code".to_string(),
            MapHierarchy::from_paths(&[
                &["45000", "*"],
                &["48000", "*"],
                &["85000", "*"],
                &["90000", "*"],
            ]),
        );
        let mut generics = HashMap::new();
        generics.insert("zip_code".to_string(), vec!["*".to_string()]);
        let anonymizer = Anonymizer::new(&schema, &qi, 2, &hierarchies, &generics, true).unwrap();

        // Four distinct zips force a round that sends everything to '*';
        // every seed then has only generic QI values and is filtered.
        let b = bucket(vec![
            record(30, 45000, "Cancer"),
            record(35, 48000, "Cancer"),
            record(31, 85000, "Cancer"),
            record(36, 90000, "Cancer"),
        ]);
        let out = anonymizer.anonymize_bucket(&b).unwrap();
        assert_eq!(out.filtered, 4);
        assert!(out.records.is_empty());
    }

    proptest! {
        // Termination and monotonicity: any mix of leaf values finishes the
        // loop (no panic, no hang) and never emits a sub-k group.
        #[test]
        fn loop_terminates_and_groups_reach_k(
            zips in proptest::collection::vec(prop_oneof![
                Just(45000i64), Just(48000), Just(85000), Just(90000)
            ], 1..24),
            k in 1usize..5,
        ) {
            let schema = schema();
            let qi = vec!["zip_code".to_string()];
            let mut hierarchies = HashMap::new();
            hierarchies.insert("zip_code".to_string(), zip_hierarchy());
            let generics = no_generics();
            let anonymizer =
                Anonymizer::new(&schema, &qi, k, &hierarchies, &generics, false).unwrap();

            let rows: Vec<Record> =
                zips.iter().map(|&z| record(30, z, "Cancer")).collect();
            let total = rows.len();
            let out = anonymizer.anonymize_bucket(&bucket(rows)).unwrap();

            prop_assert_eq!(out.records.len() + out.suppressed, total);

            // Every surviving QI tuple appears at least k times.
            let mut counts: HashMap<Value, usize> = HashMap::new();
            for r in &out.records {
                *counts.entry(r.value_at(1).clone()).or_default() += 1;
            }
            for (_, c) in counts {
                prop_assert!(c >= k);
            }
        }
    }
}
