//! Path-condition extraction and bucketing.
//!
//! Stage one of the pipeline: run the subject program over every record,
//! canonicalize the predicates it reports, and group records by identical
//! path condition. Buckets smaller than `k` can never support k-anonymity
//! for their path and are discarded here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{DomainError, StringDomains};
use crate::types::{PathCondition, Predicate, Record, RecordView, Schema};

/// A deterministic, total, side-effect-free oracle reporting the decision
/// path the branching program takes for one record.
///
/// Implementations are injected into the pipeline at construction time.
/// Closures with the matching signature implement the trait directly.
pub trait SubjectProgram: Send + Sync {
    /// The ordered sequence of branch predicates satisfied by `row`.
    fn exec_pc(&self, row: &RecordView<'_>) -> Vec<Predicate>;
}

impl<F> SubjectProgram for F
where
    F: Fn(&RecordView<'_>) -> Vec<Predicate> + Send + Sync,
{
    fn exec_pc(&self, row: &RecordView<'_>) -> Vec<Predicate> {
        self(row)
    }
}

/// Registry resolving subject programs by name.
///
/// Programs are ordinary values registered under a name rather than code
/// loaded from a runtime path, so the set of oracles a binary can run is
/// fixed at compile time.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: HashMap<String, Arc<dyn SubjectProgram>>,
}

impl ProgramRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in oracles.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("medical-db", Arc::new(programs::medical_records));
        registry.register("heart", Arc::new(programs::heart_disease));
        registry
    }

    /// Register a program under a name, replacing any previous entry.
    pub fn register(&mut self, name: &str, program: Arc<dyn SubjectProgram>) {
        self.programs.insert(name.to_string(), program);
    }

    /// Resolve a program by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn SubjectProgram>> {
        self.programs.get(name).cloned()
    }

    /// Registered program names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The records sharing one path condition.
#[derive(Debug, Clone)]
pub struct Bucket {
    /// The shared path condition.
    pub condition: PathCondition,
    /// Member records, in input order.
    pub rows: Vec<Record>,
}

/// Counters reported by the bucketing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Records handed to the subject program.
    pub records_read: usize,
    /// Records dropped because their path condition was empty.
    pub empty_paths: usize,
    /// Buckets discarded for having fewer than `k` members.
    pub dropped_buckets: usize,
    /// Records lost inside discarded buckets.
    pub dropped_rows: usize,
}

/// Run the subject program over every record and group by canonical path
/// condition, discarding sub-`k` buckets.
///
/// Bucket order is the order in which each path condition was first observed.
pub fn bucketize(
    records: &[Record],
    schema: &Schema,
    domains: &StringDomains,
    program: &dyn SubjectProgram,
    k: usize,
) -> Result<(Vec<Bucket>, BucketStats), DomainError> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<PathCondition, usize> = HashMap::new();
    let mut stats = BucketStats::default();

    for record in records {
        stats.records_read += 1;
        let view = RecordView::new(schema, record);
        let mut atoms = Vec::new();
        for atom in program.exec_pc(&view) {
            let value = domains.canonical(&atom.attribute, &atom.value)?;
            atoms.push(Predicate {
                attribute: atom.attribute,
                op: atom.op,
                value,
            });
        }
        let condition = PathCondition::new(atoms);

        if condition.is_empty() {
            debug!("record yielded an empty path condition, dropping it");
            stats.empty_paths += 1;
            continue;
        }

        match index.get(&condition) {
            Some(&slot) => buckets[slot].rows.push(record.clone()),
            None => {
                index.insert(condition.clone(), buckets.len());
                buckets.push(Bucket {
                    condition,
                    rows: vec![record.clone()],
                });
            }
        }
    }

    // A bucket below k can never satisfy the anonymity requirement for its
    // path, whatever the anonymizer does later.
    buckets.retain(|bucket| {
        if bucket.rows.len() < k {
            warn!(
                path = %bucket.condition,
                size = bucket.rows.len(),
                k,
                "unsatisfiable case: bucket smaller than k, dropping it"
            );
            stats.dropped_buckets += 1;
            stats.dropped_rows += bucket.rows.len();
            false
        } else {
            true
        }
    });

    Ok((buckets, stats))
}

/// Built-in subject programs.
pub mod programs {
    use crate::types::{CmpOp, Predicate, RecordView};

    /// Decision paths over a medical records table with `age`, `zip_code`
    /// and `disease` attributes.
    pub fn medical_records(row: &RecordView<'_>) -> Vec<Predicate> {
        let mut pc = Vec::new();
        let (Some(age), Some(zip), Some(disease)) = (
            row.num("age"),
            row.num("zip_code"),
            row.text("disease"),
        ) else {
            return pc;
        };

        if age < 40.0 {
            pc.push(Predicate::new("age", CmpOp::Lt, 40));
            if zip < 50000.0 {
                pc.push(Predicate::new("zip_code", CmpOp::Lt, 50000));
                if disease == "Cancer" {
                    pc.push(Predicate::new("disease", CmpOp::Eq, "Cancer"));
                } else {
                    pc.push(Predicate::new("disease", CmpOp::Ne, "Cancer"));
                }
            } else if zip >= 70000.0 {
                pc.push(Predicate::new("zip_code", CmpOp::Ge, 70000));
                if disease == "Anorexia" {
                    pc.push(Predicate::new("disease", CmpOp::Eq, "Anorexia"));
                } else {
                    pc.push(Predicate::new("disease", CmpOp::Ne, "Anorexia"));
                }
            } else {
                pc.push(Predicate::new("zip_code", CmpOp::Ge, 50000));
                pc.push(Predicate::new("zip_code", CmpOp::Lt, 70000));
                if disease == "AIDS" {
                    pc.push(Predicate::new("disease", CmpOp::Eq, "AIDS"));
                } else {
                    pc.push(Predicate::new("disease", CmpOp::Ne, "AIDS"));
                }
            }
        } else {
            pc.push(Predicate::new("age", CmpOp::Ge, 40));
            if zip < 40000.0 {
                pc.push(Predicate::new("zip_code", CmpOp::Lt, 40000));
                if disease == "Heart disease" {
                    pc.push(Predicate::new("disease", CmpOp::Eq, "Heart disease"));
                } else {
                    pc.push(Predicate::new("disease", CmpOp::Ne, "Heart disease"));
                }
            } else if zip >= 80000.0 {
                pc.push(Predicate::new("zip_code", CmpOp::Gt, 80000));
                if disease == "Alzheimer's disease" {
                    pc.push(Predicate::new("disease", CmpOp::Eq, "Alzheimer's disease"));
                } else {
                    pc.push(Predicate::new("disease", CmpOp::Ne, "Alzheimer's disease"));
                }
            } else {
                pc.push(Predicate::new("zip_code", CmpOp::Ge, 40000));
                pc.push(Predicate::new("zip_code", CmpOp::Le, 80000));
                if disease == "Autism" {
                    pc.push(Predicate::new("disease", CmpOp::Eq, "Autism"));
                } else {
                    pc.push(Predicate::new("disease", CmpOp::Ne, "Autism"));
                }
            }
        }

        pc
    }

    /// Decision paths over the UCI heart-disease table.
    pub fn heart_disease(row: &RecordView<'_>) -> Vec<Predicate> {
        let mut pc = Vec::new();
        let (Some(age), Some(cp), Some(thalach)) =
            (row.num("age"), row.num("cp"), row.num("thalach"))
        else {
            return pc;
        };
        let (Some(sex), Some(fbs), Some(chol), Some(exang)) = (
            row.num("sex"),
            row.num("fbs"),
            row.num("chol"),
            row.num("exang"),
        ) else {
            return pc;
        };
        let (Some(target), Some(ca)) = (row.num("target"), row.num("ca")) else {
            return pc;
        };

        if age < 40.0 {
            pc.push(Predicate::new("age", CmpOp::Lt, 40));
            if cp <= 1.0 {
                pc.push(Predicate::new("cp", CmpOp::Le, 1));
                if thalach < 120.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Lt, 120));
                } else if thalach >= 165.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Ge, 165));
                } else {
                    pc.push(Predicate::new("thalach", CmpOp::Ge, 120));
                    pc.push(Predicate::new("thalach", CmpOp::Lt, 165));
                }
            } else {
                pc.push(Predicate::new("cp", CmpOp::Gt, 1));
                if thalach < 110.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Lt, 110));
                } else if thalach > 155.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Gt, 155));
                } else {
                    pc.push(Predicate::new("thalach", CmpOp::Ge, 110));
                    pc.push(Predicate::new("thalach", CmpOp::Le, 155));
                }
            }
        } else {
            pc.push(Predicate::new("age", CmpOp::Ge, 40));
            if cp <= 2.0 {
                pc.push(Predicate::new("cp", CmpOp::Le, 2));
                if thalach <= 100.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Le, 100));
                } else if thalach >= 140.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Ge, 140));
                } else {
                    pc.push(Predicate::new("thalach", CmpOp::Gt, 100));
                    pc.push(Predicate::new("thalach", CmpOp::Lt, 140));
                }
            } else {
                pc.push(Predicate::new("cp", CmpOp::Gt, 2));
                if thalach < 120.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Lt, 120));
                } else if thalach > 160.0 {
                    pc.push(Predicate::new("thalach", CmpOp::Ge, 160));
                } else {
                    pc.push(Predicate::new("thalach", CmpOp::Ge, 120));
                    pc.push(Predicate::new("thalach", CmpOp::Lt, 160));
                }
            }
        }

        let sex_lit = if sex == 0.0 { 0 } else { 1 };
        pc.push(Predicate::new("sex", CmpOp::Eq, sex_lit));
        let fbs_lit = if fbs == 0.0 { 0 } else { 1 };
        pc.push(Predicate::new("fbs", CmpOp::Eq, fbs_lit));
        // Cholesterol cut points depend on the sex/fbs branch taken.
        let (low, high, low_strict, high_strict) = match (sex_lit, fbs_lit) {
            (0, 0) => (220, 300, false, false),
            (0, 1) => (250, 295, true, false),
            (1, 0) => (225, 280, true, true),
            _ => (245, 305, true, true),
        };
        if (low_strict && chol <= low as f64) || (!low_strict && chol < low as f64) {
            pc.push(Predicate::new(
                "chol",
                if low_strict { CmpOp::Le } else { CmpOp::Lt },
                low,
            ));
        } else if (high_strict && chol > high as f64) || (!high_strict && chol >= high as f64) {
            pc.push(Predicate::new(
                "chol",
                if high_strict { CmpOp::Gt } else { CmpOp::Ge },
                high,
            ));
        } else {
            pc.push(Predicate::new(
                "chol",
                if low_strict { CmpOp::Gt } else { CmpOp::Ge },
                low,
            ));
            pc.push(Predicate::new(
                "chol",
                if high_strict { CmpOp::Le } else { CmpOp::Lt },
                high,
            ));
        }
        pc.push(Predicate::new(
            "exang",
            CmpOp::Eq,
            if exang == 0.0 { 0 } else { 1 },
        ));

        pc.push(Predicate::new(
            "target",
            CmpOp::Eq,
            if target == 0.0 { 0 } else { 1 },
        ));
        let ca_lit = match ca as i64 {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 3,
        };
        pc.push(Predicate::new("ca", CmpOp::Eq, ca_lit));

        pc
    }
}
