//! Run configuration and three-stage orchestration.
//!
//! Wires the bucketer, the anonymizer and the constraint synthesis into one
//! sequential run: raw records → buckets → (optionally) anonymized seeds →
//! constraint sets → release records. Only structural and configuration
//! errors abort a run; per-record and per-bucket failures are logged,
//! counted in the [`RunReport`] and degrade the release set size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::anonymizer::{AnonymizeError, Anonymizer};
use crate::bucketer::{bucketize, Bucket, SubjectProgram};
use crate::dataset::{write_release, Dataset, DatasetError};
use crate::domain::DomainError;
use crate::hierarchy::{CsvDgh, HierarchyError};
use crate::synth::builder::{self, BuildError, ConfigOption};
use crate::synth::solver::{ReleaseSynthesizer, SolveError};
use crate::synth::spec::{ConstraintSpec, SpecError};
use crate::types::Record;

/// Configuration error: the run arguments are mutually inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// k must be at least 1.
    #[error("k must be at least 1, got {0}")]
    InvalidK(usize),
    /// Tuple fields are only meaningful under P-T.
    #[error("tuple fields must only be set with the P-T configuration")]
    TupleFieldsOnlyWithPt,
    /// I-T needs anonymized seeds.
    #[error("the I-T configuration requires anonymization")]
    InteractiveNeedsAnonymization,
    /// Anonymization needs quasi-identifiers to generalize.
    #[error("anonymization requires a quasi-identifier list")]
    AnonymizationNeedsQuasiIdentifiers,
    /// Quasi-identifiers are only consumed by the anonymizer.
    #[error("a quasi-identifier list must only be set with anonymization")]
    QuasiIdentifiersNeedAnonymization,
    /// Anonymization needs one hierarchy per quasi-identifier.
    #[error("anonymization requires domain generalization hierarchies")]
    AnonymizationNeedsHierarchies,
    /// Hierarchies are only consumed by the anonymizer.
    #[error("hierarchies must only be set with anonymization")]
    HierarchiesNeedAnonymization,
    /// Quasi-identifier and hierarchy lists must pair up.
    #[error("expected {expected} hierarchies (one per quasi-identifier), got {got}")]
    HierarchyCountMismatch {
        /// Number of quasi-identifiers.
        expected: usize,
        /// Number of hierarchies supplied.
        got: usize,
    },
    /// A tuple field is not part of the dataset header.
    #[error("tuple field '{attribute}' does not exist in the dataset header")]
    UnknownTupleField {
        /// The undeclared field.
        attribute: String,
    },
}

/// Any error that aborts a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Inconsistent run arguments.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Dataset IO failure.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// Hierarchy file failure.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    /// Constraint spec failure.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Structural anonymizer failure (unknown QI, missing hierarchy).
    #[error(transparent)]
    Anonymize(#[from] AnonymizeError),
    /// Constraint derivation failure.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Solver encoding/decoding failure.
    #[error(transparent)]
    Solve(#[from] SolveError),
    /// Value-domain translation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Arguments of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Anonymity level; every released QI combination appears ≥ k times.
    pub k: usize,
    /// Anti-duplication policy.
    pub option: ConfigOption,
    /// Whether stage two runs at all. When false, raw bucket rows feed
    /// straight into constraint generation.
    pub anonymize: bool,
    /// Quasi-identifier attributes, in declaration order. Empty when not
    /// anonymizing.
    pub quasi_identifiers: Vec<String>,
    /// Hierarchy file per quasi-identifier, same order.
    pub hierarchy_paths: Vec<PathBuf>,
    /// Field subset for P-T.
    pub tuple_fields: Option<Vec<String>>,
}

impl RunConfig {
    /// Check the mutual-consistency rules of the run arguments.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k < 1 {
            return Err(ConfigError::InvalidK(self.k));
        }
        if self.tuple_fields.is_some() && self.option != ConfigOption::NoTupleRepeat {
            return Err(ConfigError::TupleFieldsOnlyWithPt);
        }
        if self.option == ConfigOption::Interactive && !self.anonymize {
            return Err(ConfigError::InteractiveNeedsAnonymization);
        }
        if self.anonymize && self.quasi_identifiers.is_empty() {
            return Err(ConfigError::AnonymizationNeedsQuasiIdentifiers);
        }
        if !self.anonymize && !self.quasi_identifiers.is_empty() {
            return Err(ConfigError::QuasiIdentifiersNeedAnonymization);
        }
        if self.anonymize && self.hierarchy_paths.is_empty() {
            return Err(ConfigError::AnonymizationNeedsHierarchies);
        }
        if !self.anonymize && !self.hierarchy_paths.is_empty() {
            return Err(ConfigError::HierarchiesNeedAnonymization);
        }
        if self.anonymize && self.hierarchy_paths.len() != self.quasi_identifiers.len() {
            return Err(ConfigError::HierarchyCountMismatch {
                expected: self.quasi_identifiers.len(),
                got: self.hierarchy_paths.len(),
            });
        }
        Ok(())
    }
}

/// Counters of one run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunReport {
    /// Records read from the input dataset.
    pub records_read: usize,
    /// Records dropped for an empty path condition.
    pub empty_paths: usize,
    /// Buckets that passed the size filter.
    pub buckets: usize,
    /// Buckets dropped for having fewer than k members.
    pub buckets_dropped: usize,
    /// Buckets aborted by a malformed hierarchy.
    pub buckets_aborted: usize,
    /// Rows suppressed by the anonymizer.
    pub rows_suppressed: usize,
    /// Seeds discarded by the I-T filter.
    pub seeds_filtered: usize,
    /// Seeds handed to constraint generation.
    pub seeds: usize,
    /// Seeds the solver could not satisfy even after the retry.
    pub solver_misses: usize,
    /// Release records produced.
    pub released: usize,
}

/// The three-stage kb-anonymity pipeline.
pub struct Pipeline {
    config: RunConfig,
    program: Arc<dyn SubjectProgram>,
}

impl Pipeline {
    /// Build a pipeline, validating the run configuration.
    pub fn new(config: RunConfig, program: Arc<dyn SubjectProgram>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, program })
    }

    /// Run end to end over files: read the dataset and collaborator files,
    /// execute the three stages, write the release dataset.
    pub fn run(
        &self,
        input: &Path,
        constraints: &Path,
        output: &Path,
    ) -> Result<RunReport, PipelineError> {
        let dataset = Dataset::from_path(input)?;
        let mut hierarchies = HashMap::new();
        for (name, path) in self
            .config
            .quasi_identifiers
            .iter()
            .zip(&self.config.hierarchy_paths)
        {
            hierarchies.insert(name.clone(), CsvDgh::from_path(path)?);
        }
        let spec = ConstraintSpec::from_path(constraints, &dataset.schema)?;

        let (records, report) = self.execute(&dataset, &hierarchies, &spec)?;
        write_release(output, &dataset.schema, &records)?;
        Ok(report)
    }

    /// Execute the three stages over an in-memory dataset.
    pub fn execute(
        &self,
        dataset: &Dataset,
        hierarchies: &HashMap<String, CsvDgh>,
        spec: &ConstraintSpec,
    ) -> Result<(Vec<Record>, RunReport), PipelineError> {
        let mut report = RunReport::default();

        if let Some(fields) = &self.config.tuple_fields {
            for field in fields {
                if !dataset.schema.contains(field) {
                    return Err(ConfigError::UnknownTupleField {
                        attribute: field.clone(),
                    }
                    .into());
                }
            }
        }

        let generic_values: HashMap<String, Vec<String>> = hierarchies
            .iter()
            .map(|(name, dgh)| (name.clone(), dgh.generic_values().to_vec()))
            .collect();

        info!("starting program execution stage");
        let (buckets, stats) = bucketize(
            &dataset.records,
            &dataset.schema,
            &dataset.domains,
            self.program.as_ref(),
            self.config.k,
        )?;
        report.records_read = stats.records_read;
        report.empty_paths = stats.empty_paths;
        report.buckets = buckets.len();
        report.buckets_dropped = stats.dropped_buckets;

        let seeds = if self.config.anonymize {
            info!("starting k-anonymization stage");
            self.anonymize_buckets(dataset, &buckets, hierarchies, &generic_values, &mut report)?
        } else {
            buckets
                .iter()
                .enumerate()
                .flat_map(|(b, bucket)| bucket.rows.iter().cloned().map(move |r| (r, b)))
                .collect()
        };
        report.seeds = seeds.len();

        info!("starting constraint generation stage");
        let mut synthesizer = ReleaseSynthesizer::new(&dataset.schema, &dataset.domains, spec);
        let mut released = Vec::new();
        let mut previous_bucket: Option<usize> = None;
        for (seed, bucket_idx) in seeds {
            let bucket = &buckets[bucket_idx];
            let mut constraints = builder::build(
                self.config.option,
                &bucket.rows,
                &seed,
                &dataset.schema,
                &dataset.domains,
                &generic_values,
                self.config.tuple_fields.as_deref(),
            )?;
            constraints.extend(bucket.condition.atoms().iter().cloned());

            let path_changed = previous_bucket != Some(bucket_idx);
            previous_bucket = Some(bucket_idx);
            match synthesizer.synthesize(&constraints, path_changed)? {
                Some(record) => released.push(record),
                None => {
                    warn!(path = %bucket.condition, "no release record satisfies the constraints");
                    report.solver_misses += 1;
                }
            }
        }
        report.released = released.len();

        info!(
            released = report.released,
            seeds = report.seeds,
            suppressed = report.rows_suppressed,
            "run finished"
        );
        Ok((released, report))
    }

    // Stage two over every bucket; a malformed hierarchy aborts only the
    // bucket that hit it.
    fn anonymize_buckets(
        &self,
        dataset: &Dataset,
        buckets: &[Bucket],
        hierarchies: &HashMap<String, CsvDgh>,
        generic_values: &HashMap<String, Vec<String>>,
        report: &mut RunReport,
    ) -> Result<Vec<(Record, usize)>, PipelineError> {
        let anonymizer = Anonymizer::new(
            &dataset.schema,
            &self.config.quasi_identifiers,
            self.config.k,
            hierarchies,
            generic_values,
            self.config.option == ConfigOption::Interactive,
        )?;

        let mut seeds = Vec::new();
        for (b, bucket) in buckets.iter().enumerate() {
            match anonymizer.anonymize_bucket(bucket) {
                Ok(out) => {
                    report.rows_suppressed += out.suppressed;
                    report.seeds_filtered += out.filtered;
                    seeds.extend(out.records.into_iter().map(|r| (r, b)));
                }
                Err(err @ AnonymizeError::ValueNotInHierarchy { .. }) => {
                    warn!(path = %bucket.condition, error = %err, "aborting bucket anonymization");
                    report.buckets_aborted += 1;
                }
                Err(structural) => return Err(structural.into()),
            }
        }
        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucketer::programs;

    fn base_config() -> RunConfig {
        RunConfig {
            k: 2,
            option: ConfigOption::NoFieldRepeat,
            anonymize: false,
            quasi_identifiers: Vec::new(),
            hierarchy_paths: Vec::new(),
            tuple_fields: None,
        }
    }

    #[test]
    fn valid_raw_pass_through_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn k_zero_is_rejected() {
        let mut c = base_config();
        c.k = 0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidK(0))));
    }

    #[test]
    fn tuple_fields_require_pt() {
        let mut c = base_config();
        c.tuple_fields = Some(vec!["age".to_string()]);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::TupleFieldsOnlyWithPt)
        ));
        c.option = ConfigOption::NoTupleRepeat;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn interactive_requires_anonymization() {
        let mut c = base_config();
        c.option = ConfigOption::Interactive;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InteractiveNeedsAnonymization)
        ));
    }

    #[test]
    fn anonymization_argument_pairing() {
        let mut c = base_config();
        c.anonymize = true;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::AnonymizationNeedsQuasiIdentifiers)
        ));

        c.quasi_identifiers = vec!["zip_code".to_string()];
        assert!(matches!(
            c.validate(),
            Err(ConfigError::AnonymizationNeedsHierarchies)
        ));

        c.hierarchy_paths = vec![PathBuf::from("zip.csv"), PathBuf::from("age.csv")];
        assert!(matches!(
            c.validate(),
            Err(ConfigError::HierarchyCountMismatch {
                expected: 1,
                got: 2
            })
        ));

        c.hierarchy_paths.pop();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn quasi_identifiers_without_anonymization_are_rejected() {
        let mut c = base_config();
        c.quasi_identifiers = vec!["zip_code".to_string()];
        assert!(matches!(
            c.validate(),
            Err(ConfigError::QuasiIdentifiersNeedAnonymization)
        ));
    }

    #[test]
    fn unknown_tuple_field_is_fatal_before_any_synthesis() {
        let mut c = base_config();
        c.option = ConfigOption::NoTupleRepeat;
        c.tuple_fields = Some(vec!["salary".to_string()]);
        let pipeline = Pipeline::new(c, Arc::new(programs::medical_records)).unwrap();

        let dataset = Dataset::from_reader(
            "age,zip_code,disease\n30,45000,Cancer\n35,48000,Cancer\n".as_bytes(),
            "test",
        )
        .unwrap();
        let spec = ConstraintSpec::from_str("age >= 1 <= 99\n", &dataset.schema).unwrap();
        let err = pipeline
            .execute(&dataset, &HashMap::new(), &spec)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownTupleField { .. })
        ));
    }
}
