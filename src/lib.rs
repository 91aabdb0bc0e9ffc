//! Assigns genotyped samples to reference breeds/populations.
//!
//! Target markers are matched against a reference panel on exact
//! `chromosome:position:ref:alt` keys, genotypes are encoded with a fixed
//! allele weight table, and a multinomial classifier trained on the panel
//! scores every target sample.

pub mod classifier;
pub mod config;
pub mod encoding;
pub mod error;
pub mod io;
pub mod markers;
pub mod matrix;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod run;

pub use classifier::{Classifier, LogisticConfig, MultinomialLogisticRegression};
pub use config::{PanelFiles, PanelLayout, PipelineConfig};
pub use encoding::{AlleleWeights, GenotypeEncoder};
pub use error::{ImpRefError, Result};
pub use markers::{MarkerIndex, MarkerKey, MarkerMatcher, MarkerOrder, MatchSummary, TargetScan};
pub use matrix::{FeatureMatrices, FeatureMatrix, MatrixBuilder};
pub use metrics::{ConfusionMatrix, Evaluation};
pub use pipeline::{ClassifierPipeline, Predictions};
pub use report::{write_outputs, AssignmentReport, PopulationTaxonomy, ResultFormatter};
pub use run::{assign_populations, RunOutcome};
