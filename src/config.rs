// config.rs

use log::debug;
use std::{
    io,
    path::{Path, PathBuf},
};

use crate::classifier::LogisticConfig;
use crate::error::{ImpRefError, Result};

/// File names looked up inside a reference panel directory. For each role the
/// first candidate that exists is used.
#[derive(Debug, Clone)]
pub struct PanelLayout {
    pub marker_listing: Vec<String>,
    pub reference_matrix: Vec<String>,
    pub labels: Vec<String>,
    pub populations: Vec<String>,
}

impl Default for PanelLayout {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            marker_listing: names(&["SNP.INFO.bz2", "SNP.INFO.gz", "SNP.INFO"]),
            reference_matrix: names(&[
                "chr1-18.pos_snp_sample.matrix",
                "chr1-18.pos_snp_sample.matrix.gz",
            ]),
            labels: names(&["ref_class.txt"]),
            populations: names(&["populations.txt"]),
        }
    }
}

/// Concrete paths of one reference panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelFiles {
    pub marker_listing: PathBuf,
    pub reference_matrix: PathBuf,
    pub labels: PathBuf,
    pub populations: Option<PathBuf>,
}

impl PanelLayout {
    pub fn resolve(&self, dir: &Path) -> Result<PanelFiles> {
        if !dir.is_dir() {
            return Err(ImpRefError::io(
                dir,
                io::Error::new(io::ErrorKind::NotFound, "reference panel directory not found"),
            ));
        }
        let files = PanelFiles {
            marker_listing: require(dir, &self.marker_listing, "marker listing")?,
            reference_matrix: require(dir, &self.reference_matrix, "reference matrix")?,
            labels: require(dir, &self.labels, "class label file")?,
            populations: first_existing(dir, &self.populations),
        };
        debug!("Resolved reference panel files: {:?}", files);
        Ok(files)
    }
}

fn first_existing(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn require(dir: &Path, candidates: &[String], role: &str) -> Result<PathBuf> {
    first_existing(dir, candidates).ok_or_else(|| {
        let tried = candidates.join(", ");
        ImpRefError::io(
            dir.join(candidates.first().map(String::as_str).unwrap_or_default()),
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} found (tried: {})", role, tried),
            ),
        )
    })
}

/// Settings of the balance/split/fit stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Share of the balanced reference panel held out for evaluation.
    pub test_fraction: f64,
    /// Seed of the train/test split; drawn at random when `None`.
    pub split_seed: Option<u64>,
    pub balance_seed: u64,
    pub logistic: LogisticConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            split_seed: None,
            balance_seed: 0,
            logistic: LogisticConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ImpRefError::InvalidConfig(format!(
                "test fraction must lie strictly between 0 and 1, got {}",
                self.test_fraction
            )));
        }
        self.logistic.validate()
    }
}
