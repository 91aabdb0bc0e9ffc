// matrix.rs
//
// Per-marker encoded genotype rows, transposed into sample x marker feature
// matrices whose columns follow one shared `MarkerOrder`.

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use std::{collections::HashMap, io::BufRead, path::Path, sync::Arc};

use crate::encoding::GenotypeEncoder;
use crate::error::{ImpRefError, Result};
use crate::io::open_text;
use crate::markers::{MarkerKey, MarkerOrder, TargetScan};

/// Encoded genotypes stored marker-major: one row per marker, one value per sample.
pub type EncodedRows = HashMap<MarkerKey, Vec<f64>>;

/// Samples x markers, with the marker order the columns follow.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub values: Array2<f64>,
    pub sample_ids: Vec<String>,
    pub order: Arc<MarkerOrder>,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_markers(&self) -> usize {
        self.values.ncols()
    }
}

/// Reference and target matrices over the same consistent markers.
#[derive(Debug, Clone)]
pub struct FeatureMatrices {
    pub reference: FeatureMatrix,
    pub labels: Vec<usize>,
    pub target: FeatureMatrix,
}

impl FeatureMatrices {
    /// Fails unless both matrices have the same columns in the same order and
    /// every reference sample has a label.
    pub fn ensure_aligned(&self) -> Result<()> {
        if self.reference.n_markers() != self.target.n_markers() {
            return Err(ImpRefError::dimension(
                "matrix alignment (column count)",
                self.reference.n_markers(),
                self.target.n_markers(),
            ));
        }
        if !Arc::ptr_eq(&self.reference.order, &self.target.order) {
            let differing = self
                .reference
                .order
                .keys()
                .iter()
                .zip(self.target.order.keys())
                .enumerate()
                .find(|(_, (a, b))| a != b);
            if let Some((column, (reference, target))) = differing {
                return Err(ImpRefError::MarkerOrderMismatch {
                    column,
                    reference: reference.clone(),
                    target: target.clone(),
                });
            }
        }
        if self.labels.len() != self.reference.n_samples() {
            return Err(ImpRefError::dimension(
                "reference labels",
                self.reference.n_samples(),
                self.labels.len(),
            ));
        }
        Ok(())
    }
}

/// Assembles feature matrices column-by-column from a single [`MarkerOrder`].
pub struct MatrixBuilder {
    order: Arc<MarkerOrder>,
}

impl MatrixBuilder {
    pub fn new(order: Arc<MarkerOrder>) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &Arc<MarkerOrder> {
        &self.order
    }

    /// Encodes the genotype tokens captured by the target scan, one row per marker.
    pub fn encode_target(&self, scan: &TargetScan, encoder: &GenotypeEncoder) -> Result<EncodedRows> {
        let encoded: Vec<(MarkerKey, Vec<f64>)> = scan
            .markers
            .par_iter()
            .map(|marker| {
                encoder
                    .encode_marker(&marker.key, &marker.genotype_tokens)
                    .map(|row| (marker.key.clone(), row))
            })
            .collect::<Result<_>>()?;
        debug!("Encoded {} target markers.", encoded.len());
        Ok(encoded.into_iter().collect())
    }

    pub fn read_reference_rows_from_path(
        &self,
        path: &Path,
        encoder: &GenotypeEncoder,
        n_samples: usize,
    ) -> Result<EncodedRows> {
        info!("Reading reference genotype matrix from {}", path.display());
        let reader = open_text(path)?;
        self.read_reference_rows(reader, path, encoder, n_samples)
    }

    /// Reads `chrom pos ref alt v1..vN` rows, keeping only consistent markers.
    pub fn read_reference_rows<R: BufRead>(
        &self,
        reader: R,
        path: &Path,
        encoder: &GenotypeEncoder,
        n_samples: usize,
    ) -> Result<EncodedRows> {
        let mut rows = EncodedRows::with_capacity(self.order.len());
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ImpRefError::io(path, e))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < 4 {
                return Err(ImpRefError::parse(
                    path,
                    line_idx + 1,
                    format!("expected at least 4 columns, found {}", fields.len()),
                ));
            }
            let key =
                MarkerKey::parse(fields[0], fields[1], fields[2], fields[3], path, line_idx + 1)?;
            if self.order.column_of(&key).is_none() {
                continue;
            }
            let tokens = &fields[4..];
            if tokens.len() != n_samples {
                return Err(ImpRefError::parse(
                    path,
                    line_idx + 1,
                    format!(
                        "marker {} has {} sample values but {} reference labels were given",
                        key,
                        tokens.len(),
                        n_samples
                    ),
                ));
            }
            let row = encoder.encode_reference_row(&key, tokens)?;
            rows.insert(key, row);
        }
        debug!(
            "Reference matrix supplied {} of {} consistent markers.",
            rows.len(),
            self.order.len()
        );
        Ok(rows)
    }

    /// Transposes marker-major rows into a samples x markers matrix.
    ///
    /// Every key of the order must be present in `rows`; `source_name` names
    /// the dataset in the resulting error.
    pub fn build(
        &self,
        rows: &EncodedRows,
        sample_ids: Vec<String>,
        source_name: &'static str,
    ) -> Result<FeatureMatrix> {
        let n_markers = self.order.len();
        let n_samples = sample_ids.len();
        if n_markers == 0 {
            return Err(ImpRefError::EmptyInput {
                what: "consistent markers",
            });
        }
        if n_samples == 0 {
            return Err(ImpRefError::EmptyInput { what: "samples" });
        }

        let mut values = Array2::<f64>::zeros((n_samples, n_markers));
        for (column, key) in self.order.keys().iter().enumerate() {
            let row = rows.get(key).ok_or_else(|| ImpRefError::MissingMarker {
                key: key.clone(),
                source_name,
            })?;
            if row.len() != n_samples {
                return Err(ImpRefError::dimension(source_name, n_samples, row.len()));
            }
            for (sample, value) in row.iter().enumerate() {
                values[[sample, column]] = *value;
            }
        }

        Ok(FeatureMatrix {
            values,
            sample_ids,
            order: Arc::clone(&self.order),
        })
    }
}
