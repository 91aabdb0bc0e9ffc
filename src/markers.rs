// markers.rs
//
// Marker identity, the reference marker index, and the target scan that selects
// the consistent marker set.

use log::{debug, info, warn};
use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    io::BufRead,
    path::Path,
    sync::Arc,
};

use crate::error::{ImpRefError, Result};
use crate::io::open_text;

/// First column holding per-sample genotype fields in a VCF data row.
pub const SAMPLE_COLUMN_OFFSET: usize = 9;

/// Identifies a marker by chromosome, position, reference allele and alternate allele.
///
/// Equality is exact on the text of all four fields, so `0100` and `100` are
/// different positions. No liftover and no REF/ALT swap reconciliation is
/// attempted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    pub chromosome: String,
    pub position: String,
    pub reference: String,
    pub alternate: String,
}

impl MarkerKey {
    pub fn new(
        chromosome: impl Into<String>,
        position: impl ToString,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position: position.to_string(),
            reference: reference.into(),
            alternate: alternate.into(),
        }
    }

    /// Builds a key from string fields. The position must be an unsigned
    /// integer but is kept as written.
    pub(crate) fn parse(
        chromosome: &str,
        position: &str,
        reference: &str,
        alternate: &str,
        path: &Path,
        line: usize,
    ) -> Result<Self> {
        position.parse::<u64>().map_err(|e| {
            ImpRefError::parse(path, line, format!("invalid position '{}': {}", position, e))
        })?;
        Ok(Self::new(chromosome, position, reference, alternate))
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }
}

/// One row of the reference marker listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceMarker {
    pub key: MarkerKey,
    /// Columns after chromosome/position/ref/alt, kept verbatim.
    pub metadata: Vec<String>,
}

/// Hash lookup from [`MarkerKey`] to reference marker record. Read-only once built.
#[derive(Debug, Default)]
pub struct MarkerIndex {
    records: HashMap<MarkerKey, ReferenceMarker>,
    duplicate_keys: usize,
}

impl MarkerIndex {
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Building marker index from {}", path.display());
        let reader = open_text(path)?;
        Self::from_reader(reader, path)
    }

    /// Parses whitespace-delimited `chrom pos ref alt [metadata...]` rows.
    ///
    /// A repeated key replaces the earlier record (last write wins) and is
    /// counted in [`MarkerIndex::duplicate_keys`].
    pub fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut index = MarkerIndex::default();
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
                    format!("expected at least 4 columns (chrom pos ref alt), found {}", fields.len()),
                ));
            }
            let key =
                MarkerKey::parse(fields[0], fields[1], fields[2], fields[3], path, line_idx + 1)?;
            index.insert(ReferenceMarker {
                key,
                metadata: fields[4..].iter().map(|s| s.to_string()).collect(),
            });
        }

        if index.duplicate_keys > 0 {
            warn!(
                "Reference marker listing {} repeats {} key(s); the last record for each was kept.",
                path.display(),
                index.duplicate_keys
            );
        }
        info!("Marker index holds {} reference markers.", index.len());
        Ok(index)
    }

    pub fn insert(&mut self, marker: ReferenceMarker) {
        if let Some(previous) = self.records.insert(marker.key.clone(), marker) {
            debug!("Duplicate reference marker {} replaced.", previous.key);
            self.duplicate_keys += 1;
        }
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&ReferenceMarker> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &MarkerKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicate_keys(&self) -> usize {
        self.duplicate_keys
    }
}

/// The consistent marker sequence. Its order is the column order of every
/// feature matrix built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerOrder {
    keys: Vec<MarkerKey>,
    columns: HashMap<MarkerKey, usize>,
}

impl MarkerOrder {
    pub fn from_keys(keys: Vec<MarkerKey>) -> Self {
        let mut columns = HashMap::with_capacity(keys.len());
        for (column, key) in keys.iter().enumerate() {
            columns.entry(key.clone()).or_insert(column);
        }
        Self { keys, columns }
    }

    pub fn keys(&self) -> &[MarkerKey] {
        &self.keys
    }

    pub fn column_of(&self, key: &MarkerKey) -> Option<usize> {
        self.columns.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A target marker that also exists in the reference index.
#[derive(Debug, Clone)]
pub struct ConsistentMarker {
    pub key: MarkerKey,
    /// Reference records sharing this key, one per target occurrence.
    pub reference_records: Vec<ReferenceMarker>,
    /// Raw per-sample genotype fields, in target sample order.
    pub genotype_tokens: Vec<String>,
    /// 1-based line of the target record the tokens came from.
    pub line: usize,
}

/// Counters reported after the target scan. Unmatched markers are never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub target_samples: usize,
    pub target_markers: usize,
    pub consistent_markers: usize,
    pub unmatched_markers: usize,
    pub duplicate_target_markers: usize,
}

/// Output of [`MarkerMatcher::scan`].
#[derive(Debug, Clone)]
pub struct TargetScan {
    pub sample_ids: Vec<String>,
    pub markers: Vec<ConsistentMarker>,
    pub order: Arc<MarkerOrder>,
    pub summary: MatchSummary,
}

/// Streams a target VCF and keeps the records whose key is in the [`MarkerIndex`].
pub struct MarkerMatcher<'a> {
    index: &'a MarkerIndex,
}

impl<'a> MarkerMatcher<'a> {
    pub fn new(index: &'a MarkerIndex) -> Self {
        Self { index }
    }

    pub fn scan_path(&self, path: &Path) -> Result<TargetScan> {
        info!("Scanning target file {}", path.display());
        let reader = open_text(path)?;
        self.scan(reader, path)
    }

    /// Single pass over tab-delimited VCF text. Consistent markers keep the
    /// order of their first match; a repeated target marker keeps the
    /// genotypes of its last occurrence.
    pub fn scan<R: BufRead>(&self, reader: R, path: &Path) -> Result<TargetScan> {
        let mut sample_ids: Option<Vec<String>> = None;
        let mut markers: Vec<ConsistentMarker> = Vec::new();
        let mut slot_of: HashMap<MarkerKey, usize> = HashMap::new();
        let mut summary = MatchSummary::default();

        for (line_idx, line) in reader.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = line.map_err(|e| ImpRefError::io(path, e))?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() || line.starts_with("##") {
                continue;
            }
            if line.starts_with('#') {
                let names: Vec<String> = line
                    .split('\t')
                    .skip(SAMPLE_COLUMN_OFFSET)
                    .map(str::to_string)
                    .collect();
                debug!("Target header at line {} declares {} samples.", line_no, names.len());
                sample_ids = Some(names);
                continue;
            }

            let samples = sample_ids.as_ref().ok_or_else(|| {
                ImpRefError::parse(path, line_no, "data record before the #CHROM header line")
            })?;
            summary.target_markers += 1;

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                return Err(ImpRefError::parse(
                    path,
                    line_no,
                    format!("expected at least 5 columns, found {}", fields.len()),
                ));
            }
            let key = MarkerKey::parse(fields[0], fields[1], fields[3], fields[4], path, line_no)?;
            let Some(reference) = self.index.get(&key) else {
                summary.unmatched_markers += 1;
                continue;
            };

            let expected_columns = SAMPLE_COLUMN_OFFSET + samples.len();
            if fields.len() != expected_columns {
                return Err(ImpRefError::parse(
                    path,
                    line_no,
                    format!(
                        "marker {} has {} columns but the header declares {} samples ({} columns)",
                        key,
                        fields.len(),
                        samples.len(),
                        expected_columns
                    ),
                ));
            }
            let genotype_tokens: Vec<String> = fields[SAMPLE_COLUMN_OFFSET..]
                .iter()
                .map(|s| s.to_string())
                .collect();

            match slot_of.entry(key) {
                Entry::Occupied(slot) => {
                    summary.duplicate_target_markers += 1;
                    warn!(
                        "Target marker {} repeated at line {}; keeping the later genotypes.",
                        slot.key(),
                        line_no
                    );
                    let marker = &mut markers[*slot.get()];
                    marker.reference_records.push(reference.clone());
                    marker.genotype_tokens = genotype_tokens;
                    marker.line = line_no;
                }
                Entry::Vacant(slot) => {
                    markers.push(ConsistentMarker {
                        key: slot.key().clone(),
                        reference_records: vec![reference.clone()],
                        genotype_tokens,
                        line: line_no,
                    });
                    slot.insert(markers.len() - 1);
                }
            }
        }

        let sample_ids = sample_ids.ok_or_else(|| ImpRefError::EmptyInput {
            what: "target #CHROM header line",
        })?;
        summary.target_samples = sample_ids.len();
        summary.consistent_markers = markers.len();

        let order = Arc::new(MarkerOrder::from_keys(
            markers.iter().map(|m| m.key.clone()).collect(),
        ));

        info!("Study samples: {}", summary.target_samples);
        info!("Study markers: {}", summary.target_markers);
        info!("Consistent markers: {}", summary.consistent_markers);
        if summary.unmatched_markers > 0 {
            info!(
                "{} target marker(s) had no reference counterpart and were dropped.",
                summary.unmatched_markers
            );
        }

        Ok(TargetScan {
            sample_ids,
            markers,
            order,
            summary,
        })
    }
}
