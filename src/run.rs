// run.rs
//
// End-to-end assignment of target samples against one reference panel. Nothing
// is written to disk here; the caller persists `RunOutcome` once it is complete.

use indicatif::ProgressBar;
use log::info;
use std::{path::Path, sync::Arc, time::Instant};

use crate::classifier::MultinomialLogisticRegression;
use crate::config::{PanelFiles, PipelineConfig};
use crate::encoding::GenotypeEncoder;
use crate::error::{ImpRefError, Result};
use crate::io::read_labels;
use crate::markers::{MarkerIndex, MarkerMatcher, MatchSummary};
use crate::matrix::{FeatureMatrices, MatrixBuilder};
use crate::metrics::Evaluation;
use crate::pipeline::ClassifierPipeline;
use crate::report::{AssignmentReport, PopulationTaxonomy, ResultFormatter};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: MatchSummary,
    pub split_seed: u64,
    pub evaluation: Evaluation,
    pub report: AssignmentReport,
    pub model: MultinomialLogisticRegression,
}

/// Index -> scan -> encode -> build -> balance/split/fit/evaluate -> predict -> format.
pub fn assign_populations(
    target: &Path,
    panel: &PanelFiles,
    taxonomy: &PopulationTaxonomy,
    config: &PipelineConfig,
    progress: &ProgressBar,
) -> Result<RunOutcome> {
    config.validate()?;

    progress.set_message("Indexing reference markers...");
    let index = MarkerIndex::from_path(&panel.marker_listing)?;

    progress.set_message("Scanning target markers...");
    let scan = MarkerMatcher::new(&index).scan_path(target)?;
    if scan.order.is_empty() {
        return Err(ImpRefError::EmptyInput {
            what: "consistent markers between target and reference panel",
        });
    }

    let labels = read_labels(&panel.labels)?;
    taxonomy.check_labels(&labels)?;

    progress.set_message("Encoding genotypes...");
    let stage_start = Instant::now();
    let encoder = GenotypeEncoder::default();
    let builder = MatrixBuilder::new(Arc::clone(&scan.order));
    let target_rows = builder.encode_target(&scan, &encoder)?;
    let reference_rows =
        builder.read_reference_rows_from_path(&panel.reference_matrix, &encoder, labels.len())?;

    let reference_ids = (1..=labels.len()).map(|i| format!("ref{}", i)).collect();
    let matrices = FeatureMatrices {
        reference: builder.build(&reference_rows, reference_ids, "reference matrix")?,
        labels,
        target: builder.build(&target_rows, scan.sample_ids.clone(), "target encoding")?,
    };
    matrices.ensure_aligned()?;
    info!(
        "Built reference ({} x {}) and target ({} x {}) matrices in {:.2?}.",
        matrices.reference.n_samples(),
        matrices.reference.n_markers(),
        matrices.target.n_samples(),
        matrices.target.n_markers(),
        stage_start.elapsed()
    );

    progress.set_message("Balancing and splitting the reference panel...");
    let model = MultinomialLogisticRegression::new(config.logistic.clone());
    let split = ClassifierPipeline::new(model, config.clone())?
        .balance(&matrices.reference, &matrices.labels)?
        .split()?;
    let split_seed = split.split_seed;

    progress.set_message("Fitting classifier...");
    let stage_start = Instant::now();
    let evaluated = split.fit()?.evaluate()?;
    info!("Classifier fit and evaluation took {:.2?}.", stage_start.elapsed());

    progress.set_message("Predicting target samples...");
    let predictions = evaluated.predict(&matrices.target)?;
    let report = ResultFormatter::new(taxonomy).format(&matrices.target.sample_ids, &predictions)?;
    let (model, evaluation) = evaluated.into_parts();

    Ok(RunOutcome {
        summary: scan.summary,
        split_seed,
        evaluation,
        report,
        model,
    })
}
