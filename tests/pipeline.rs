use approx::assert_abs_diff_eq;
use indicatif::ProgressBar;
use ndarray::Axis;
use std::{fs, path::Path};

use impref::report::{
    DISTINCT_POPULATION_FILE, EVALUATION_FILE, MODEL_FILE, POPULATION_FILE, PROBABILITY_FILE,
};
use impref::{
    assign_populations, write_outputs, Classifier, ImpRefError, MultinomialLogisticRegression,
    PanelFiles, PanelLayout, PipelineConfig, PopulationTaxonomy,
};

const LANDRACE: usize = 6;
const DUROC: usize = 7;

/// Panel of 6 Landrace (low weights) and 4 Duroc (high weights) samples over
/// four markers; 3:400 is absent from the target file.
fn write_panel(dir: &Path) {
    fs::write(
        dir.join("SNP.INFO"),
        "1 100 A G rs1\n1 200 C T rs2\n2 300 T G rs3\n3 400 A C rs4\n",
    )
    .unwrap();

    let labels: Vec<usize> = [LANDRACE; 6].into_iter().chain([DUROC; 4]).collect();
    let label_text: String = labels.iter().map(|l| format!("{}\n", l)).collect();
    fs::write(dir.join("ref_class.txt"), label_text).unwrap();

    let row = |key: &str, low: &str, high: &str| {
        let values: Vec<&str> = labels
            .iter()
            .map(|&l| if l == LANDRACE { low } else { high })
            .collect();
        format!("{} {}\n", key, values.join(" "))
    };
    let matrix = [
        row("1 100 A G", "0.0", "1.4"),
        row("1 200 C T", "0/0", "1/1"),
        row("2 300 T G", "0.2", "1.4"),
        row("3 400 A C", "0.0", "0.6"),
    ]
    .concat();
    fs::write(dir.join("chr1-18.pos_snp_sample.matrix"), matrix).unwrap();
}

fn write_target(path: &Path) {
    let text = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tpigA\tpigB\tpigC\n\
        1\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t1/1\t1|1:30\n\
        1\t200\t.\tC\tT\t.\tPASS\t.\tGT\t0/0\t1/1\t1/1\n\
        5\t500\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\t0/1\t0/1\n\
        2\t300\t.\tT\tG\t.\tPASS\t.\tGT\t0|0\t1/1\t1/1\n";
    fs::write(path, text).unwrap();
}

fn setup() -> (tempfile::TempDir, PanelFiles) {
    let dir = tempfile::tempdir().unwrap();
    let panel_dir = dir.path().join("panel");
    fs::create_dir(&panel_dir).unwrap();
    write_panel(&panel_dir);
    write_target(&dir.path().join("target.vcf"));
    let panel = PanelLayout::default().resolve(&panel_dir).unwrap();
    (dir, panel)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        split_seed: Some(42),
        ..PipelineConfig::default()
    }
}

#[test]
fn assigns_target_samples_end_to_end() {
    let (dir, panel) = setup();
    let taxonomy = PopulationTaxonomy::default();
    let outcome = assign_populations(
        &dir.path().join("target.vcf"),
        &panel,
        &taxonomy,
        &config(),
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(outcome.summary.target_samples, 3);
    assert_eq!(outcome.summary.target_markers, 4);
    assert_eq!(outcome.summary.consistent_markers, 3);
    assert_eq!(outcome.summary.unmatched_markers, 1);
    assert_eq!(outcome.split_seed, 42);
    assert_eq!(outcome.model.n_features(), Some(3));
    assert_eq!(outcome.evaluation.accuracy, 1.0);

    let report = &outcome.report;
    assert_eq!(
        report.render_assignments(),
        "pigA\tLandrace\npigB\tDuroc\npigC\tDuroc\n"
    );
    assert_eq!(report.distinct_populations, vec!["Duroc", "Landrace"]);
    assert_eq!(report.probability_header, vec!["Landrace", "Duroc"]);
    for (row, (_, name)) in report.probabilities.axis_iter(Axis(0)).zip(&report.assignments) {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
        let best = if row[0] >= row[1] { 0 } else { 1 };
        assert_eq!(&report.probability_header[best], name);
    }
}

#[test]
fn outputs_are_written_and_model_reloads() {
    let (dir, panel) = setup();
    let taxonomy = PopulationTaxonomy::default();
    let outcome = assign_populations(
        &dir.path().join("target.vcf"),
        &panel,
        &taxonomy,
        &config(),
        &ProgressBar::hidden(),
    )
    .unwrap();

    let out_dir = dir.path().join("results/run1");
    let written = write_outputs(&out_dir, &outcome.report, &outcome.evaluation, &outcome.model).unwrap();
    assert_eq!(written.len(), 5);

    let distinct = fs::read_to_string(out_dir.join(DISTINCT_POPULATION_FILE)).unwrap();
    assert_eq!(distinct, "Duroc\nLandrace\n");
    let assignments = fs::read_to_string(out_dir.join(POPULATION_FILE)).unwrap();
    assert_eq!(assignments.lines().count(), 3);
    let evaluation = fs::read_to_string(out_dir.join(EVALUATION_FILE)).unwrap();
    assert!(evaluation.starts_with("Accuracy\t1.0000\n"));

    let proba = fs::read_to_string(out_dir.join(PROBABILITY_FILE)).unwrap();
    let mut lines = proba.lines();
    assert_eq!(lines.next(), Some("Landrace\tDuroc"));
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        assert_eq!(cells.len(), 2);
        assert!(cells.iter().all(|c| c.split('.').nth(1).map(str::len) == Some(4)));
        let total: f64 = cells.iter().map(|c| c.parse::<f64>().unwrap()).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 2e-4);
    }

    let reloaded = MultinomialLogisticRegression::load(&out_dir.join(MODEL_FILE)).unwrap();
    assert_eq!(reloaded.classes(), &[LANDRACE, DUROC]);
    let x = ndarray::array![[0.0, 0.6, 0.2], [1.4, 0.2, 1.4]];
    assert_eq!(reloaded.predict(x.view()).unwrap(), vec![LANDRACE, DUROC]);
}

#[test]
fn target_without_shared_markers_is_rejected() {
    let (dir, panel) = setup();
    let target = dir.path().join("unrelated.vcf");
    fs::write(
        &target,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tpigA\n\
         9\t900\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\n",
    )
    .unwrap();

    let err = assign_populations(
        &target,
        &panel,
        &PopulationTaxonomy::default(),
        &config(),
        &ProgressBar::hidden(),
    )
    .unwrap_err();
    assert!(matches!(err, ImpRefError::EmptyInput { .. }));
}

#[test]
fn reference_matrix_missing_a_consistent_marker_is_fatal() {
    let (dir, panel) = setup();
    let matrix = fs::read_to_string(&panel.reference_matrix).unwrap();
    let trimmed: String = matrix
        .lines()
        .filter(|line| !line.starts_with("2 300"))
        .map(|line| format!("{}\n", line))
        .collect();
    fs::write(&panel.reference_matrix, trimmed).unwrap();

    let err = assign_populations(
        &dir.path().join("target.vcf"),
        &panel,
        &PopulationTaxonomy::default(),
        &config(),
        &ProgressBar::hidden(),
    )
    .unwrap_err();
    match err {
        ImpRefError::MissingMarker { key, source_name } => {
            assert_eq!(key.to_string(), "2:300:T:G");
            assert_eq!(source_name, "reference matrix");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn labels_outside_the_taxonomy_are_rejected() {
    let (dir, panel) = setup();
    let taxonomy = PopulationTaxonomy::new(vec!["Alpha".into(), "Beta".into()]).unwrap();
    let err = assign_populations(
        &dir.path().join("target.vcf"),
        &panel,
        &taxonomy,
        &config(),
        &ProgressBar::hidden(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ImpRefError::UnknownPopulation {
            label: LANDRACE,
            taxonomy_size: 2
        }
    ));
}
