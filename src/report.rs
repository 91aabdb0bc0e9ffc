// report.rs
//
// Maps class labels to population names and renders the output tables. All
// tables are rendered to memory before any file is created.

use log::info;
use ndarray::{Array2, Axis};
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::classifier::MultinomialLogisticRegression;
use crate::error::{ImpRefError, Result};
use crate::io::read_names;
use crate::metrics::Evaluation;
use crate::pipeline::Predictions;

pub const POPULATION_FILE: &str = "ImpRef.out.population";
pub const DISTINCT_POPULATION_FILE: &str = "ImpRef.out.ref.population";
pub const PROBABILITY_FILE: &str = "ImpRef.out.population.proba";
pub const EVALUATION_FILE: &str = "ImpRef.out.evaluation";
pub const MODEL_FILE: &str = "LogisticRegression.json";

const DEFAULT_POPULATIONS: [&str; 64] = [
    "American_Yorkshire",
    "Canadian_Yorkshire",
    "Danish_Yorkshire",
    "Dutch_Yorkshire",
    "French_Yorkshire",
    "Unknown_Yorkshire_lines",
    "Landrace",
    "Duroc",
    "Berkshire",
    "Goettingen_Minipig",
    "Hampshire",
    "Iberian",
    "Mangalica",
    "Pietrain",
    "Angler_Sattleschwein",
    "British_Saddleback",
    "Bunte_Bentheimer",
    "Calabrese",
    "Casertana",
    "Chato_Murciano",
    "Cinta_Senese",
    "Gloucester_Old_Spot",
    "Large_Black",
    "Leicoma",
    "Linderodsvin",
    "Middle_White",
    "Nero_Siciliano",
    "Tamworth",
    "European_Wild_boar",
    "Yucatan_minipig",
    "Creole",
    "American_Wild_boar",
    "Bamei",
    "Baoshan",
    "Enshi_black",
    "Erhualian",
    "Hetao",
    "Jinhua",
    "Korean_black_pig",
    "Laiwu",
    "Meishan",
    "Min",
    "Neijiang",
    "Rongchang",
    "Tibetan",
    "Tongcheng",
    "Hubei_White",
    "Daweizi",
    "Jiangquhai",
    "Leping_Spotted",
    "Penzhou",
    "songliao_black_pig",
    "Taihu",
    "Wannan_Spotted",
    "Wujin",
    "Ya_nan",
    "Diannanxiaoer",
    "Luchuan",
    "Wuzhishan",
    "Bamaxiang",
    "MiniLEWE",
    "Xiang",
    "Asia_Wild_boar",
    "Hybrid",
];

/// Ordered label index -> population name table.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationTaxonomy {
    names: Vec<String>,
}

impl Default for PopulationTaxonomy {
    /// The 64 pig breeds and lines of the bundled reference panel.
    fn default() -> Self {
        Self {
            names: DEFAULT_POPULATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PopulationTaxonomy {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(ImpRefError::EmptyInput {
                what: "population names",
            });
        }
        Ok(Self { names })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Loading population names from {}", path.display());
        Self::new(read_names(path)?)
    }

    pub fn name_of(&self, label: usize) -> Result<&str> {
        self.names
            .get(label)
            .map(String::as_str)
            .ok_or(ImpRefError::UnknownPopulation {
                label,
                taxonomy_size: self.names.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fails on the first label the taxonomy cannot name.
    pub fn check_labels(&self, labels: &[usize]) -> Result<()> {
        labels.iter().try_for_each(|&label| self.name_of(label).map(|_| ()))
    }
}

/// Named predictions for the target samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentReport {
    /// (sample ID, predicted population) in target sample order.
    pub assignments: Vec<(String, String)>,
    /// Distinct predicted populations, sorted by name.
    pub distinct_populations: Vec<String>,
    /// Population names of the classifier's classes, in probability column order.
    pub probability_header: Vec<String>,
    pub probabilities: Array2<f64>,
}

/// Turns class indices and probabilities into population-named tables.
pub struct ResultFormatter<'a> {
    taxonomy: &'a PopulationTaxonomy,
}

impl<'a> ResultFormatter<'a> {
    pub fn new(taxonomy: &'a PopulationTaxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn format(&self, sample_ids: &[String], predictions: &Predictions) -> Result<AssignmentReport> {
        if sample_ids.len() != predictions.labels.len() {
            return Err(ImpRefError::dimension(
                "result formatting (samples)",
                sample_ids.len(),
                predictions.labels.len(),
            ));
        }
        if predictions.probabilities.ncols() != predictions.classes.len() {
            return Err(ImpRefError::dimension(
                "result formatting (probability columns)",
                predictions.classes.len(),
                predictions.probabilities.ncols(),
            ));
        }

        let assignments = sample_ids
            .iter()
            .zip(&predictions.labels)
            .map(|(id, &label)| Ok((id.clone(), self.taxonomy.name_of(label)?.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let distinct_populations = assignments
            .iter()
            .map(|(_, name)| name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let probability_header = predictions
            .classes
            .iter()
            .map(|&label| self.taxonomy.name_of(label).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        Ok(AssignmentReport {
            assignments,
            distinct_populations,
            probability_header,
            probabilities: predictions.probabilities.clone(),
        })
    }
}

impl AssignmentReport {
    pub fn render_assignments(&self) -> String {
        self.assignments
            .iter()
            .map(|(sample, population)| format!("{}\t{}\n", sample, population))
            .collect()
    }

    pub fn render_distinct_populations(&self) -> String {
        self.distinct_populations
            .iter()
            .map(|name| format!("{}\n", name))
            .collect()
    }

    pub fn render_probabilities(&self) -> String {
        let mut out = self.probability_header.join("\t");
        out.push('\n');
        for row in self.probabilities.axis_iter(Axis(0)) {
            let cells: Vec<String> = row.iter().map(|p| format!("{:.4}", p)).collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn write_output_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let file = File::create(&path).map_err(|e| ImpRefError::io(&path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(contents.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| ImpRefError::io(&path, e))?;
    Ok(path)
}

/// Writes every output table and the fitted model into `dir`, creating it if
/// needed. Nothing is created until all outputs have been rendered.
pub fn write_outputs(
    dir: &Path,
    report: &AssignmentReport,
    evaluation: &Evaluation,
    model: &MultinomialLogisticRegression,
) -> Result<Vec<PathBuf>> {
    let outputs = [
        (POPULATION_FILE, report.render_assignments()),
        (DISTINCT_POPULATION_FILE, report.render_distinct_populations()),
        (PROBABILITY_FILE, report.render_probabilities()),
        (EVALUATION_FILE, evaluation.render()),
        (MODEL_FILE, model.to_json()?),
    ];

    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| ImpRefError::io(dir, e))?;
        info!("Created output directory: {}", dir.display());
    }

    let mut written = Vec::with_capacity(outputs.len());
    for (name, contents) in &outputs {
        written.push(write_output_file(dir, name, contents)?);
    }

    info!(
        "The predicted probabilities and assigned populations have been saved to {}",
        dir.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn predictions() -> Predictions {
        Predictions {
            labels: vec![7, 6, 7],
            probabilities: array![[0.1, 0.9], [0.75, 0.25], [0.33333, 0.66667]],
            classes: vec![6, 7],
        }
    }

    fn ids() -> Vec<String> {
        vec!["pig1".into(), "pig2".into(), "pig3".into()]
    }

    #[test]
    fn default_taxonomy_names_known_breeds() {
        let taxonomy = PopulationTaxonomy::default();
        assert_eq!(taxonomy.len(), 64);
        assert_eq!(taxonomy.name_of(0).unwrap(), "American_Yorkshire");
        assert_eq!(taxonomy.name_of(7).unwrap(), "Duroc");
        assert_eq!(taxonomy.name_of(63).unwrap(), "Hybrid");
        assert!(matches!(
            taxonomy.name_of(64),
            Err(ImpRefError::UnknownPopulation {
                label: 64,
                taxonomy_size: 64
            })
        ));
    }

    #[test]
    fn formats_named_tables() {
        let taxonomy = PopulationTaxonomy::default();
        let report = ResultFormatter::new(&taxonomy).format(&ids(), &predictions()).unwrap();

        assert_eq!(report.render_assignments(), "pig1\tDuroc\npig2\tLandrace\npig3\tDuroc\n");
        assert_eq!(report.render_distinct_populations(), "Duroc\nLandrace\n");
        assert_eq!(
            report.render_probabilities(),
            "Landrace\tDuroc\n0.1000\t0.9000\n0.7500\t0.2500\n0.3333\t0.6667\n"
        );
    }

    #[test]
    fn sample_count_mismatch_is_rejected() {
        let taxonomy = PopulationTaxonomy::default();
        let err = ResultFormatter::new(&taxonomy)
            .format(&ids()[..2], &predictions())
            .unwrap_err();
        assert!(matches!(err, ImpRefError::DimensionMismatch { .. }));
    }

    fn fitted_model() -> MultinomialLogisticRegression {
        use crate::classifier::{Classifier, LogisticConfig};
        let x = array![[0.0], [0.1], [1.3], [1.4]];
        let mut model = MultinomialLogisticRegression::new(LogisticConfig::default());
        model.fit(x.view(), &[6, 6, 7, 7]).unwrap();
        model
    }

    #[test]
    fn outputs_match_their_in_memory_renders() {
        let taxonomy = PopulationTaxonomy::default();
        let report = ResultFormatter::new(&taxonomy).format(&ids(), &predictions()).unwrap();
        let evaluation = Evaluation::compute(&[6, 7], &[6, 7]).unwrap();
        let model = fitted_model();

        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested/out");
        let written = write_outputs(&out_dir, &report, &evaluation, &model).unwrap();
        assert_eq!(written.len(), 5);

        let read = |name: &str| std::fs::read_to_string(out_dir.join(name)).unwrap();
        assert_eq!(read(POPULATION_FILE), report.render_assignments());
        assert_eq!(read(PROBABILITY_FILE), report.render_probabilities());
        assert_eq!(read(EVALUATION_FILE), evaluation.render());
        assert_eq!(read(MODEL_FILE), model.to_json().unwrap());
        let reloaded = MultinomialLogisticRegression::load(&out_dir.join(MODEL_FILE)).unwrap();
        assert_eq!(reloaded.coefficients(), model.coefficients());
    }

    #[test]
    fn custom_taxonomy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("populations.txt");
        std::fs::write(&path, "Alpha\nBeta\n").unwrap();
        let taxonomy = PopulationTaxonomy::from_path(&path).unwrap();
        assert_eq!(taxonomy.name_of(1).unwrap(), "Beta");
        assert!(taxonomy.check_labels(&[0, 1, 2]).is_err());
    }
}
