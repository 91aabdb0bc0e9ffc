// pipeline.rs
//
// Balance -> split -> fit -> evaluate -> predict. Each stage consumes the
// previous one, so a stage cannot run out of order.

use log::{debug, info};
use ndarray::{Array2, Axis};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::classifier::{argmax, Classifier};
use crate::config::PipelineConfig;
use crate::error::{ImpRefError, Result};
use crate::matrix::FeatureMatrix;
use crate::metrics::Evaluation;

/// Random oversampling: minority classes are resampled with replacement up to
/// the majority class count. Original rows keep their positions; drawn rows
/// are appended class by class.
pub fn oversample(x: &Array2<f64>, y: &[usize], seed: u64) -> Result<(Array2<f64>, Vec<usize>)> {
    if x.nrows() != y.len() {
        return Err(ImpRefError::dimension("class balancing", x.nrows(), y.len()));
    }
    let by_class = indices_by_class(y);
    let majority = by_class.values().map(Vec::len).max().ok_or(ImpRefError::EmptyInput {
        what: "reference samples",
    })?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows: Vec<usize> = (0..y.len()).collect();
    for (label, members) in &by_class {
        let deficit = majority - members.len();
        if deficit > 0 {
            debug!("Oversampling class {}: {} -> {}", label, members.len(), majority);
        }
        rows.extend((0..deficit).map(|_| members[rng.random_range(0..members.len())]));
    }

    let labels = rows.iter().map(|&r| y[r]).collect();
    Ok((x.select(Axis(0), &rows), labels))
}

fn indices_by_class(y: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in y.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }
    by_class
}

/// Row indices of a stratified train/test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Holds out `round(n * test_fraction)` rows of every class (at least one, and
/// never all of them). Every class needs two or more rows.
pub fn stratified_split(y: &[usize], test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (label, mut members) in indices_by_class(y) {
        let n = members.len();
        if n < 2 {
            return Err(ImpRefError::InsufficientClassSamples {
                label,
                count: n,
                stage: "train/test split",
            });
        }
        members.shuffle(&mut rng);
        let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok(SplitIndices { train, test })
}

/// Entry state: a classifier and its settings, nothing seen yet.
pub struct ClassifierPipeline<C: Classifier> {
    config: PipelineConfig,
    classifier: C,
}

/// Reference panel after oversampling.
pub struct Balanced<C: Classifier> {
    config: PipelineConfig,
    classifier: C,
    x: Array2<f64>,
    y: Vec<usize>,
}

/// Train and test partitions of the balanced panel.
pub struct Split<C: Classifier> {
    classifier: C,
    train_x: Array2<f64>,
    train_y: Vec<usize>,
    test_x: Array2<f64>,
    test_y: Vec<usize>,
    pub split_seed: u64,
}

/// Trained classifier with the held-out partition still attached.
pub struct Fitted<C: Classifier> {
    classifier: C,
    test_x: Array2<f64>,
    test_y: Vec<usize>,
}

/// Trained classifier plus its held-out scores. No training data is retained.
pub struct Evaluated<C: Classifier> {
    classifier: C,
    evaluation: Evaluation,
}

/// Per-sample class predictions for the target matrix.
#[derive(Debug, Clone)]
pub struct Predictions {
    pub labels: Vec<usize>,
    /// samples x classes, columns ordered as `classes`.
    pub probabilities: Array2<f64>,
    pub classes: Vec<usize>,
}

impl<C: Classifier> ClassifierPipeline<C> {
    pub fn new(classifier: C, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, classifier })
    }

    /// Oversamples the reference matrix. The target matrix is never touched.
    pub fn balance(self, reference: &FeatureMatrix, labels: &[usize]) -> Result<Balanced<C>> {
        let (x, y) = oversample(&reference.values, labels, self.config.balance_seed)?;
        let counts = indices_by_class(&y);
        info!(
            "Balanced reference panel: {} -> {} samples over {} classes ({} each).",
            labels.len(),
            y.len(),
            counts.len(),
            counts.values().next().map_or(0, Vec::len)
        );
        Ok(Balanced {
            config: self.config,
            classifier: self.classifier,
            x,
            y,
        })
    }
}

impl<C: Classifier> Balanced<C> {
    pub fn labels(&self) -> &[usize] {
        &self.y
    }

    pub fn split(self) -> Result<Split<C>> {
        let seed = self.config.split_seed.unwrap_or_else(rand::random);
        let indices = stratified_split(&self.y, self.config.test_fraction, seed)?;
        info!(
            "Split balanced panel into {} training and {} test samples (seed {}).",
            indices.train.len(),
            indices.test.len(),
            seed
        );
        let pick = |rows: &[usize]| rows.iter().map(|&r| self.y[r]).collect::<Vec<_>>();
        Ok(Split {
            train_x: self.x.select(Axis(0), &indices.train),
            train_y: pick(&indices.train),
            test_x: self.x.select(Axis(0), &indices.test),
            test_y: pick(&indices.test),
            classifier: self.classifier,
            split_seed: seed,
        })
    }
}

impl<C: Classifier> Split<C> {
    pub fn train_labels(&self) -> &[usize] {
        &self.train_y
    }

    pub fn test_labels(&self) -> &[usize] {
        &self.test_y
    }

    pub fn fit(mut self) -> Result<Fitted<C>> {
        info!("Training the {} model...", self.classifier.name());
        self.classifier.fit(self.train_x.view(), &self.train_y)?;
        Ok(Fitted {
            classifier: self.classifier,
            test_x: self.test_x,
            test_y: self.test_y,
        })
    }
}

impl<C: Classifier> Fitted<C> {
    pub fn evaluate(self) -> Result<Evaluated<C>> {
        let predicted = self.classifier.predict(self.test_x.view())?;
        let evaluation = Evaluation::compute(&self.test_y, &predicted)?;
        info!("Confusion matrix (held-out test set):\n{}", evaluation.confusion);
        info!(
            "Accuracy = {:.4}, Precision = {:.4}, Recall = {:.4}, F1 = {:.4}",
            evaluation.accuracy, evaluation.precision, evaluation.recall, evaluation.f1
        );
        Ok(Evaluated {
            classifier: self.classifier,
            evaluation,
        })
    }
}

impl<C: Classifier> Evaluated<C> {
    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Scores the target matrix. The predicted label of each sample is the
    /// class of its highest probability column.
    pub fn predict(&self, target: &FeatureMatrix) -> Result<Predictions> {
        let expected = self
            .classifier
            .n_features()
            .ok_or(ImpRefError::NotFitted("classifier"))?;
        if target.n_markers() != expected {
            return Err(ImpRefError::dimension(
                "target prediction (feature count)",
                expected,
                target.n_markers(),
            ));
        }
        info!("Predicting {} target samples...", target.n_samples());
        let probabilities = self.classifier.predict_proba(target.values.view())?;
        let classes = self.classifier.classes().to_vec();
        let labels = probabilities
            .axis_iter(Axis(0))
            .map(|row| classes[argmax(row.iter().copied())])
            .collect();
        Ok(Predictions {
            labels,
            probabilities,
            classes,
        })
    }

    pub fn into_parts(self) -> (C, Evaluation) {
        (self.classifier, self.evaluation)
    }
}
