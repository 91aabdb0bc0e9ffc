// metrics.rs
//
// Held-out evaluation: accuracy, support-weighted precision/recall/F1 and the
// actual x predicted confusion matrix.

use ndarray::Array2;
use std::fmt;

use crate::error::{ImpRefError, Result};

/// Counts of actual (rows) against predicted (columns) labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    /// Sorted union of actual and predicted labels.
    pub labels: Vec<usize>,
    pub counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn new(actual: &[usize], predicted: &[usize]) -> Self {
        let mut labels: Vec<usize> = actual.iter().chain(predicted).copied().collect();
        labels.sort_unstable();
        labels.dedup();

        let mut counts = Array2::<usize>::zeros((labels.len(), labels.len()));
        for (a, p) in actual.iter().zip(predicted) {
            if let (Ok(row), Ok(col)) = (labels.binary_search(a), labels.binary_search(p)) {
                counts[[row, col]] += 1;
            }
        }
        Self { labels, counts }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Actual\\Predicted")?;
        for label in &self.labels {
            write!(f, "\t{}", label)?;
        }
        writeln!(f)?;
        for (row_idx, label) in self.labels.iter().enumerate() {
            write!(f, "{}", label)?;
            for count in self.counts.row(row_idx) {
                write!(f, "\t{}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
    pub confusion: ConfusionMatrix,
}

impl Evaluation {
    /// Scores `predicted` against `actual`. Classes without predictions count
    /// as zero precision rather than failing.
    pub fn compute(actual: &[usize], predicted: &[usize]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(ImpRefError::dimension(
                "evaluation",
                actual.len(),
                predicted.len(),
            ));
        }
        if actual.is_empty() {
            return Err(ImpRefError::EmptyInput {
                what: "held-out test samples",
            });
        }

        let confusion = ConfusionMatrix::new(actual, predicted);
        let total = actual.len() as f64;
        let correct: usize = (0..confusion.labels.len())
            .map(|i| confusion.counts[[i, i]])
            .sum();

        let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
        for (i, _) in confusion.labels.iter().enumerate() {
            let true_positive = confusion.counts[[i, i]] as f64;
            let support = confusion.counts.row(i).sum() as f64;
            let predicted_count = confusion.counts.column(i).sum() as f64;
            if support == 0.0 {
                continue;
            }
            let p = if predicted_count > 0.0 {
                true_positive / predicted_count
            } else {
                0.0
            };
            let r = true_positive / support;
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
            let weight = support / total;
            precision += weight * p;
            recall += weight * r;
            f1 += weight * f;
        }

        Ok(Self {
            accuracy: correct as f64 / total,
            precision,
            recall,
            f1,
            support: actual.len(),
            confusion,
        })
    }

    /// Tab-delimited metrics block followed by the confusion matrix.
    pub fn render(&self) -> String {
        format!(
            "Accuracy\t{:.4}\nPrecision\t{:.4}\nRecall\t{:.4}\nF1\t{:.4}\nSupport\t{}\n\n{}",
            self.accuracy, self.precision, self.recall, self.f1, self.support, self.confusion
        )
    }
}
