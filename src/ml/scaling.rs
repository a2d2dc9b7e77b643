use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{DegenerateColumn, ForecastError};
use crate::corpus::Corpus;
use crate::types::FeatureRecord;

/// Per-dimension min/max bounds for min-max normalization.
///
/// `forward` maps each value into `[0, 1]` relative to the fitted range and
/// `inverse` undoes it exactly. A column whose min equals its max carries no
/// information; it normalizes to `0` and inverts back to the constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl ScalingParams {
    /// Fit bounds from a sequence of equally sized vectors
    pub fn fit<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, ForecastError> {
        let first = rows.first().ok_or(ForecastError::InsufficientData {
            operation: "scaling fit",
            required: 1,
            available: 0,
        })?;
        let dims = first.as_ref().len();

        let mut mins = vec![f64::INFINITY; dims];
        let mut maxs = vec![f64::NEG_INFINITY; dims];

        for row in rows {
            let row = row.as_ref();
            if row.len() != dims {
                return Err(ForecastError::DimensionMismatch {
                    expected: dims,
                    actual: row.len(),
                });
            }
            for (j, &v) in row.iter().enumerate() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }

        let params = Self { mins, maxs };
        for column in params.degenerate_columns() {
            warn!("Degenerate scaling column: {}", column);
        }
        Ok(params)
    }

    /// Fit a one-dimensional parameter set (labels)
    pub fn fit_scalar(values: &[f64]) -> Result<Self, ForecastError> {
        let rows: Vec<[f64; 1]> = values.iter().map(|&v| [v]).collect();
        Self::fit(&rows)
    }

    pub fn dims(&self) -> usize {
        self.mins.len()
    }

    pub fn min(&self, index: usize) -> Option<f64> {
        self.mins.get(index).copied()
    }

    pub fn max(&self, index: usize) -> Option<f64> {
        self.maxs.get(index).copied()
    }

    fn range(&self, index: usize) -> Option<f64> {
        let range = self.maxs[index] - self.mins[index];
        if range == 0.0 {
            None
        } else {
            Some(range)
        }
    }

    pub fn forward(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        self.check_dims(values.len())?;
        Ok(values
            .iter()
            .enumerate()
            .map(|(j, &v)| match self.range(j) {
                Some(range) => (v - self.mins[j]) / range,
                None => 0.0,
            })
            .collect())
    }

    pub fn inverse(&self, normalized: &[f64]) -> Result<Vec<f64>, ForecastError> {
        self.check_dims(normalized.len())?;
        Ok(normalized
            .iter()
            .enumerate()
            .map(|(j, &n)| match self.range(j) {
                Some(range) => n * range + self.mins[j],
                None => self.mins[j],
            })
            .collect())
    }

    pub fn forward_scalar(&self, value: f64) -> Result<f64, ForecastError> {
        Ok(self.forward(&[value])?[0])
    }

    pub fn inverse_scalar(&self, normalized: f64) -> Result<f64, ForecastError> {
        Ok(self.inverse(&[normalized])?[0])
    }

    /// Normalize many rows into a `(rows, dims)` matrix
    pub fn forward_rows<R: AsRef<[f64]>>(&self, rows: &[R]) -> Result<Array2<f64>, ForecastError> {
        let mut out = Array2::zeros((rows.len(), self.dims()));
        for (i, row) in rows.iter().enumerate() {
            let normalized = self.forward(row.as_ref())?;
            for (j, v) in normalized.into_iter().enumerate() {
                out[[i, j]] = v;
            }
        }
        Ok(out)
    }

    pub fn degenerate_columns(&self) -> Vec<DegenerateColumn> {
        (0..self.dims())
            .filter(|&j| self.range(j).is_none())
            .map(|j| DegenerateColumn {
                index: j,
                value: self.mins[j],
            })
            .collect()
    }

    /// Structural check for parameters read back from disk
    pub fn validate(&self, expected_dims: usize) -> Result<(), String> {
        if self.mins.len() != self.maxs.len() {
            return Err(format!(
                "{} minimums but {} maximums",
                self.mins.len(),
                self.maxs.len()
            ));
        }
        if self.dims() != expected_dims {
            return Err(format!(
                "expected {} dimensions, found {}",
                expected_dims,
                self.dims()
            ));
        }
        for j in 0..self.dims() {
            let (lo, hi) = (self.mins[j], self.maxs[j]);
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(format!("invalid bounds [{}, {}] in column {}", lo, hi, j));
            }
        }
        Ok(())
    }

    fn check_dims(&self, actual: usize) -> Result<(), ForecastError> {
        if actual != self.dims() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.dims(),
                actual,
            });
        }
        Ok(())
    }
}

/// Feature and label scaling fitted on one corpus.
/// Fitted once by the trainer, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusScaling {
    pub features: ScalingParams,
    pub label: ScalingParams,
    pub corpus_digest: String,
    pub samples: usize,
    pub fitted_at: DateTime<Utc>,
}

impl CorpusScaling {
    pub fn fit(corpus: &Corpus) -> Result<Self, ForecastError> {
        let rows: Vec<[f64; FeatureRecord::NUM_FEATURES]> =
            corpus.samples().iter().map(|s| s.features.to_array()).collect();
        let labels: Vec<f64> = corpus.samples().iter().map(|s| s.label).collect();

        let features = ScalingParams::fit(&rows)?;
        let label = ScalingParams::fit_scalar(&labels)?;

        info!(
            "Fitted scaling on {} samples ({} degenerate feature columns)",
            corpus.len(),
            features.degenerate_columns().len()
        );

        Ok(Self {
            features,
            label,
            corpus_digest: corpus.digest(),
            samples: corpus.len(),
            fitted_at: Utc::now(),
        })
    }

    pub fn normalize_record(&self, record: &FeatureRecord) -> Result<Vec<f64>, ForecastError> {
        self.features.forward(&record.to_array())
    }

    pub fn normalize_label(&self, price: f64) -> Result<f64, ForecastError> {
        self.label.forward_scalar(price)
    }

    pub fn denormalize_label(&self, normalized: f64) -> Result<f64, ForecastError> {
        self.label.inverse_scalar(normalized)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.features
            .validate(FeatureRecord::NUM_FEATURES)
            .map_err(|e| format!("feature scaling: {}", e))?;
        self.label
            .validate(1)
            .map_err(|e| format!("label scaling: {}", e))
    }
}
