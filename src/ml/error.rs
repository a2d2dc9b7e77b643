use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Persisted artifacts the predictor depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Model,
    Scaling,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &str {
        match self {
            ArtifactKind::Model => "model parameters",
            ArtifactKind::Scaling => "corpus scaling parameters",
        }
    }

    /// Command that produces the artifact
    pub fn produced_by(&self) -> &str {
        match self {
            ArtifactKind::Model | ArtifactKind::Scaling => "train",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by the scaling, training and prediction pipeline
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Insufficient data for {operation}: need at least {required} samples, got {available}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        available: usize,
    },

    #[error("All market data sources failed: {}", .failures.join("; "))]
    DataUnavailable { failures: Vec<String> },

    #[error("Missing {artifact} at {} (run `{}` first)", .path.display(), .artifact.produced_by())]
    MissingArtifact { artifact: ArtifactKind, path: PathBuf },

    #[error("Architecture mismatch: {detail}")]
    ArchitectureMismatch { detail: String },

    #[error("Corrupt {artifact} at {}: {reason}", .path.display())]
    CorruptArtifact {
        artifact: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    #[error("Model was trained on corpus {model_corpus} but scaling was fitted on corpus {scaling_corpus}")]
    ArtifactLineage {
        model_corpus: String,
        scaling_corpus: String,
    },

    #[error("Dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model produced a non-finite prediction ({value})")]
    InvalidPrediction { value: f64 },

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Non-fatal: a column whose observed values were all identical.
/// Normalizes to 0 for every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DegenerateColumn {
    pub index: usize,
    pub value: f64,
}

impl fmt::Display for DegenerateColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column {} is constant ({}), normalized to 0",
            self.index, self.value
        )
    }
}
