use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use super::error::{ArtifactKind, ForecastError};
use super::model::{ForecastModel, ModelArchitecture};
use super::scaling::CorpusScaling;

pub const SCALING_FILE: &str = "scaling.json";

/// Semantic version for models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ModelVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl FromStr for ModelVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().trim_start_matches('v').split('.').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid version format: {}", s));
        }
        let part = |p: &str| {
            p.parse::<u32>()
                .map_err(|e| format!("Invalid version component '{}': {}", p, e))
        };

        Ok(Self {
            major: part(parts[0])?,
            minor: part(parts[1])?,
            patch: part(parts[2])?,
        })
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Training metrics stored with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub samples: usize,
    pub fit_samples: usize,
    pub held_out_samples: usize,
    pub epochs: usize,
    pub final_loss: f64,
    pub held_out_mae: Option<f64>,
    pub held_out_mape: Option<f64>,
}

/// Model parameters plus the lineage needed to pair them with a scaling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: ModelVersion,
    pub trained_at: DateTime<Utc>,
    pub corpus_digest: String,
    pub metrics: TrainingMetrics,
    pub model: ForecastModel,
}

/// Only the fields needed to decide whether a file is worth decoding
#[derive(Deserialize)]
struct ArtifactHeader {
    version: ModelVersion,
    model: ModelHeader,
}

#[derive(Deserialize)]
struct ModelHeader {
    architecture: ModelArchitecture,
}

/// JSON artifacts in one directory: one model file per architecture
/// revision and a single scaling file.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn model_path(&self, revision: u32) -> PathBuf {
        self.dir.join(format!("forecast_model_r{}.json", revision))
    }

    pub fn scaling_path(&self) -> PathBuf {
        self.dir.join(SCALING_FILE)
    }

    /// Version of the model currently stored for a revision, if readable
    pub fn stored_version(&self, revision: u32) -> Option<ModelVersion> {
        let text = fs::read_to_string(self.model_path(revision)).ok()?;
        serde_json::from_str::<ArtifactHeader>(&text)
            .ok()
            .map(|h| h.version)
    }

    /// Next version to assign (patch bump over what is stored)
    pub fn next_version(&self, revision: u32) -> ModelVersion {
        match self.stored_version(revision) {
            Some(current) => current.bump_patch(),
            None => ModelVersion::initial(),
        }
    }

    pub fn save_model(
        &self,
        model: ForecastModel,
        corpus_digest: &str,
        metrics: TrainingMetrics,
    ) -> Result<ModelArtifact, ForecastError> {
        model.check_shapes()?;
        let revision = model.architecture().revision;
        let artifact = ModelArtifact {
            version: self.next_version(revision),
            trained_at: Utc::now(),
            corpus_digest: corpus_digest.to_string(),
            metrics,
            model,
        };

        let path = self.model_path(revision);
        write_atomic(&path, &serde_json::to_vec_pretty(&artifact)?)?;
        info!("Saved model v{} to {}", artifact.version, path.display());
        Ok(artifact)
    }

    pub fn save_scaling(&self, scaling: &CorpusScaling) -> Result<PathBuf, ForecastError> {
        let path = self.scaling_path();
        write_atomic(&path, &serde_json::to_vec_pretty(scaling)?)?;
        info!("Saved scaling ({} samples) to {}", scaling.samples, path.display());
        Ok(path)
    }

    /// Load the model for `expected`, rejecting any declared or tensor-level
    /// disagreement with that architecture
    pub fn load_model(&self, expected: &ModelArchitecture) -> Result<ModelArtifact, ForecastError> {
        let path = self.model_path(expected.revision);
        let text = read_artifact(&path, ArtifactKind::Model)?;

        let header: ArtifactHeader =
            serde_json::from_str(&text).map_err(|e| corrupt(ArtifactKind::Model, &path, e))?;
        header.model.architecture.ensure_matches(expected)?;

        let artifact: ModelArtifact =
            serde_json::from_str(&text).map_err(|e| corrupt(ArtifactKind::Model, &path, e))?;
        artifact.model.check_shapes()?;

        info!(
            "Loaded model v{} (trained {}) from {}",
            artifact.version,
            artifact.trained_at.format("%Y-%m-%d %H:%M"),
            path.display()
        );
        Ok(artifact)
    }

    pub fn load_scaling(&self) -> Result<CorpusScaling, ForecastError> {
        let path = self.scaling_path();
        let text = read_artifact(&path, ArtifactKind::Scaling)?;

        let scaling: CorpusScaling =
            serde_json::from_str(&text).map_err(|e| corrupt(ArtifactKind::Scaling, &path, e))?;
        scaling
            .validate()
            .map_err(|reason| corrupt(ArtifactKind::Scaling, &path, reason))?;

        for column in scaling.features.degenerate_columns() {
            warn!("Stored scaling: {}", column);
        }
        Ok(scaling)
    }
}

fn read_artifact(path: &Path, artifact: ArtifactKind) -> Result<String, ForecastError> {
    if !path.exists() {
        return Err(ForecastError::MissingArtifact {
            artifact,
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read_to_string(path)?)
}

fn corrupt(artifact: ArtifactKind, path: &Path, reason: impl ToString) -> ForecastError {
    ForecastError::CorruptArtifact {
        artifact,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write to `<path>.tmp` then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ForecastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::types::{FeatureRecord, LabeledSample};
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn metrics() -> TrainingMetrics {
        TrainingMetrics {
            samples: 20,
            fit_samples: 18,
            held_out_samples: 2,
            epochs: 5,
            final_loss: 0.01,
            held_out_mae: Some(12.5),
            held_out_mape: Some(0.04),
        }
    }

    fn model(arch: ModelArchitecture) -> ForecastModel {
        let mut rng = StdRng::seed_from_u64(17);
        ForecastModel::new(arch, &mut rng).unwrap()
    }

    fn corpus() -> Corpus {
        (0..6)
            .map(|i| {
                let mut values = [1.0; FeatureRecord::NUM_FEATURES];
                values[0] = 100.0 + i as f64;
                values[3] = 50.0 - i as f64;
                LabeledSample::new(FeatureRecord::from_array(values), 101.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn test_version_parse_and_bump() {
        let v: ModelVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, ModelVersion::new(1, 2, 3));
        assert_eq!(v.bump_patch().to_string(), "1.2.4");
        assert!("1.2".parse::<ModelVersion>().is_err());
        assert!("a.b.c".parse::<ModelVersion>().is_err());
    }

    #[test]
    fn test_model_round_trip_and_version_bump() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));

        let first = store
            .save_model(model(ModelArchitecture::standard()), "abc", metrics())
            .unwrap();
        assert_eq!(first.version, ModelVersion::initial());
        assert!(store.model_path(1).ends_with("forecast_model_r1.json"));

        let second = store
            .save_model(model(ModelArchitecture::standard()), "abc", metrics())
            .unwrap();
        assert_eq!(second.version.to_string(), "1.0.1");

        let loaded = store.load_model(&ModelArchitecture::standard()).unwrap();
        assert_eq!(loaded.version, second.version);
        assert_eq!(loaded.corpus_digest, "abc");
        assert_eq!(loaded.metrics, metrics());

        let x = Array2::from_elem((2, 12), 0.3);
        let a = second.model.predict_batch(&x).unwrap();
        let b = loaded.model.predict_batch(&x).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(p, q)| (p - q).abs() < 1e-12));
    }

    #[test]
    fn test_twelve_input_model_rejected_for_ten() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save_model(model(ModelArchitecture::standard()), "abc", metrics())
            .unwrap();

        let expected = ModelArchitecture::standard().with_input_dim(10);
        let err = store.load_model(&expected).unwrap_err();
        assert!(matches!(err, ForecastError::ArchitectureMismatch { .. }));
    }

    #[test]
    fn test_missing_artifacts_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        match store.load_model(&ModelArchitecture::standard()).unwrap_err() {
            ForecastError::MissingArtifact { artifact, path } => {
                assert_eq!(artifact, ArtifactKind::Model);
                assert_eq!(path, store.model_path(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        match store.load_scaling().unwrap_err() {
            ForecastError::MissingArtifact { artifact, .. } => {
                assert_eq!(artifact, ArtifactKind::Scaling)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_model_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        fs::write(store.model_path(1), "{\"version\": {\"major\": 1").unwrap();

        let err = store.load_model(&ModelArchitecture::standard()).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::CorruptArtifact {
                artifact: ArtifactKind::Model,
                ..
            }
        ));
    }

    #[test]
    fn test_scaling_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let scaling = CorpusScaling::fit(&corpus()).unwrap();

        store.save_scaling(&scaling).unwrap();
        assert!(!dir.path().join("scaling.json.tmp").exists());

        let loaded = store.load_scaling().unwrap();
        assert_eq!(loaded, scaling);
    }

    #[test]
    fn test_scaling_with_wrong_width_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let mut scaling = CorpusScaling::fit(&corpus()).unwrap();
        scaling.features = crate::ml::scaling::ScalingParams::fit(&[vec![1.0, 2.0]]).unwrap();
        store.save_scaling(&scaling).unwrap();

        let err = store.load_scaling().unwrap_err();
        assert!(matches!(
            err,
            ForecastError::CorruptArtifact {
                artifact: ArtifactKind::Scaling,
                ..
            }
        ));
    }
}
