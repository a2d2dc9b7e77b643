use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::error::ForecastError;
use super::model::{ForecastModel, ModelArchitecture};
use super::persistence::{ArtifactStore, ModelVersion};
use super::scaling::CorpusScaling;
use crate::exchange::FeatureSource;
use crate::types::{AuxiliaryQuote, FeatureRecord};

/// A price-denominated forecast for one fresh snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub predicted_price: Decimal,
    pub current_price: Option<Decimal>,
    pub missing_fields: Vec<&'static str>,
    pub failed_sources: Vec<String>,
    pub auxiliary: Option<AuxiliaryQuote>,
    pub captured_at: DateTime<Utc>,
}

impl Prediction {
    pub fn change(&self) -> Option<Decimal> {
        self.current_price.map(|c| self.predicted_price - c)
    }

    pub fn change_pct(&self) -> Option<Decimal> {
        let current = self.current_price.filter(|c| !c.is_zero())?;
        Some(((self.predicted_price - current) / current * Decimal::ONE_HUNDRED).round_dp(3))
    }
}

/// Normalize a record, run the model in inference mode and map the output
/// back to price units. Shared by training evaluation and live prediction.
pub fn forecast_price(
    model: &ForecastModel,
    scaling: &CorpusScaling,
    record: &FeatureRecord,
) -> Result<f64, ForecastError> {
    let normalized = scaling.normalize_record(record)?;
    let output = model.predict_one(&normalized)?;
    let price = scaling.denormalize_label(output)?;
    if !price.is_finite() {
        return Err(ForecastError::InvalidPrediction { value: price });
    }
    Ok(price)
}

fn to_cents(price: f64) -> Result<Decimal, ForecastError> {
    Decimal::from_f64(price)
        .map(|d| d.round_dp(2))
        .ok_or(ForecastError::InvalidPrediction { value: price })
}

/// Serves forecasts from a trained model and the scaling of its corpus.
/// Holds both read-only.
#[derive(Debug, Clone)]
pub struct Predictor {
    model: ForecastModel,
    scaling: CorpusScaling,
    version: Option<ModelVersion>,
}

impl Predictor {
    /// Pair an in-memory model with the scaling it was trained under
    pub fn from_parts(model: ForecastModel, scaling: CorpusScaling) -> Result<Self, ForecastError> {
        let input_dim = model.architecture().input_dim;
        if scaling.features.dims() != input_dim {
            return Err(ForecastError::ArchitectureMismatch {
                detail: format!(
                    "model expects {} inputs but scaling covers {} features",
                    input_dim,
                    scaling.features.dims()
                ),
            });
        }
        Ok(Self {
            model,
            scaling,
            version: None,
        })
    }

    /// Load persisted artifacts; both must come from the same corpus
    pub fn load(store: &ArtifactStore, expected: &ModelArchitecture) -> Result<Self, ForecastError> {
        let artifact = store.load_model(expected)?;
        let scaling = store.load_scaling()?;

        if artifact.corpus_digest != scaling.corpus_digest {
            return Err(ForecastError::ArtifactLineage {
                model_corpus: short_digest(&artifact.corpus_digest),
                scaling_corpus: short_digest(&scaling.corpus_digest),
            });
        }

        let mut predictor = Self::from_parts(artifact.model, scaling)?;
        predictor.version = Some(artifact.version);
        Ok(predictor)
    }

    pub fn version(&self) -> Option<&ModelVersion> {
        self.version.as_ref()
    }

    pub fn predict_record(&self, record: &FeatureRecord) -> Result<f64, ForecastError> {
        forecast_price(&self.model, &self.scaling, record)
    }

    /// Fetch one snapshot and forecast the price one horizon ahead
    pub async fn predict(&self, source: &dyn FeatureSource) -> Result<Prediction, ForecastError> {
        let snapshot = source.fetch_current().await?;
        if !snapshot.is_complete() {
            warn!(
                "Predicting with sentinel values for: {}",
                snapshot.missing_fields.join(", ")
            );
        }

        let price = self.predict_record(&snapshot.record)?;
        let prediction = Prediction {
            predicted_price: to_cents(price)?,
            current_price: snapshot.reference_price.and_then(Decimal::from_f64),
            missing_fields: snapshot.missing_fields,
            failed_sources: snapshot.failed_sources,
            auxiliary: snapshot.auxiliary,
            captured_at: snapshot.captured_at,
        };

        info!(
            "Predicted {} (current {})",
            prediction.predicted_price,
            prediction
                .current_price
                .map(|p| p.round_dp(2).to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(prediction)
    }
}

fn short_digest(digest: &str) -> String {
    digest.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::exchange::MockFeatureSource;
    use crate::ml::persistence::TrainingMetrics;
    use crate::types::{LabeledSample, MarketSnapshot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn record(i: usize) -> FeatureRecord {
        let t = i as f64;
        FeatureRecord::from_array([
            30_000.0 + 50.0 * t,
            2.0e10 + 1.0e8 * t,
            5.0e11 + 1.0e9 * t,
            19_000_000.0 + 10.0 * t,
            21_000_000.0,
            0.1 * t,
            0.5 + 0.05 * t,
            2.0 - 0.1 * t,
            1_500.0 + 3.0 * t,
            30_010.0 + 50.0 * t,
            30_005.0 + 50.0 * t,
            29_995.0 + 50.0 * t,
        ])
    }

    fn corpus(n: usize) -> Corpus {
        (0..n)
            .map(|i| LabeledSample::new(record(i), 30_000.0 + 50.0 * (i + 1) as f64))
            .collect()
    }

    fn predictor() -> Predictor {
        let corpus = corpus(8);
        let scaling = CorpusScaling::fit(&corpus).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let model = ForecastModel::new(ModelArchitecture::standard(), &mut rng).unwrap();
        Predictor::from_parts(model, scaling).unwrap()
    }

    fn snapshot(record: FeatureRecord, missing: Vec<&'static str>) -> MarketSnapshot {
        MarketSnapshot {
            record,
            reference_price: Some(record.price_usd),
            missing_fields: missing,
            failed_sources: Vec::new(),
            auxiliary: None,
            captured_at: Utc::now(),
        }
    }

    fn metrics() -> TrainingMetrics {
        TrainingMetrics {
            samples: 8,
            fit_samples: 6,
            held_out_samples: 2,
            epochs: 1,
            final_loss: 0.1,
            held_out_mae: None,
            held_out_mape: None,
        }
    }

    #[test]
    fn test_prediction_change() {
        let p = Prediction {
            predicted_price: dec!(30150.00),
            current_price: Some(dec!(30000)),
            missing_fields: Vec::new(),
            failed_sources: Vec::new(),
            auxiliary: None,
            captured_at: Utc::now(),
        };
        assert_eq!(p.change(), Some(dec!(150.00)));
        assert_eq!(p.change_pct(), Some(dec!(0.5)));
    }

    #[test]
    fn test_to_cents_rounds_and_rejects_nan() {
        assert_eq!(to_cents(30123.456).unwrap(), dec!(30123.46));
        assert!(matches!(
            to_cents(f64::NAN),
            Err(ForecastError::InvalidPrediction { .. })
        ));
    }

    #[tokio::test]
    async fn test_predict_uses_fresh_snapshot() {
        let predictor = predictor();
        let expected = predictor.predict_record(&record(3)).unwrap();

        let mut source = MockFeatureSource::new();
        source
            .expect_fetch_current()
            .times(1)
            .returning(|| Ok(snapshot(record(3), Vec::new())));

        let prediction = predictor.predict(&source).await.unwrap();
        assert_eq!(prediction.predicted_price, to_cents(expected).unwrap());
        assert_eq!(prediction.current_price, Some(dec!(30150)));
    }

    #[tokio::test]
    async fn test_partial_snapshot_lists_missing_fields() {
        let predictor = predictor();
        let mut values = record(4).to_array();
        values[8] = 0.0;
        values[9] = 0.0;
        let partial = FeatureRecord::from_array(values);

        let mut source = MockFeatureSource::new();
        source
            .expect_fetch_current()
            .returning(move || Ok(snapshot(partial, vec!["bitstamp_volume", "bitstamp_vwap"])));

        let prediction = predictor.predict(&source).await.unwrap();
        assert_eq!(prediction.missing_fields, vec!["bitstamp_volume", "bitstamp_vwap"]);
    }

    #[tokio::test]
    async fn test_total_source_failure_propagates() {
        let predictor = predictor();
        let mut source = MockFeatureSource::new();
        source.expect_fetch_current().returning(|| {
            Err(ForecastError::DataUnavailable {
                failures: vec!["coingecko: request timed out".to_string()],
            })
        });

        let err = predictor.predict(&source).await.unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    #[test]
    fn test_scaling_width_must_match_model() {
        let scaling = CorpusScaling::fit(&corpus(6)).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let arch = ModelArchitecture::standard().with_input_dim(10);
        let model = ForecastModel::new(arch, &mut rng).unwrap();
        let err = Predictor::from_parts(model, scaling).unwrap_err();
        assert!(matches!(err, ForecastError::ArchitectureMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_mixed_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let old = corpus(6);
        let new = corpus(9);
        let mut rng = StdRng::seed_from_u64(4);
        let model = ForecastModel::new(ModelArchitecture::standard(), &mut rng).unwrap();

        store.save_model(model, &old.digest(), metrics()).unwrap();
        store.save_scaling(&CorpusScaling::fit(&new).unwrap()).unwrap();

        let err = Predictor::load(&store, &ModelArchitecture::standard()).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactLineage { .. }));
    }

    #[test]
    fn test_load_requires_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let mut rng = StdRng::seed_from_u64(4);
        let model = ForecastModel::new(ModelArchitecture::standard(), &mut rng).unwrap();
        store.save_model(model, "abc", metrics()).unwrap();

        match Predictor::load(&store, &ModelArchitecture::standard()).unwrap_err() {
            ForecastError::MissingArtifact { artifact, .. } => {
                assert_eq!(artifact, crate::ml::error::ArtifactKind::Scaling)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_matching_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let corpus = corpus(6);
        let mut rng = StdRng::seed_from_u64(4);
        let model = ForecastModel::new(ModelArchitecture::standard(), &mut rng).unwrap();

        store.save_model(model, &corpus.digest(), metrics()).unwrap();
        store.save_scaling(&CorpusScaling::fit(&corpus).unwrap()).unwrap();

        let predictor = Predictor::load(&store, &ModelArchitecture::standard()).unwrap();
        assert_eq!(predictor.version().map(|v| v.to_string()), Some("1.0.0".to_string()));
        assert!(predictor.predict_record(&record(2)).unwrap().is_finite());
    }
}
