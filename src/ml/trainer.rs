use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use super::error::ForecastError;
use super::model::{ForecastModel, ModelArchitecture};
use super::network::Nadam;
use super::persistence::{ArtifactStore, ModelVersion, TrainingMetrics};
use super::predictor::forecast_price;
use super::scaling::CorpusScaling;
use crate::config::TrainingSettings;
use crate::corpus::Corpus;
use crate::report;

/// Smallest corpus any configuration may train on
pub const MIN_TRAINING_SAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub max_batch_size: usize,
    pub min_samples: usize,
    /// Trailing samples never used for parameter updates
    pub holdout: usize,
    /// Trailing samples shown in the evaluation report
    pub evaluation_window: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
    pub architecture: ModelArchitecture,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            max_batch_size: 10,
            min_samples: MIN_TRAINING_SAMPLES,
            holdout: 2,
            evaluation_window: 10,
            learning_rate: 0.002,
            seed: None,
            architecture: ModelArchitecture::standard(),
        }
    }
}

impl From<&TrainingSettings> for TrainingConfig {
    fn from(settings: &TrainingSettings) -> Self {
        Self {
            epochs: settings.effective_epochs(),
            max_batch_size: settings.max_batch_size,
            min_samples: settings.min_samples,
            holdout: settings.holdout,
            evaluation_window: settings.evaluation_window,
            learning_rate: settings.learning_rate,
            seed: settings.seed,
            architecture: ModelArchitecture::standard(),
        }
    }
}

/// One row of the actual-vs-predicted comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRow {
    pub index: usize,
    pub actual: f64,
    pub predicted: f64,
    pub held_out: bool,
}

impl EvaluationRow {
    pub fn error(&self) -> f64 {
        self.predicted - self.actual
    }

    /// Absolute error as a percentage of the actual price
    pub fn pct_error(&self) -> Option<f64> {
        (self.actual != 0.0).then(|| (self.error() / self.actual).abs() * 100.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub rows: Vec<EvaluationRow>,
    pub held_out_mae: Option<f64>,
    /// Percent
    pub held_out_mape: Option<f64>,
}

impl EvaluationReport {
    pub fn from_rows(rows: Vec<EvaluationRow>) -> Self {
        let held_out: Vec<&EvaluationRow> = rows.iter().filter(|r| r.held_out).collect();

        let held_out_mae = (!held_out.is_empty()).then(|| {
            held_out.iter().map(|r| r.error().abs()).sum::<f64>() / held_out.len() as f64
        });

        let pct: Vec<f64> = held_out.iter().filter_map(|r| r.pct_error()).collect();
        let held_out_mape = (!pct.is_empty()).then(|| pct.iter().sum::<f64>() / pct.len() as f64);

        Self {
            rows,
            held_out_mae,
            held_out_mape,
        }
    }
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: ForecastModel,
    pub scaling: CorpusScaling,
    pub report: EvaluationReport,
    pub loss_history: Vec<f64>,
    pub metrics: TrainingMetrics,
}

/// Outcome plus the version it was persisted under
#[derive(Debug, Clone)]
pub struct PersistedTraining {
    pub outcome: TrainingOutcome,
    pub version: ModelVersion,
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Fit scaling on the whole corpus, train on its chronological head and
    /// evaluate the trailing window
    pub fn train(&self, corpus: &Corpus) -> Result<TrainingOutcome, ForecastError> {
        let cfg = &self.config;
        let n = corpus.len();
        let required = cfg.min_samples.max(MIN_TRAINING_SAMPLES);
        if n < required {
            return Err(ForecastError::InsufficientData {
                operation: "training",
                required,
                available: n,
            });
        }

        info!("━━━ Step 1: Fit scaling ━━━");
        let scaling = CorpusScaling::fit(corpus)?;
        for column in scaling.features.degenerate_columns() {
            info!("  {}", column);
        }

        let rows: Vec<Vec<f64>> = corpus
            .samples()
            .iter()
            .map(|s| s.features.to_array().to_vec())
            .collect();
        let x = scaling.features.forward_rows(&rows)?;
        let y = corpus
            .samples()
            .iter()
            .map(|s| scaling.normalize_label(s.label))
            .collect::<Result<Array1<f64>, _>>()?;

        let fit_n = n.saturating_sub(cfg.holdout).max(1);
        let batch_size = cfg.max_batch_size.max(1).min(fit_n);
        info!(
            "━━━ Step 2: Train ({} fit / {} held out, batch {}, {} epochs) ━━━",
            fit_n,
            n - fit_n,
            batch_size,
            cfg.epochs
        );

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut model = ForecastModel::new(cfg.architecture.clone(), &mut rng)?;
        let mut optimizer = Nadam::new(cfg.learning_rate);
        info!("  {} trainable parameters", model.parameter_count());

        let mut loss_history = Vec::with_capacity(cfg.epochs);
        for epoch in 0..cfg.epochs {
            let mut weighted = 0.0;
            for batch in shuffled_batches(fit_n, batch_size, &mut rng) {
                let xb = x.select(Axis(0), &batch);
                let yb = y.select(Axis(0), &batch);
                let loss = model.train_batch(&xb, &yb, &mut optimizer, &mut rng)?;
                weighted += loss * batch.len() as f64;
            }
            let epoch_loss = weighted / fit_n as f64;
            loss_history.push(epoch_loss);

            debug!("epoch {}/{}: loss {:.6}", epoch + 1, cfg.epochs, epoch_loss);
            if (epoch + 1) % 50 == 0 || epoch + 1 == cfg.epochs {
                info!("  Epoch {}/{}: loss {:.6}", epoch + 1, cfg.epochs, epoch_loss);
            }
        }

        info!("━━━ Step 3: Evaluate ━━━");
        let window = cfg.evaluation_window.min(n);
        let mut eval_rows = Vec::with_capacity(window);
        for (index, sample) in corpus.samples().iter().enumerate().skip(n - window) {
            let predicted = forecast_price(&model, &scaling, &sample.features)?;
            eval_rows.push(EvaluationRow {
                index,
                actual: sample.label,
                predicted,
                held_out: index >= fit_n,
            });
        }
        let report = EvaluationReport::from_rows(eval_rows);

        if let Some(mae) = report.held_out_mae {
            info!(
                "  Held-out MAE: {:.2} | MAPE: {}",
                mae,
                report
                    .held_out_mape
                    .map(|m| format!("{:.2}%", m))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }

        let metrics = TrainingMetrics {
            samples: n,
            fit_samples: fit_n,
            held_out_samples: n - fit_n,
            epochs: cfg.epochs,
            final_loss: loss_history.last().copied().unwrap_or(f64::NAN),
            held_out_mae: report.held_out_mae,
            held_out_mape: report.held_out_mape,
        };

        Ok(TrainingOutcome {
            model,
            scaling,
            report,
            loss_history,
            metrics,
        })
    }

    /// Train, then persist scaling, model and the comparison table
    pub fn train_and_persist(
        &self,
        corpus: &Corpus,
        store: &ArtifactStore,
        results_path: &Path,
    ) -> Result<PersistedTraining, ForecastError> {
        let outcome = self.train(corpus)?;

        info!("━━━ Step 4: Persist ━━━");
        store.save_scaling(&outcome.scaling)?;
        let artifact = store.save_model(
            outcome.model.clone(),
            &outcome.scaling.corpus_digest,
            outcome.metrics.clone(),
        )?;
        report::write_comparison_csv(results_path, &outcome.report)?;
        info!("  Comparison table written to {}", results_path.display());

        Ok(PersistedTraining {
            outcome,
            version: artifact.version,
        })
    }
}

/// Row indices of the fitting split in a fresh random order, cut into
/// mini-batches. Held-out rows (index >= `fit_n`) never appear.
fn shuffled_batches<R: Rng + ?Sized>(fit_n: usize, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..fit_n).collect();
    order.shuffle(rng);
    order.chunks(batch_size.max(1)).map(|c| c.to_vec()).collect()
}
