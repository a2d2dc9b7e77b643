use ndarray::{Array1, Array2, Array3, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ForecastError;
use super::network::{
    dropout_mask, BatchNorm, BatchNormCache, BatchNormGrads, Dense, DenseGrads, GruCache,
    GruGrads, GruLayer, Nadam,
};
use crate::types::FeatureRecord;

/// Declared topology of the forecast network.
///
/// Persisted next to the weights; a loader compares it with the topology it
/// expects before touching any tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub revision: u32,
    pub input_dim: usize,
    pub recurrent_units: Vec<usize>,
    pub dropout_rates: Vec<f64>,
}

impl ModelArchitecture {
    pub const REVISION: u32 = 1;

    /// Dense 12→12, batch norm, GRU 40/70/70/40, Dense 40→1
    pub fn standard() -> Self {
        Self {
            revision: Self::REVISION,
            input_dim: FeatureRecord::NUM_FEATURES,
            recurrent_units: vec![40, 70, 70, 40],
            dropout_rates: vec![0.4, 0.3, 0.4, 0.4],
        }
    }

    #[cfg(test)]
    pub fn with_input_dim(mut self, input_dim: usize) -> Self {
        self.input_dim = input_dim;
        self
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        let fail = |detail: String| Err(ForecastError::ArchitectureMismatch { detail });

        if self.input_dim == 0 {
            return fail("input width must be > 0".to_string());
        }
        if self.recurrent_units.is_empty() {
            return fail("at least one recurrent stage is required".to_string());
        }
        if self.recurrent_units.contains(&0) {
            return fail(format!("recurrent widths must be > 0, got {:?}", self.recurrent_units));
        }
        if self.dropout_rates.len() != self.recurrent_units.len() {
            return fail(format!(
                "{} dropout rates for {} recurrent stages",
                self.dropout_rates.len(),
                self.recurrent_units.len()
            ));
        }
        if self.dropout_rates.iter().any(|r| !(0.0..1.0).contains(r)) {
            return fail(format!("dropout rates must be in [0, 1), got {:?}", self.dropout_rates));
        }
        Ok(())
    }

    /// Compare a declared topology (self) against the one a caller expects
    pub fn ensure_matches(&self, expected: &ModelArchitecture) -> Result<(), ForecastError> {
        let mut diffs = Vec::new();
        if self.revision != expected.revision {
            diffs.push(format!("revision {} != {}", self.revision, expected.revision));
        }
        if self.input_dim != expected.input_dim {
            diffs.push(format!(
                "input width {} != expected {}",
                self.input_dim, expected.input_dim
            ));
        }
        if self.recurrent_units != expected.recurrent_units {
            diffs.push(format!(
                "recurrent widths {:?} != expected {:?}",
                self.recurrent_units, expected.recurrent_units
            ));
        }
        if self.dropout_rates != expected.dropout_rates {
            diffs.push(format!(
                "dropout rates {:?} != expected {:?}",
                self.dropout_rates, expected.dropout_rates
            ));
        }

        if diffs.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::ArchitectureMismatch {
                detail: diffs.join(", "),
            })
        }
    }
}

impl Default for ModelArchitecture {
    fn default() -> Self {
        Self::standard()
    }
}

/// Stacked-GRU regressor from a normalized feature vector to a normalized
/// price. Each input row is treated as a sequence of length one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastModel {
    architecture: ModelArchitecture,
    input: Dense,
    norm: BatchNorm,
    recurrent: Vec<GruLayer>,
    output: Dense,
}

/// Gradients for every trainable tensor, mirroring the model layout
#[derive(Debug, Clone)]
pub struct ModelGrads {
    pub input: DenseGrads,
    pub norm: BatchNormGrads,
    pub recurrent: Vec<GruGrads>,
    pub output: DenseGrads,
}

impl ModelGrads {
    /// Same order as `ForecastModel::params_mut`
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut views = self.input.views();
        views.extend(self.norm.views());
        for layer in &self.recurrent {
            views.extend(layer.views());
        }
        views.extend(self.output.views());
        views
    }
}

/// Result of one training-mode forward and backward pass
#[derive(Debug, Clone)]
pub struct TrainingPass {
    pub loss: f64,
    pub grads: ModelGrads,
    norm_stats: BatchNormCache,
}

impl ForecastModel {
    pub fn new<R: Rng + ?Sized>(
        architecture: ModelArchitecture,
        rng: &mut R,
    ) -> Result<Self, ForecastError> {
        architecture.validate()?;

        let width = architecture.input_dim;
        let input = Dense::new(width, width, rng);
        let norm = BatchNorm::new(width);

        let mut recurrent = Vec::with_capacity(architecture.recurrent_units.len());
        let mut fan_in = width;
        for &units in &architecture.recurrent_units {
            recurrent.push(GruLayer::new(fan_in, units, rng));
            fan_in = units;
        }
        let output = Dense::new(fan_in, 1, rng);

        Ok(Self {
            architecture,
            input,
            norm,
            recurrent,
            output,
        })
    }

    pub fn architecture(&self) -> &ModelArchitecture {
        &self.architecture
    }

    /// Verify every tensor has the shape its declared architecture implies
    pub fn check_shapes(&self) -> Result<(), ForecastError> {
        self.architecture.validate()?;
        let arch = &self.architecture;
        let mismatch = |detail: String| ForecastError::ArchitectureMismatch { detail };

        if self.recurrent.len() != arch.recurrent_units.len() {
            return Err(mismatch(format!(
                "declared {} recurrent stages, found {}",
                arch.recurrent_units.len(),
                self.recurrent.len()
            )));
        }

        self.input
            .check_shape("input", arch.input_dim, arch.input_dim)
            .map_err(mismatch)?;
        self.norm.check_shape(arch.input_dim).map_err(mismatch)?;

        let mut fan_in = arch.input_dim;
        for (i, (layer, &units)) in self.recurrent.iter().zip(&arch.recurrent_units).enumerate() {
            layer
                .check_shape(&format!("gru_{}", i), fan_in, units)
                .map_err(mismatch)?;
            fan_in = units;
        }
        self.output.check_shape("output", fan_in, 1).map_err(mismatch)?;
        Ok(())
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<(), ForecastError> {
        if x.ncols() != self.architecture.input_dim {
            return Err(ForecastError::DimensionMismatch {
                expected: self.architecture.input_dim,
                actual: x.ncols(),
            });
        }
        if x.nrows() == 0 {
            return Err(ForecastError::InsufficientData {
                operation: "forward pass",
                required: 1,
                available: 0,
            });
        }
        Ok(())
    }

    /// Inference: running batch-norm statistics, no dropout
    pub fn predict_batch(&self, x: &Array2<f64>) -> Result<Array1<f64>, ForecastError> {
        self.check_input(x)?;

        let projected = self.input.forward(&x.view());
        // (batch, 12) -> (batch, 1, 12); normalization runs over the feature axis
        let mut seq: Array3<f64> = self.norm.forward(&projected).insert_axis(Axis(1));
        for layer in &self.recurrent {
            seq = layer.forward(&seq);
        }
        let last = last_step(&seq);
        let out = self.output.forward(&last.view());
        Ok(out.column(0).to_owned())
    }

    pub fn predict_one(&self, features: &[f64]) -> Result<f64, ForecastError> {
        let x = Array2::from_shape_vec((1, features.len()), features.to_vec()).map_err(|_| {
            ForecastError::DimensionMismatch {
                expected: self.architecture.input_dim,
                actual: features.len(),
            }
        })?;
        let y = self.predict_batch(&x)?;
        Ok(y[0])
    }

    /// Training-mode forward pass (batch statistics, dropout) followed by full
    /// backpropagation of the MSE loss. Does not modify the model.
    pub fn loss_and_grads<R: Rng + ?Sized>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut R,
    ) -> Result<TrainingPass, ForecastError> {
        self.check_input(x)?;
        check_targets(x, y)?;
        let batch = x.nrows();

        // forward
        let projected = self.input.forward(&x.view());
        let (normed, norm_cache) = self.norm.forward_train(&projected);
        let mut seq: Array3<f64> = normed.insert_axis(Axis(1));

        let mut caches: Vec<(GruCache, Array3<f64>)> = Vec::with_capacity(self.recurrent.len());
        for (layer, &rate) in self.recurrent.iter().zip(&self.architecture.dropout_rates) {
            let (h, cache) = layer.forward_train(&seq);
            let mask = dropout_mask(h.raw_dim(), rate, rng);
            seq = h * &mask;
            caches.push((cache, mask));
        }

        let last = last_step(&seq);
        let predictions = self.output.forward(&last.view()).column(0).to_owned();
        let residual = &predictions - y;
        let loss = residual.mapv(|d| d * d).mean().unwrap_or(0.0);

        // backward
        let d_pred = (residual * (2.0 / batch as f64)).insert_axis(Axis(1));
        let (d_last, output_grads) = self.output.backward(&last.view(), &d_pred);

        let (steps, units) = (seq.len_of(Axis(1)), seq.len_of(Axis(2)));
        let mut d_seq = Array3::<f64>::zeros((batch, steps, units));
        d_seq.index_axis_mut(Axis(1), steps - 1).assign(&d_last);

        let mut recurrent_grads = Vec::with_capacity(self.recurrent.len());
        for (layer, (cache, mask)) in self.recurrent.iter().zip(&caches).rev() {
            let (d_in, grads) = layer.backward(cache, &(d_seq * mask));
            d_seq = d_in;
            recurrent_grads.push(grads);
        }
        recurrent_grads.reverse();

        let d_normed = d_seq.index_axis_move(Axis(1), 0);
        let (d_projected, norm_grads) = self.norm.backward(&norm_cache, &d_normed);
        let (_, input_grads) = self.input.backward(&x.view(), &d_projected);

        Ok(TrainingPass {
            loss,
            grads: ModelGrads {
                input: input_grads,
                norm: norm_grads,
                recurrent: recurrent_grads,
                output: output_grads,
            },
            norm_stats: norm_cache,
        })
    }

    /// One optimizer step on one mini-batch; returns the batch loss
    pub fn train_batch<R: Rng + ?Sized>(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        optimizer: &mut Nadam,
        rng: &mut R,
    ) -> Result<f64, ForecastError> {
        let pass = self.loss_and_grads(x, y, rng)?;
        if !pass.loss.is_finite() {
            return Err(ForecastError::InvalidPrediction { value: pass.loss });
        }

        self.norm.update_running(&pass.norm_stats);
        optimizer.step(self.params_mut(), pass.grads.views())?;
        debug!("batch of {} rows, loss {:.6}", x.nrows(), pass.loss);
        Ok(pass.loss)
    }

    /// Every trainable tensor in a fixed order
    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut params = self.input.params_mut();
        params.extend(self.norm.params_mut());
        for layer in &mut self.recurrent {
            params.extend(layer.params_mut());
        }
        params.extend(self.output.params_mut());
        params
    }

    pub fn parameter_count(&mut self) -> usize {
        self.params_mut().iter().map(|p| p.len()).sum()
    }
}

fn last_step(seq: &Array3<f64>) -> Array2<f64> {
    let steps = seq.len_of(Axis(1));
    seq.index_axis(Axis(1), steps.saturating_sub(1)).to_owned()
}

fn check_targets(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ForecastError> {
    if x.nrows() != y.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    Ok(())
}
