use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use serde::{Deserialize, Serialize};

pub const MOMENTUM: f64 = 0.99;
pub const EPSILON: f64 = 1e-3;

/// Batch normalization over the feature axis.
///
/// Training uses the statistics of the current batch; inference uses the
/// running mean and variance accumulated with `momentum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    gamma: Array1<f64>,
    beta: Array1<f64>,
    running_mean: Array1<f64>,
    running_var: Array1<f64>,
    momentum: f64,
    epsilon: f64,
}

#[derive(Debug, Clone)]
pub struct BatchNormCache {
    x_hat: Array2<f64>,
    inv_std: Array1<f64>,
    mean: Array1<f64>,
    var: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct BatchNormGrads {
    pub gamma: Array1<f64>,
    pub beta: Array1<f64>,
}

impl BatchNorm {
    pub fn new(features: usize) -> Self {
        Self {
            gamma: Array1::ones(features),
            beta: Array1::zeros(features),
            running_mean: Array1::zeros(features),
            running_var: Array1::ones(features),
            momentum: MOMENTUM,
            epsilon: EPSILON,
        }
    }

    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        (x - &self.running_mean) * &inv_std * &self.gamma + &self.beta
    }

    pub fn forward_train(&self, x: &Array2<f64>) -> (Array2<f64>, BatchNormCache) {
        let n = x.nrows().max(1) as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let centered = x - &mean;
        let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
        let inv_std = var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());

        let x_hat = centered * &inv_std;
        let y = &x_hat * &self.gamma + &self.beta;
        (
            y,
            BatchNormCache {
                x_hat,
                inv_std,
                mean,
                var,
            },
        )
    }

    pub fn backward(&self, cache: &BatchNormCache, dy: &Array2<f64>) -> (Array2<f64>, BatchNormGrads) {
        let n = dy.nrows().max(1) as f64;
        let grads = BatchNormGrads {
            gamma: (dy * &cache.x_hat).sum_axis(Axis(0)),
            beta: dy.sum_axis(Axis(0)),
        };

        let dx_hat = dy * &self.gamma;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &cache.x_hat).sum_axis(Axis(0));

        let dx = (dx_hat * n - &sum_dx_hat - &cache.x_hat * &sum_dx_hat_x_hat) * &cache.inv_std / n;
        (dx, grads)
    }

    /// Fold one batch's statistics into the running estimates
    pub fn update_running(&mut self, cache: &BatchNormCache) {
        let m = self.momentum;
        self.running_mean = &self.running_mean * m + &cache.mean * (1.0 - m);
        self.running_var = &self.running_var * m + &cache.var * (1.0 - m);
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![self.gamma.view_mut().into_dyn(), self.beta.view_mut().into_dyn()]
    }

    pub fn check_shape(&self, features: usize) -> Result<(), String> {
        let lens = [
            self.gamma.len(),
            self.beta.len(),
            self.running_mean.len(),
            self.running_var.len(),
        ];
        if lens.iter().any(|&l| l != features) {
            return Err(format!(
                "batch_norm: expected {} features, found {:?}",
                features, lens
            ));
        }
        if self.running_var.iter().any(|&v| !(v >= 0.0)) {
            return Err("batch_norm: running variance must be non-negative".to_string());
        }
        Ok(())
    }
}

impl BatchNormGrads {
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![self.gamma.view().into_dyn(), self.beta.view().into_dyn()]
    }
}
