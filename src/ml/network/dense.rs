use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::glorot_uniform;

/// Fully connected layer, `y = x · W + b` with W shaped (input, output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    kernel: Array2<f64>,
    bias: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct DenseGrads {
    pub kernel: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        Self {
            kernel: glorot_uniform(input_dim, output_dim, rng),
            bias: Array1::zeros(output_dim),
        }
    }

    pub fn forward(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        x.dot(&self.kernel) + &self.bias
    }

    pub fn backward(&self, x: &ArrayView2<f64>, dy: &Array2<f64>) -> (Array2<f64>, DenseGrads) {
        let grads = DenseGrads {
            kernel: x.t().dot(dy),
            bias: dy.sum_axis(Axis(0)),
        };
        (dy.dot(&self.kernel.t()), grads)
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![self.kernel.view_mut().into_dyn(), self.bias.view_mut().into_dyn()]
    }

    pub fn check_shape(&self, name: &str, input_dim: usize, output_dim: usize) -> Result<(), String> {
        if self.kernel.dim() != (input_dim, output_dim) || self.bias.len() != output_dim {
            return Err(format!(
                "{}: expected kernel {}x{} and bias {}, found kernel {}x{} and bias {}",
                name,
                input_dim,
                output_dim,
                output_dim,
                self.kernel.nrows(),
                self.kernel.ncols(),
                self.bias.len()
            ));
        }
        Ok(())
    }
}

impl DenseGrads {
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![self.kernel.view().into_dyn(), self.bias.view().into_dyn()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward_shape_and_zero_bias() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Dense::new(3, 2, &mut rng);
        let x = Array2::zeros((5, 3));
        let y = layer.forward(&x.view());
        assert_eq!(y.dim(), (5, 2));
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_backward_matches_manual() {
        let layer = Dense {
            kernel: array![[1.0, 2.0], [3.0, 4.0]],
            bias: array![0.5, -0.5],
        };
        let x = array![[1.0, 1.0], [2.0, 0.0]];
        let dy = array![[1.0, 0.0], [0.0, 1.0]];
        let (dx, grads) = layer.backward(&x.view(), &dy);

        assert_eq!(dx, array![[1.0, 3.0], [2.0, 4.0]]);
        assert_eq!(grads.kernel, array![[1.0, 2.0], [1.0, 0.0]]);
        assert_eq!(grads.bias, array![1.0, 1.0]);
    }

    #[test]
    fn test_check_shape_reports_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Dense::new(12, 12, &mut rng);
        assert!(layer.check_shape("input", 12, 12).is_ok());
        let err = layer.check_shape("input", 10, 12).unwrap_err();
        assert!(err.contains("expected kernel 10x12"));
    }
}
