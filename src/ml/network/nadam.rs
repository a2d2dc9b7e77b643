use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

use crate::ml::error::ForecastError;

/// Adam with Nesterov momentum.
///
/// Moment buffers are created lazily on the first step and are matched to
/// parameters by position, so callers must pass parameters and gradients in
/// the same fixed order every step.
#[derive(Debug, Clone)]
pub struct Nadam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    iterations: u64,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
}

impl Nadam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            iterations: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn step(
        &mut self,
        params: Vec<ArrayViewMutD<'_, f64>>,
        grads: Vec<ArrayViewD<'_, f64>>,
    ) -> Result<(), ForecastError> {
        if params.len() != grads.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: params.len(),
                actual: grads.len(),
            });
        }
        if self.m.is_empty() {
            self.m = params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
            self.v = params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
        }
        if self.m.len() != params.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.m.len(),
                actual: params.len(),
            });
        }

        self.iterations += 1;
        let t = self.iterations as i32;
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.learning_rate, self.epsilon);
        let b1_t = 1.0 - b1.powi(t);
        let b1_next = 1.0 - b1.powi(t + 1);
        let b2_t = 1.0 - b2.powi(t);

        for ((mut p, g), (m, v)) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            if p.shape() != g.shape() || p.shape() != m.shape() {
                return Err(ForecastError::DimensionMismatch {
                    expected: p.len(),
                    actual: g.len(),
                });
            }

            Zip::from(&mut p)
                .and(&g)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = b1 * *m / b1_next + (1.0 - b1) * g / b1_t;
                    let v_hat = *v / b2_t;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array1};

    #[test]
    fn test_minimizes_quadratic() {
        let mut opt = Nadam::new(0.05);
        let mut x = arr1(&[3.0, -2.0]);
        for _ in 0..500 {
            let grad: Array1<f64> = &x * 2.0;
            opt.step(vec![x.view_mut().into_dyn()], vec![grad.view().into_dyn()])
                .unwrap();
        }
        assert!(x.iter().all(|v| v.abs() < 0.1), "{:?}", x);
        assert_eq!(opt.iterations, 500);
    }

    #[test]
    fn test_first_step_moves_against_gradient() {
        let mut opt = Nadam::new(0.002);
        let mut x = arr1(&[1.0]);
        let grad = arr1(&[0.5]);
        opt.step(vec![x.view_mut().into_dyn()], vec![grad.view().into_dyn()])
            .unwrap();
        assert!(x[0] < 1.0);
        assert!(1.0 - x[0] < 0.01);
    }

    #[test]
    fn test_mismatched_lists_rejected() {
        let mut opt = Nadam::new(0.002);
        let mut x = arr1(&[1.0]);
        let err = opt.step(vec![x.view_mut().into_dyn()], vec![]).unwrap_err();
        assert!(matches!(err, ForecastError::DimensionMismatch { .. }));
    }
}
