use ndarray::{Array1, Array2, Array3, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{glorot_uniform, sigmoid};

/// Gated recurrent unit over a (batch, time, features) sequence.
///
/// Gate equations, with zero initial state:
///   z = σ(x·Wxz + h·Whz + bz)
///   r = σ(x·Wxr + h·Whr + br)
///   n = tanh(x·Wxn + (r ⊙ h)·Whn + bn)
///   h' = (1 - z) ⊙ n + z ⊙ h
///
/// Always returns the full output sequence; collapsing to the last step is
/// left to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruLayer {
    wx_z: Array2<f64>,
    wx_r: Array2<f64>,
    wx_n: Array2<f64>,
    wh_z: Array2<f64>,
    wh_r: Array2<f64>,
    wh_n: Array2<f64>,
    b_z: Array1<f64>,
    b_r: Array1<f64>,
    b_n: Array1<f64>,
}

#[derive(Debug, Clone)]
struct GruStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    z: Array2<f64>,
    r: Array2<f64>,
    n: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct GruCache {
    steps: Vec<GruStep>,
}

#[derive(Debug, Clone)]
pub struct GruGrads {
    pub wx_z: Array2<f64>,
    pub wx_r: Array2<f64>,
    pub wx_n: Array2<f64>,
    pub wh_z: Array2<f64>,
    pub wh_r: Array2<f64>,
    pub wh_n: Array2<f64>,
    pub b_z: Array1<f64>,
    pub b_r: Array1<f64>,
    pub b_n: Array1<f64>,
}

impl GruLayer {
    pub fn new<R: Rng + ?Sized>(input_dim: usize, units: usize, rng: &mut R) -> Self {
        Self {
            wx_z: glorot_uniform(input_dim, units, rng),
            wx_r: glorot_uniform(input_dim, units, rng),
            wx_n: glorot_uniform(input_dim, units, rng),
            wh_z: glorot_uniform(units, units, rng),
            wh_r: glorot_uniform(units, units, rng),
            wh_n: glorot_uniform(units, units, rng),
            b_z: Array1::zeros(units),
            b_r: Array1::zeros(units),
            b_n: Array1::zeros(units),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.wx_z.nrows()
    }

    pub fn units(&self) -> usize {
        self.wx_z.ncols()
    }

    pub fn forward(&self, x: &Array3<f64>) -> Array3<f64> {
        self.run(x, false).0
    }

    pub fn forward_train(&self, x: &Array3<f64>) -> (Array3<f64>, GruCache) {
        self.run(x, true)
    }

    fn run(&self, x: &Array3<f64>, keep: bool) -> (Array3<f64>, GruCache) {
        let (batch, steps, _) = x.dim();
        let units = self.units();

        let mut h = Array2::<f64>::zeros((batch, units));
        let mut out = Array3::<f64>::zeros((batch, steps, units));
        let mut cache = Vec::with_capacity(if keep { steps } else { 0 });

        for t in 0..steps {
            let x_t = x.index_axis(Axis(1), t);
            let z = sigmoid(x_t.dot(&self.wx_z) + h.dot(&self.wh_z) + &self.b_z);
            let r = sigmoid(x_t.dot(&self.wx_r) + h.dot(&self.wh_r) + &self.b_r);
            let n = (x_t.dot(&self.wx_n) + (&r * &h).dot(&self.wh_n) + &self.b_n).mapv_into(f64::tanh);

            let h_next = (1.0 - &z) * &n + &z * &h;
            out.index_axis_mut(Axis(1), t).assign(&h_next);

            if keep {
                cache.push(GruStep {
                    x: x_t.to_owned(),
                    h_prev: h,
                    z,
                    r,
                    n,
                });
            }
            h = h_next;
        }

        (out, GruCache { steps: cache })
    }

    /// Backpropagation through time. `dy` is the gradient w.r.t. every
    /// output step (zeros where a step does not feed the loss).
    pub fn backward(&self, cache: &GruCache, dy: &Array3<f64>) -> (Array3<f64>, GruGrads) {
        let (batch, steps, units) = dy.dim();
        let mut grads = GruGrads::zeros(self.input_dim(), units);
        let mut dx = Array3::<f64>::zeros((batch, steps, self.input_dim()));
        let mut dh_next = Array2::<f64>::zeros((batch, units));

        for (t, s) in cache.steps.iter().enumerate().rev() {
            let dh = &dy.index_axis(Axis(1), t) + &dh_next;

            let dn = &dh * &(1.0 - &s.z);
            let dz = &dh * &(&s.h_prev - &s.n);
            let mut dh_prev = &dh * &s.z;

            // candidate
            let da_n = dn * &(1.0 - &s.n * &s.n);
            let rh = &s.r * &s.h_prev;
            grads.wx_n += &s.x.t().dot(&da_n);
            grads.wh_n += &rh.t().dot(&da_n);
            grads.b_n += &da_n.sum_axis(Axis(0));

            let drh = da_n.dot(&self.wh_n.t());
            let dr = &drh * &s.h_prev;
            dh_prev += &(&drh * &s.r);

            // gates
            let da_z = dz * &(&s.z * &(1.0 - &s.z));
            let da_r = dr * &(&s.r * &(1.0 - &s.r));
            grads.wx_z += &s.x.t().dot(&da_z);
            grads.wh_z += &s.h_prev.t().dot(&da_z);
            grads.b_z += &da_z.sum_axis(Axis(0));
            grads.wx_r += &s.x.t().dot(&da_r);
            grads.wh_r += &s.h_prev.t().dot(&da_r);
            grads.b_r += &da_r.sum_axis(Axis(0));

            let dx_t = da_z.dot(&self.wx_z.t()) + da_r.dot(&self.wx_r.t()) + da_n.dot(&self.wx_n.t());
            dx.index_axis_mut(Axis(1), t).assign(&dx_t);

            dh_prev += &da_z.dot(&self.wh_z.t());
            dh_prev += &da_r.dot(&self.wh_r.t());
            dh_next = dh_prev;
        }

        (dx, grads)
    }

    /// Fixed order: input kernels, recurrent kernels, biases (z, r, n each)
    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.wx_z.view_mut().into_dyn(),
            self.wx_r.view_mut().into_dyn(),
            self.wx_n.view_mut().into_dyn(),
            self.wh_z.view_mut().into_dyn(),
            self.wh_r.view_mut().into_dyn(),
            self.wh_n.view_mut().into_dyn(),
            self.b_z.view_mut().into_dyn(),
            self.b_r.view_mut().into_dyn(),
            self.b_n.view_mut().into_dyn(),
        ]
    }

    pub fn check_shape(&self, name: &str, input_dim: usize, units: usize) -> Result<(), String> {
        let kernels = [&self.wx_z, &self.wx_r, &self.wx_n];
        let recurrent = [&self.wh_z, &self.wh_r, &self.wh_n];
        let biases = [&self.b_z, &self.b_r, &self.b_n];

        if let Some(k) = kernels.iter().find(|k| k.dim() != (input_dim, units)) {
            return Err(format!(
                "{}: expected input kernel {}x{}, found {}x{}",
                name,
                input_dim,
                units,
                k.nrows(),
                k.ncols()
            ));
        }
        if let Some(k) = recurrent.iter().find(|k| k.dim() != (units, units)) {
            return Err(format!(
                "{}: expected recurrent kernel {}x{}, found {}x{}",
                name,
                units,
                units,
                k.nrows(),
                k.ncols()
            ));
        }
        if let Some(b) = biases.iter().find(|b| b.len() != units) {
            return Err(format!("{}: expected bias {}, found {}", name, units, b.len()));
        }
        Ok(())
    }
}

impl GruGrads {
    fn zeros(input_dim: usize, units: usize) -> Self {
        Self {
            wx_z: Array2::zeros((input_dim, units)),
            wx_r: Array2::zeros((input_dim, units)),
            wx_n: Array2::zeros((input_dim, units)),
            wh_z: Array2::zeros((units, units)),
            wh_r: Array2::zeros((units, units)),
            wh_n: Array2::zeros((units, units)),
            b_z: Array1::zeros(units),
            b_r: Array1::zeros(units),
            b_n: Array1::zeros(units),
        }
    }

    /// Same order as `GruLayer::params_mut`
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![
            self.wx_z.view().into_dyn(),
            self.wx_r.view().into_dyn(),
            self.wx_n.view().into_dyn(),
            self.wh_z.view().into_dyn(),
            self.wh_r.view().into_dyn(),
            self.wh_n.view().into_dyn(),
            self.b_z.view().into_dyn(),
            self.b_r.view().into_dyn(),
            self.b_n.view().into_dyn(),
        ]
    }
}
