//! Hand-written layers for the forecast model.
//!
//! Every layer exposes an inference `forward(&self, ..)`, a training pass that
//! returns a cache instead of mutating the layer, and a `backward` that turns
//! the cache plus the upstream gradient into input and parameter gradients.

pub mod dense;
pub mod batch_norm;
pub mod gru;
pub mod nadam;

pub use dense::{Dense, DenseGrads};
pub use batch_norm::{BatchNorm, BatchNormCache, BatchNormGrads};
pub use gru::{GruCache, GruGrads, GruLayer};
pub use nadam::Nadam;

use ndarray::{Array, Array2, Dimension};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Glorot-uniform kernel of shape (fan_in, fan_out)
pub(crate) fn glorot_uniform<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
    Array2::random_using((fan_in, fan_out), Uniform::new(-limit, limit), rng)
}

pub(crate) fn sigmoid<D: Dimension>(a: Array<f64, D>) -> Array<f64, D> {
    a.mapv_into(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Inverted dropout mask: kept units are scaled by `1 / (1 - rate)`.
/// A zero rate yields all ones and draws nothing from the RNG.
pub(crate) fn dropout_mask<D: Dimension, R: Rng + ?Sized>(
    dim: D,
    rate: f64,
    rng: &mut R,
) -> Array<f64, D> {
    if rate <= 0.0 {
        return Array::ones(dim);
    }
    let keep = 1.0 - rate;
    Array::random_using(dim, Uniform::new(0.0, 1.0), rng)
        .mapv_into(|u| if u < keep { 1.0 / keep } else { 0.0 })
}
