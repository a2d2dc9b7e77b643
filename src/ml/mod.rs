pub mod error;
pub mod scaling;
pub mod network;
pub mod model;
pub mod persistence;
pub mod trainer;
pub mod predictor;

pub use model::ModelArchitecture;
pub use persistence::ArtifactStore;
pub use trainer::{Trainer, TrainingConfig};
pub use predictor::Predictor;
