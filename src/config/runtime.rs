use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::profiles::TrainingProfile;
use crate::ml::trainer::MIN_TRAINING_SAMPLES;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataSettings,
    pub sources: SourceSettings,
    pub training: TrainingSettings,
    pub collector: CollectorSettings,
}

impl AppConfig {
    /// Layered load: defaults, then the optional TOML file, then
    /// `FORECAST__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("FORECAST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config
            .validate()
            .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config
            .validate()
            .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Training validation
        if self.training.effective_epochs() == 0 {
            errors.push("training.epochs must be > 0".to_string());
        }
        if self.training.max_batch_size == 0 {
            errors.push("training.max_batch_size must be > 0".to_string());
        }
        if self.training.min_samples < MIN_TRAINING_SAMPLES {
            errors.push(format!(
                "training.min_samples must be >= {}",
                MIN_TRAINING_SAMPLES
            ));
        }
        if self.training.min_samples < self.training.holdout + 1 {
            errors.push("training.min_samples must exceed training.holdout".to_string());
        }
        if self.training.evaluation_window < self.training.holdout {
            errors.push("training.evaluation_window must be >= training.holdout".to_string());
        }
        if self.training.learning_rate <= 0.0 || !self.training.learning_rate.is_finite() {
            errors.push("training.learning_rate must be a positive number".to_string());
        }

        // Source validation
        if self.sources.timeout_secs == 0 {
            errors.push("sources.timeout_secs must be > 0".to_string());
        }
        for (name, url) in [
            ("sources.overview_url", &self.sources.overview_url),
            ("sources.bitstamp_url", &self.sources.bitstamp_url),
            ("sources.blockchain_url", &self.sources.blockchain_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(format!("{} must be an http(s) URL", name));
            }
        }

        // Collector validation
        if self.collector.samples < 2 {
            errors.push("collector.samples must be >= 2 (labels come from the next sample)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub corpus_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub results_path: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("dataset.csv"),
            artifacts_dir: PathBuf::from("artifacts"),
            results_path: PathBuf::from("training_results.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub overview_url: String,
    pub bitstamp_url: String,
    pub blockchain_url: String,
    /// Ask/bid venue shown next to predictions; empty disables it
    pub auxiliary_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl SourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn auxiliary_enabled(&self) -> bool {
        !self.auxiliary_url.trim().is_empty()
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            overview_url: "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&ids=bitcoin&price_change_percentage=1h,24h,7d".to_string(),
            bitstamp_url: "https://www.bitstamp.net/api/v2/ticker/btcusd/".to_string(),
            blockchain_url: "https://blockchain.info/ticker".to_string(),
            auxiliary_url: "https://cex.io/api/ticker/BTC/USD".to_string(),
            timeout_secs: 10,
            user_agent: "btc-forecaster/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub profile: TrainingProfile,
    pub epochs: usize,
    pub max_batch_size: usize,
    pub min_samples: usize,
    pub holdout: usize,
    pub evaluation_window: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
}

impl TrainingSettings {
    /// Preset epochs win over `epochs` unless the profile is `Custom`
    pub fn effective_epochs(&self) -> usize {
        self.profile.epochs().unwrap_or(self.epochs)
    }

    /// Explicit epoch count from the command line
    pub fn override_epochs(&mut self, epochs: usize) {
        self.profile = TrainingProfile::Custom;
        self.epochs = epochs;
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            profile: TrainingProfile::Custom,
            epochs: 5,
            max_batch_size: 10,
            min_samples: MIN_TRAINING_SAMPLES,
            holdout: 2,
            evaluation_window: 10,
            learning_rate: 0.002,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub samples: usize,
    /// Seconds between polls; also the forecast horizon
    pub interval_secs: u64,
}

impl CollectorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            samples: 50,
            interval_secs: 540,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [training]
            epochs = 40
            seed = 7

            [data]
            artifacts_dir = "models"
            "#,
        )
        .unwrap();

        assert_eq!(config.training.epochs, 40);
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.training.max_batch_size, 10);
        assert_eq!(config.data.artifacts_dir, PathBuf::from("models"));
        assert_eq!(config.data.corpus_path, PathBuf::from("dataset.csv"));
        assert_eq!(config.collector.interval_secs, 540);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = AppConfig::default();
        config.training.epochs = 0;
        config.sources.timeout_secs = 0;
        config.sources.bitstamp_url = "ftp://example".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_min_samples_floor() {
        let mut config = AppConfig::default();
        config.training.min_samples = 3;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("training.min_samples must be >= 5")));

        let err = AppConfig::from_toml_str("[training]\nmin_samples = 4\n").unwrap_err();
        assert!(err.to_string().contains("min_samples"));
    }

    #[test]
    fn test_profile_sets_epochs() {
        let mut config = AppConfig::from_toml_str(
            r#"
            [training]
            profile = "full"
            epochs = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.training.effective_epochs(), 200);

        config.training.override_epochs(12);
        assert_eq!(config.training.profile, TrainingProfile::Custom);
        assert_eq!(config.training.effective_epochs(), 12);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.sources.overview_url, config.sources.overview_url);
        assert_eq!(parsed.training.holdout, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.training.epochs, 5);
    }
}
