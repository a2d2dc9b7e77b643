mod config;
mod corpus;
mod exchange;
mod ml;
mod report;
mod types;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{AppConfig, TrainingProfile};
use corpus::{CorpusCollector, CorpusStore};
use exchange::{FeatureSource, MarketDataSource};
use ml::{ArtifactStore, ModelArchitecture, Predictor, Trainer, TrainingConfig};

#[derive(Parser)]
#[command(name = "btc-forecaster")]
#[command(about = "Short-horizon BTC/USD price forecasting with a recurrent network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "forecaster.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the market sources and append labeled rows to the corpus
    Collect {
        /// Number of snapshots to poll
        #[arg(short, long)]
        samples: Option<usize>,

        /// Seconds between polls (the forecast horizon)
        #[arg(short, long)]
        interval_secs: Option<u64>,

        /// Corpus file to append to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Train the model on the corpus and persist the artifacts
    Train {
        /// Corpus file to train on
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Number of epochs (overrides the profile)
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Training profile: quick, full or custom
        #[arg(short, long)]
        profile: Option<TrainingProfile>,

        /// Seed for weight init, shuffling and dropout
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Forecast the price one horizon ahead from a fresh snapshot
    Predict,

    /// Fetch and print one market snapshot without predicting
    Snapshot,

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    match cli.command {
        Commands::Collect {
            samples,
            interval_secs,
            output,
        } => run_collect(config, samples, interval_secs, output).await,
        Commands::Train {
            corpus,
            epochs,
            profile,
            seed,
        } => run_train(config, corpus, epochs, profile, seed),
        Commands::Predict => run_predict(config).await,
        Commands::Snapshot => run_snapshot(config).await,
        Commands::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_collect(
    mut config: AppConfig,
    samples: Option<usize>,
    interval_secs: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(samples) = samples {
        config.collector.samples = samples;
    }
    if let Some(secs) = interval_secs {
        config.collector.interval_secs = secs;
    }
    if let Some(path) = output {
        config.data.corpus_path = path;
    }
    revalidate(&config)?;

    let source = MarketDataSource::from_settings(&config.sources)?;
    let store = CorpusStore::new(config.data.corpus_path.clone());
    let collector = CorpusCollector::new(&source, store.clone(), config.collector.interval());

    let summary = collector.run(config.collector.samples).await?;
    report::print_collection_summary(&summary, store.path());
    Ok(())
}

fn run_train(
    mut config: AppConfig,
    corpus: Option<PathBuf>,
    epochs: Option<usize>,
    profile: Option<TrainingProfile>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(path) = corpus {
        config.data.corpus_path = path;
    }
    if let Some(profile) = profile {
        config.training.profile = profile;
    }
    if let Some(epochs) = epochs {
        config.training.override_epochs(epochs);
    }
    if seed.is_some() {
        config.training.seed = seed;
    }
    revalidate(&config)?;

    info!(
        "Training profile: {} ({})",
        config.training.profile,
        config.training.profile.description()
    );

    let corpus = CorpusStore::new(config.data.corpus_path.clone())
        .load()
        .with_context(|| format!("Failed to read corpus {}", config.data.corpus_path.display()))?;

    let trainer = Trainer::new(TrainingConfig::from(&config.training));
    let store = ArtifactStore::new(config.data.artifacts_dir.clone());
    let persisted = trainer.train_and_persist(&corpus, &store, &config.data.results_path)?;

    report::print_training_summary(&persisted.outcome, Some(&persisted.version));
    Ok(())
}

async fn run_predict(config: AppConfig) -> Result<()> {
    let store = ArtifactStore::new(config.data.artifacts_dir.clone());
    let predictor = Predictor::load(&store, &ModelArchitecture::standard())
        .context("Cannot predict without matching model and scaling artifacts; run `train` first")?;

    let source = MarketDataSource::from_settings(&config.sources)?.with_auxiliary(true);
    let prediction = predictor.predict(&source).await?;
    report::print_prediction(&prediction, predictor.version());
    Ok(())
}

async fn run_snapshot(config: AppConfig) -> Result<()> {
    let source = MarketDataSource::from_settings(&config.sources)?;
    let snapshot = source.fetch_current().await?;
    report::print_snapshot(&snapshot);
    Ok(())
}

fn revalidate(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))
}
