use std::fs::{self, OpenOptions};
use std::io::Read;
#[cfg(test)]
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::Corpus;
use crate::ml::error::ForecastError;
use crate::types::{FeatureRecord, LabeledSample, SENTINEL};

pub const LABEL_COLUMN: &str = "label";

/// CSV persistence for the training corpus.
///
/// Header row: the Feature Record field names in model order, then `label`.
/// Rows with unavailable data carry sentinel zeros rather than being dropped.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn header() -> Vec<&'static str> {
        let mut header = FeatureRecord::FIELD_NAMES.to_vec();
        header.push(LABEL_COLUMN);
        header
    }

    pub fn load(&self) -> Result<Corpus, ForecastError> {
        if !self.exists() {
            return Err(ForecastError::Corpus(format!(
                "corpus file not found: {} (run `collect` first)",
                self.path.display()
            )));
        }
        let file = fs::File::open(&self.path)?;
        let corpus = Self::read_from(file)?;
        if corpus.is_empty() {
            warn!("Corpus {} has a header but no rows", self.path.display());
        } else {
            info!("Loaded {} samples from {}", corpus.len(), self.path.display());
        }
        Ok(corpus)
    }

    /// Parse a corpus from any CSV reader
    pub fn read_from<R: Read>(reader: R) -> Result<Corpus, ForecastError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr.headers()?.clone();
        let expected = Self::header();
        let found: Vec<&str> = headers.iter().map(str::trim).collect();
        if found != expected {
            return Err(ForecastError::Corpus(format!(
                "unexpected header: expected [{}], found [{}]",
                expected.join(","),
                found.join(",")
            )));
        }

        let mut samples = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let mut values = [SENTINEL; FeatureRecord::NUM_FEATURES + 1];
            for (j, field) in record.iter().enumerate() {
                values[j] = parse_cell(field, line + 2, expected[j])?;
            }
            let mut features = [SENTINEL; FeatureRecord::NUM_FEATURES];
            features.copy_from_slice(&values[..FeatureRecord::NUM_FEATURES]);
            samples.push(LabeledSample::new(
                FeatureRecord::from_array(features),
                values[FeatureRecord::NUM_FEATURES],
            ));
        }

        Ok(Corpus::from_samples(samples))
    }

    /// Write a full corpus (header included) to any writer
    #[cfg(test)]
    pub fn write_to<W: Write>(writer: W, samples: &[LabeledSample]) -> Result<(), ForecastError> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(Self::header())?;
        for sample in samples {
            wtr.write_record(row_cells(sample))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Append rows, writing the header only when the file is new
    pub fn append(&self, samples: &[LabeledSample]) -> Result<(), ForecastError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_exists = self.exists() && fs::metadata(&self.path)?.len() > 0;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if !file_exists {
            wtr.write_record(Self::header())?;
        }
        for sample in samples {
            wtr.write_record(row_cells(sample))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn row_cells(sample: &LabeledSample) -> Vec<String> {
    let mut cells: Vec<String> = sample
        .features
        .to_array()
        .iter()
        .map(|v| v.to_string())
        .collect();
    cells.push(sample.label.to_string());
    cells
}

fn parse_cell(field: &str, line: usize, column: &str) -> Result<f64, ForecastError> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        warn!("Empty {} on line {}, using sentinel", column, line);
        return Ok(SENTINEL);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ForecastError::Corpus(format!(
            "line {}: invalid {} value '{}'",
            line, column, trimmed
        ))),
    }
}
