use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::corpus::collector::CollectionSummary;
use crate::ml::error::ForecastError;
use crate::ml::persistence::ModelVersion;
use crate::ml::predictor::Prediction;
use crate::ml::trainer::{EvaluationReport, TrainingOutcome};
use crate::types::{FeatureRecord, MarketSnapshot};

#[derive(Serialize)]
struct ComparisonRow {
    index: usize,
    actual: f64,
    predicted: f64,
    error: f64,
    pct_error: Option<f64>,
    held_out: bool,
}

/// Actual vs predicted table, one row per evaluated sample
pub fn write_comparison_csv(path: &Path, report: &EvaluationReport) -> Result<(), ForecastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for row in &report.rows {
        wtr.serialize(ComparisonRow {
            index: row.index,
            actual: row.actual,
            predicted: (row.predicted * 100.0).round() / 100.0,
            error: row.error(),
            pct_error: row.pct_error(),
            held_out: row.held_out,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pretty print a finished training run to console
pub fn print_training_summary(outcome: &TrainingOutcome, version: Option<&ModelVersion>) {
    let m = &outcome.metrics;
    println!("\n{}", "=".repeat(60));
    println!("                    TRAINING RESULTS");
    println!("{}", "=".repeat(60));
    if let Some(v) = version {
        println!("Model Version:      v{}", v);
    }
    println!("Samples:            {} ({} fit, {} held out)", m.samples, m.fit_samples, m.held_out_samples);
    println!("Epochs:             {}", m.epochs);
    println!("Final Loss:         {:.6}", m.final_loss);
    if let (Some(lo), Some(hi)) = (outcome.scaling.label.min(0), outcome.scaling.label.max(0)) {
        println!("Label Range:        ${:.2} - ${:.2}", lo, hi);
    }
    if let (Some(first), Some(last)) = (outcome.loss_history.first(), outcome.loss_history.last()) {
        println!("Loss Trend:         {:.6} -> {:.6}", first, last);
    }
    match (m.held_out_mae, m.held_out_mape) {
        (Some(mae), Some(mape)) => println!("Held-out Error:     MAE ${:.2} | MAPE {:.2}%", mae, mape),
        (Some(mae), None) => println!("Held-out Error:     MAE ${:.2}", mae),
        _ => println!("Held-out Error:     n/a"),
    }
    let degenerate = outcome.scaling.features.degenerate_columns();
    if !degenerate.is_empty() {
        let names: Vec<&str> = degenerate
            .iter()
            .filter_map(|c| FeatureRecord::FIELD_NAMES.get(c.index).copied())
            .collect();
        println!("Constant Features:  {}", names.join(", "));
    }
    println!("{}", "-".repeat(60));
    println!("  {:>5}  {:>12}  {:>12}  {:>10}  {:>7}  {}", "Row", "Actual", "Predicted", "Error", "Err %", "");
    for row in &outcome.report.rows {
        println!(
            "  {:>5}  {:>12.2}  {:>12.2}  {:>+10.2}  {:>6.2}%  {}",
            row.index,
            row.actual,
            row.predicted,
            row.error(),
            row.pct_error().unwrap_or(f64::NAN),
            if row.held_out { "held-out" } else { "" }
        );
    }
    println!("{}", "=".repeat(60));
}

pub fn print_prediction(prediction: &Prediction, version: Option<&ModelVersion>) {
    println!("\n{}", "=".repeat(60));
    println!("                    PRICE FORECAST");
    println!("{}", "=".repeat(60));
    if let Some(v) = version {
        println!("Model Version:      v{}", v);
    }
    println!("Captured:           {}", prediction.captured_at.format("%Y-%m-%d %H:%M:%S UTC"));
    match prediction.current_price {
        Some(current) => println!("Current Price:      ${:.2}", current),
        None => println!("Current Price:      n/a"),
    }
    println!("Predicted Price:    ${:.2}", prediction.predicted_price);
    if let (Some(change), Some(pct)) = (prediction.change(), prediction.change_pct()) {
        println!("Expected Change:    ${:+.2} ({:+.3}%)", change, pct);
    }
    if let Some(quote) = &prediction.auxiliary {
        println!("{}", "-".repeat(60));
        println!("{} Ask/Bid:      ${:.2} / ${:.2}", quote.venue, quote.ask, quote.bid);
    }
    if !prediction.missing_fields.is_empty() {
        println!("{}", "-".repeat(60));
        println!("Sentinel Fields:    {}", prediction.missing_fields.join(", "));
    }
    if !prediction.failed_sources.is_empty() {
        println!("Failed Sources:     {}", prediction.failed_sources.join(", "));
    }
    println!("{}", "=".repeat(60));
}

pub fn print_snapshot(snapshot: &MarketSnapshot) {
    println!("\n{}", "=".repeat(60));
    println!("                    MARKET SNAPSHOT");
    println!("{}", "=".repeat(60));
    println!("Captured:           {}", snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (name, value) in FeatureRecord::FIELD_NAMES.iter().zip(snapshot.record.to_array()) {
        let flag = if snapshot.missing_fields.contains(name) { "  (sentinel)" } else { "" };
        println!("  {:<20} {:>22.4}{}", name, value, flag);
    }
    println!("{}", "-".repeat(60));
    match snapshot.reference_price {
        Some(price) => println!("Reference Price:    ${:.2}", price),
        None => println!("Reference Price:    n/a"),
    }
    if let Some(quote) = &snapshot.auxiliary {
        println!("{} Ask/Bid:      ${:.2} / ${:.2}", quote.venue, quote.ask, quote.bid);
    }
    if !snapshot.failed_sources.is_empty() {
        println!("Failed Sources:     {}", snapshot.failed_sources.join(", "));
    }
    println!("{}", "=".repeat(60));
}

pub fn print_collection_summary(summary: &CollectionSummary, path: &Path) {
    println!("\n{}", "=".repeat(60));
    println!("                    COLLECTION");
    println!("{}", "=".repeat(60));
    println!("Corpus:             {}", path.display());
    println!("Polls:              {}", summary.polled);
    println!("Rows Written:       {}", summary.written);
    println!("Failed Polls:       {}", summary.failed_polls);
    println!("Partial Polls:      {}", summary.partial_polls);
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::trainer::EvaluationRow;

    #[test]
    fn test_comparison_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("training_results.csv");
        let report = EvaluationReport::from_rows(vec![
            EvaluationRow { index: 7, actual: 30_000.0, predicted: 30_123.456, held_out: false },
            EvaluationRow { index: 8, actual: 0.0, predicted: 12.0, held_out: true },
        ]);

        write_comparison_csv(&path, &report).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,actual,predicted,error,pct_error,held_out");
        assert!(lines[1].starts_with("7,30000.0,30123.46,"));
        assert!(lines[1].ends_with(",false"));
        // zero actual price has no percentage error
        assert!(lines[2].contains(",,true"));
    }
}
