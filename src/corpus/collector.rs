use std::time::Duration;
use tracing::{info, warn};

use super::CorpusStore;
use crate::exchange::FeatureSource;
use crate::ml::error::ForecastError;
use crate::types::{FeatureRecord, LabeledSample, SENTINEL};

/// Outcome of one collection run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSummary {
    pub polled: usize,
    pub written: usize,
    pub failed_polls: usize,
    pub partial_polls: usize,
}

/// Polls a feature source on a fixed interval and appends labeled rows.
///
/// The label of each snapshot is the reference price observed on the next
/// poll, i.e. one interval (the forecast horizon) later. The final snapshot
/// has no successor and is not written.
pub struct CorpusCollector<'a> {
    source: &'a dyn FeatureSource,
    store: CorpusStore,
    interval: Duration,
}

impl<'a> CorpusCollector<'a> {
    pub fn new(source: &'a dyn FeatureSource, store: CorpusStore, interval: Duration) -> Self {
        Self {
            source,
            store,
            interval,
        }
    }

    pub async fn run(&self, samples: usize) -> Result<CollectionSummary, ForecastError> {
        info!(
            "Collecting {} snapshots every {}s into {}",
            samples,
            self.interval.as_secs(),
            self.store.path().display()
        );

        let mut summary = CollectionSummary::default();
        let mut pending: Option<FeatureRecord> = None;

        for i in 0..samples {
            let (record, price) = match self.source.fetch_current().await {
                Ok(snapshot) => {
                    if !snapshot.is_complete() {
                        summary.partial_polls += 1;
                        warn!(
                            "Snapshot {}/{}: sentinel for {}",
                            i + 1,
                            samples,
                            snapshot.missing_fields.join(", ")
                        );
                    }
                    (snapshot.record, snapshot.reference_price)
                }
                Err(e) => {
                    summary.failed_polls += 1;
                    warn!("Snapshot {}/{} failed: {}", i + 1, samples, e);
                    (FeatureRecord::default(), None)
                }
            };
            summary.polled += 1;

            if let Some(previous) = pending.take() {
                let label = price.unwrap_or_else(|| {
                    warn!("No reference price on poll {}, labeling previous row with sentinel", i + 1);
                    SENTINEL
                });
                self.store.append(&[LabeledSample::new(previous, label)])?;
                summary.written += 1;
            }
            pending = Some(record);

            info!("Snapshot {}/{} captured", i + 1, samples);

            if i + 1 < samples && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        if pending.is_some() {
            info!("Final snapshot dropped: its label is one horizon in the future");
        }

        info!(
            "Collection finished: {} polled, {} rows written, {} failed, {} partial",
            summary.polled, summary.written, summary.failed_polls, summary.partial_polls
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockFeatureSource;
    use crate::types::MarketSnapshot;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn snapshot(price: f64) -> MarketSnapshot {
        let mut values = [1.0; FeatureRecord::NUM_FEATURES];
        values[0] = price;
        MarketSnapshot {
            record: FeatureRecord::from_array(values),
            reference_price: Some(price),
            missing_fields: Vec::new(),
            failed_sources: Vec::new(),
            auxiliary: None,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rows_labeled_with_next_price() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path().join("dataset.csv"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut source = MockFeatureSource::new();
        source.expect_fetch_current().times(4).returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(snapshot(100.0 + n as f64))
        });

        let collector = CorpusCollector::new(&source, store.clone(), Duration::ZERO);
        let summary = collector.run(4).await.unwrap();

        assert_eq!(summary.polled, 4);
        assert_eq!(summary.written, 3);

        let corpus = store.load().unwrap();
        let rows = corpus.samples();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].features.price_usd, 100.0);
        assert_eq!(rows[0].label, 101.0);
        assert_eq!(rows[2].label, 103.0);
    }

    #[tokio::test]
    async fn test_failed_poll_writes_sentinel_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(dir.path().join("dataset.csv"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut source = MockFeatureSource::new();
        source.expect_fetch_current().times(3).returning(move || {
            match counter.fetch_add(1, Ordering::SeqCst) {
                1 => Err(ForecastError::DataUnavailable {
                    failures: vec!["coingecko: timeout".to_string()],
                }),
                n => Ok(snapshot(200.0 + n as f64)),
            }
        });

        let collector = CorpusCollector::new(&source, store.clone(), Duration::ZERO);
        let summary = collector.run(3).await.unwrap();
        assert_eq!(summary.failed_polls, 1);

        let corpus = store.load().unwrap();
        let rows = corpus.samples();
        assert_eq!(rows.len(), 2);
        // First row's label comes from the failed poll
        assert_eq!(rows[0].label, SENTINEL);
        // The failed poll itself is a full sentinel row
        assert_eq!(rows[1].features, FeatureRecord::default());
        assert_eq!(rows[1].label, 202.0);
    }
}
