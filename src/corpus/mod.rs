pub mod store;
pub mod collector;

pub use store::CorpusStore;
pub use collector::CorpusCollector;

use sha2::{Digest, Sha256};

use crate::types::LabeledSample;

/// Chronologically ordered (Feature Record, label) pairs.
/// Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    samples: Vec<LabeledSample>,
}

impl Corpus {
    pub fn from_samples(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// SHA-256 over every feature and label value in order.
    /// Ties persisted artifacts to the corpus they were derived from.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for sample in &self.samples {
            for v in sample.features.to_array() {
                hasher.update(v.to_le_bytes());
            }
            hasher.update(sample.label.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<LabeledSample> for Corpus {
    fn from_iter<I: IntoIterator<Item = LabeledSample>>(iter: I) -> Self {
        Self::from_samples(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureRecord;

    fn sample(price: f64, label: f64) -> LabeledSample {
        let mut values = [1.0; FeatureRecord::NUM_FEATURES];
        values[0] = price;
        LabeledSample::new(FeatureRecord::from_array(values), label)
    }

    #[test]
    fn test_digest_depends_on_order_and_values() {
        let a: Corpus = vec![sample(1.0, 2.0), sample(3.0, 4.0)].into_iter().collect();
        let b: Corpus = vec![sample(3.0, 4.0), sample(1.0, 2.0)].into_iter().collect();
        let c: Corpus = vec![sample(1.0, 2.0), sample(3.0, 4.0)].into_iter().collect();

        assert_eq!(a.digest(), c.digest());
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
