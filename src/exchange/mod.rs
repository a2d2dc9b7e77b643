pub mod coingecko;
pub mod bitstamp;
pub mod blockchain;
pub mod cexio;
pub mod aggregator;

pub use coingecko::CoinGeckoClient;
pub use bitstamp::BitstampClient;
pub use blockchain::BlockchainClient;
pub use cexio::CexioClient;
pub use aggregator::MarketDataSource;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::ml::error::ForecastError;
use crate::types::MarketSnapshot;

/// Supplies one fresh Feature Record plus the current reference price
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn fetch_current(&self) -> Result<MarketSnapshot, ForecastError>;
}

/// Failure of a single market data provider.
/// The aggregator absorbs these and substitutes sentinels.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{provider}: request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider}: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: malformed response ({reason})")]
    Malformed {
        provider: &'static str,
        reason: String,
    },
}

impl SourceError {
    pub fn provider(&self) -> &'static str {
        match self {
            SourceError::Timeout { provider }
            | SourceError::Http { provider, .. }
            | SourceError::Malformed { provider, .. } => provider,
        }
    }

    fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout { provider }
        } else {
            SourceError::Http {
                provider,
                source: err,
            }
        }
    }
}

/// GET a URL and decode the body as JSON
pub(crate) async fn get_json(
    client: &Client,
    provider: &'static str,
    url: &str,
) -> Result<Value, SourceError> {
    debug!("{}: GET {}", provider, url);
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(provider, e))?
        .error_for_status()
        .map_err(|e| SourceError::from_reqwest(provider, e))?;

    let text = resp
        .text()
        .await
        .map_err(|e| SourceError::from_reqwest(provider, e))?;

    serde_json::from_str(&text).map_err(|e| SourceError::Malformed {
        provider,
        reason: format!("invalid JSON: {}", e),
    })
}

/// Numeric field that providers send either as a JSON number or as a string
pub(crate) fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .ok()
                .and_then(|d| d.to_f64())
                .or_else(|| s.parse::<f64>().ok())
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// First key present with a numeric value
pub(crate) fn number_field(object: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| object.get(*k).and_then(number))
}

#[cfg(test)]
pub(crate) fn assert_close(actual: Option<f64>, expected: f64) {
    let v = actual.expect("value present");
    assert!((v - expected).abs() <= 1e-9 * expected.abs().max(1.0), "{} != {}", v, expected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_accepts_strings_and_numbers() {
        assert_eq!(number(&json!(42.5)), Some(42.5));
        assert_close(number(&json!("9184.31")), 9184.31);
        assert_eq!(number(&json!(" 17 ")), Some(17.0));
        assert_eq!(number(&json!("1.2e3")), Some(1200.0));
        assert_eq!(number(&json!("n/a")), None);
        assert_eq!(number(&json!(null)), None);
    }

    #[test]
    fn test_number_field_uses_first_present_key() {
        let obj = json!({"b": "2", "c": 3});
        assert_eq!(number_field(&obj, &["a", "b", "c"]), Some(2.0));
        assert_eq!(number_field(&obj, &["a"]), None);
    }

    #[test]
    fn test_source_error_names_provider() {
        let err = SourceError::Malformed {
            provider: "bitstamp",
            reason: "missing last".to_string(),
        };
        assert_eq!(err.provider(), "bitstamp");
        assert_eq!(err.to_string(), "bitstamp: malformed response (missing last)");
    }
}
