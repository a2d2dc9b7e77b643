use reqwest::Client;
use serde_json::Value;

use super::{get_json, number_field, SourceError};
use crate::types::BlockchainTicker;

const PROVIDER: &str = "blockchain.info";

#[derive(Debug, Clone)]
pub struct BlockchainClient {
    client: Client,
    url: String,
}

impl BlockchainClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<BlockchainTicker, SourceError> {
        let body = get_json(&self.client, PROVIDER, &self.url).await?;
        parse_ticker(&body)
    }
}

/// Reads the USD entry of the multi-currency ticker
pub fn parse_ticker(body: &Value) -> Result<BlockchainTicker, SourceError> {
    let usd = body.get("USD").ok_or_else(|| SourceError::Malformed {
        provider: PROVIDER,
        reason: "no USD entry".to_string(),
    })?;
    let ticker = BlockchainTicker {
        last: number_field(usd, &["last"]),
        fifteen_min: number_field(usd, &["15m"]),
        buy: number_field(usd, &["buy"]),
        sell: number_field(usd, &["sell"]),
    };
    if ticker == BlockchainTicker::default() {
        return Err(SourceError::Malformed {
            provider: PROVIDER,
            reason: "USD entry has no prices".to_string(),
        });
    }
    Ok(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_usd_entry() {
        let body = json!({
            "EUR": {"15m": 25000.0, "last": 25000.0, "buy": 25000.0, "sell": 25000.0, "symbol": "€"},
            "USD": {"15m": 27105.2, "last": 27105.2, "buy": 27104.9, "sell": 27105.6, "symbol": "$"}
        });
        let t = parse_ticker(&body).unwrap();
        assert_eq!(t.fifteen_min, Some(27105.2));
        assert_eq!(t.buy, Some(27104.9));
        assert_eq!(t.sell, Some(27105.6));
    }

    #[test]
    fn test_missing_usd_is_malformed() {
        let body = json!({"EUR": {"last": 1.0}});
        assert!(parse_ticker(&body).is_err());
    }
}
