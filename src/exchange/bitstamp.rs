use reqwest::Client;
use serde_json::Value;

use super::{get_json, number_field, SourceError};
use crate::types::BitstampTicker;

const PROVIDER: &str = "bitstamp";

#[derive(Debug, Clone)]
pub struct BitstampClient {
    client: Client,
    url: String,
}

impl BitstampClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<BitstampTicker, SourceError> {
        let body = get_json(&self.client, PROVIDER, &self.url).await?;
        parse_ticker(&body)
    }
}

/// Bitstamp sends every ticker value as a string
pub fn parse_ticker(body: &Value) -> Result<BitstampTicker, SourceError> {
    if !body.is_object() {
        return Err(SourceError::Malformed {
            provider: PROVIDER,
            reason: "expected a ticker object".to_string(),
        });
    }
    let ticker = BitstampTicker {
        last: number_field(body, &["last"]),
        volume: number_field(body, &["volume"]),
        vwap: number_field(body, &["vwap"]),
    };
    if ticker == BitstampTicker::default() {
        return Err(SourceError::Malformed {
            provider: PROVIDER,
            reason: "no last/volume/vwap fields".to_string(),
        });
    }
    Ok(ticker)
}
