use reqwest::Client;
use serde_json::Value;

use super::{get_json, number_field, SourceError};
use crate::types::AuxiliaryQuote;

const PROVIDER: &str = "cex.io";

/// Ask/bid quote shown next to a prediction. Never a model input.
#[derive(Debug, Clone)]
pub struct CexioClient {
    client: Client,
    url: String,
}

impl CexioClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<AuxiliaryQuote, SourceError> {
        let body = get_json(&self.client, PROVIDER, &self.url).await?;
        parse_quote(&body)
    }
}

pub fn parse_quote(body: &Value) -> Result<AuxiliaryQuote, SourceError> {
    match (number_field(body, &["bid"]), number_field(body, &["ask"])) {
        (Some(bid), Some(ask)) => Ok(AuxiliaryQuote {
            venue: PROVIDER.to_string(),
            bid,
            ask,
        }),
        _ => Err(SourceError::Malformed {
            provider: PROVIDER,
            reason: "missing bid/ask".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quote() {
        let body = json!({"timestamp": "1696000000", "bid": 27090.1, "ask": 27120.4, "last": "27100"});
        let q = parse_quote(&body).unwrap();
        assert_eq!(q.venue, "cex.io");
        assert_eq!(q.bid, 27090.1);
        assert_eq!(q.ask, 27120.4);
    }

    #[test]
    fn test_quote_needs_both_sides() {
        assert!(parse_quote(&json!({"bid": 1.0})).is_err());
    }
}
