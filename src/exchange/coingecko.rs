use reqwest::Client;
use serde_json::Value;

use super::{get_json, number_field, SourceError};
use crate::types::MarketOverview;

const PROVIDER: &str = "coingecko";

/// Market overview client (price, volume, cap, supply, percent changes).
///
/// Parses the CoinGecko `/coins/markets` payload and also the legacy
/// `ticker/bitcoin` shape (`price_usd`, `24h_volume_usd`, ...) some mirrors
/// still serve.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    url: String,
}

impl CoinGeckoClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<MarketOverview, SourceError> {
        let body = get_json(&self.client, PROVIDER, &self.url).await?;
        parse_overview(&body)
    }
}

pub fn parse_overview(body: &Value) -> Result<MarketOverview, SourceError> {
    let entry = match body {
        Value::Array(items) => items.first().ok_or_else(|| SourceError::Malformed {
            provider: PROVIDER,
            reason: "empty market list".to_string(),
        })?,
        Value::Object(_) => body,
        _ => {
            return Err(SourceError::Malformed {
                provider: PROVIDER,
                reason: "expected an object or a list".to_string(),
            })
        }
    };

    let overview = MarketOverview {
        price_usd: number_field(entry, &["current_price", "price_usd"]),
        volume_24h_usd: number_field(entry, &["total_volume", "24h_volume_usd"]),
        market_cap_usd: number_field(entry, &["market_cap", "market_cap_usd"]),
        available_supply: number_field(entry, &["circulating_supply", "available_supply"]),
        total_supply: number_field(entry, &["total_supply"]),
        percent_change_1h: number_field(
            entry,
            &["price_change_percentage_1h_in_currency", "percent_change_1h"],
        ),
        percent_change_24h: number_field(
            entry,
            &[
                "price_change_percentage_24h_in_currency",
                "price_change_percentage_24h",
                "percent_change_24h",
            ],
        ),
        percent_change_7d: number_field(
            entry,
            &["price_change_percentage_7d_in_currency", "percent_change_7d"],
        ),
    };

    if overview == MarketOverview::default() {
        return Err(SourceError::Malformed {
            provider: PROVIDER,
            reason: "no recognised market fields".to_string(),
        });
    }
    Ok(overview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::assert_close;
    use serde_json::json;

    #[test]
    fn test_parse_coingecko_markets() {
        let body = json!([{
            "id": "bitcoin",
            "current_price": 27123.5,
            "total_volume": 14500000000.0,
            "market_cap": 528000000000.0,
            "circulating_supply": 19480000.0,
            "total_supply": 21000000.0,
            "price_change_percentage_1h_in_currency": -0.12,
            "price_change_percentage_24h_in_currency": 1.8,
            "price_change_percentage_7d_in_currency": 4.25
        }]);
        let o = parse_overview(&body).unwrap();
        assert_eq!(o.price_usd, Some(27123.5));
        assert_eq!(o.available_supply, Some(19480000.0));
        assert_eq!(o.percent_change_1h, Some(-0.12));
        assert_eq!(o.percent_change_7d, Some(4.25));
    }

    #[test]
    fn test_parse_legacy_string_payload() {
        let body = json!([{
            "id": "bitcoin",
            "price_usd": "9184.31",
            "24h_volume_usd": "7125870000.0",
            "market_cap_usd": "155232855370",
            "available_supply": "16901812.0",
            "total_supply": "16901812.0",
            "percent_change_1h": "0.43",
            "percent_change_24h": "-2.91",
            "percent_change_7d": "8.86"
        }]);
        let o = parse_overview(&body).unwrap();
        assert_close(o.price_usd, 9184.31);
        assert_close(o.volume_24h_usd, 7125870000.0);
        assert_close(o.percent_change_24h, -2.91);
    }

    #[test]
    fn test_null_supply_is_missing_not_error() {
        let body = json!([{"current_price": 100.0, "total_supply": null}]);
        let o = parse_overview(&body).unwrap();
        assert_eq!(o.price_usd, Some(100.0));
        assert_eq!(o.total_supply, None);
    }

    #[test]
    fn test_unrecognised_payload_is_malformed() {
        assert!(parse_overview(&json!([])).is_err());
        assert!(parse_overview(&json!({"error": "rate limited"})).is_err());
        assert!(parse_overview(&json!("oops")).is_err());
    }
}
