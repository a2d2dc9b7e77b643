use chrono::{DateTime, Utc};
use serde::Serialize;

use super::FeatureRecord;

/// Aggregate market data (price, volume, cap, supply, percent changes).
/// Any field may be absent in the upstream payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketOverview {
    pub price_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub available_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BitstampTicker {
    pub last: Option<f64>,
    pub volume: Option<f64>,
    pub vwap: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockchainTicker {
    pub last: Option<f64>,
    pub fifteen_min: Option<f64>,
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

/// Ask/bid from a secondary venue, shown next to predictions only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxiliaryQuote {
    pub venue: String,
    pub bid: f64,
    pub ask: f64,
}

/// One fetched Feature Record plus the reference price it was captured at
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub record: FeatureRecord,
    pub reference_price: Option<f64>,
    pub missing_fields: Vec<&'static str>,
    pub failed_sources: Vec<String>,
    pub auxiliary: Option<AuxiliaryQuote>,
    pub captured_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }
}
