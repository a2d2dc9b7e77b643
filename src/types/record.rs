use serde::{Deserialize, Serialize};

/// Value written in place of any field a provider failed to deliver
pub const SENTINEL: f64 = 0.0;

/// Fixed-size market snapshot used as model input.
/// Field order is the model's input order; never reorder.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub price_usd: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
    pub available_supply: f64,
    pub total_supply: f64,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
    pub bitstamp_volume: f64,
    pub bitstamp_vwap: f64,
    pub blockchain_sell: f64,
    pub blockchain_buy: f64,
}

impl FeatureRecord {
    pub const NUM_FEATURES: usize = 12;

    pub const FIELD_NAMES: [&'static str; Self::NUM_FEATURES] = [
        "price_usd",
        "volume_24h_usd",
        "market_cap_usd",
        "available_supply",
        "total_supply",
        "percent_change_1h",
        "percent_change_24h",
        "percent_change_7d",
        "bitstamp_volume",
        "bitstamp_vwap",
        "blockchain_sell",
        "blockchain_buy",
    ];

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.price_usd,
            self.volume_24h_usd,
            self.market_cap_usd,
            self.available_supply,
            self.total_supply,
            self.percent_change_1h,
            self.percent_change_24h,
            self.percent_change_7d,
            self.bitstamp_volume,
            self.bitstamp_vwap,
            self.blockchain_sell,
            self.blockchain_buy,
        ]
    }

    pub fn from_array(values: [f64; Self::NUM_FEATURES]) -> Self {
        Self {
            price_usd: values[0],
            volume_24h_usd: values[1],
            market_cap_usd: values[2],
            available_supply: values[3],
            total_supply: values[4],
            percent_change_1h: values[5],
            percent_change_24h: values[6],
            percent_change_7d: values[7],
            bitstamp_volume: values[8],
            bitstamp_vwap: values[9],
            blockchain_sell: values[10],
            blockchain_buy: values[11],
        }
    }

    /// Build a record from optional fields, substituting the sentinel for
    /// every absent one. Returns the names of the substituted fields.
    pub fn from_partial(
        values: [Option<f64>; Self::NUM_FEATURES],
    ) -> (Self, Vec<&'static str>) {
        let mut filled = [SENTINEL; Self::NUM_FEATURES];
        let mut missing = Vec::new();
        for (i, value) in values.iter().enumerate() {
            match value {
                Some(v) if v.is_finite() => filled[i] = *v,
                _ => missing.push(Self::FIELD_NAMES[i]),
            }
        }
        (Self::from_array(filled), missing)
    }
}

/// One corpus row: a snapshot and the price realized one horizon later
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: FeatureRecord,
    pub label: f64,
}

impl LabeledSample {
    pub fn new(features: FeatureRecord, label: f64) -> Self {
        Self { features, label }
    }
}
