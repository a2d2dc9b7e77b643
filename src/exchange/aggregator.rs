use async_trait::async_trait;
use chrono::Utc;
use futures::future::OptionFuture;
use reqwest::Client;
use tracing::{debug, warn};

use super::{
    BitstampClient, BlockchainClient, CexioClient, CoinGeckoClient, FeatureSource, SourceError,
};
use crate::config::SourceSettings;
use crate::ml::error::ForecastError;
use crate::types::{
    AuxiliaryQuote, BitstampTicker, BlockchainTicker, FeatureRecord, MarketOverview,
    MarketSnapshot,
};

/// Live Feature Record source backed by the public ticker endpoints.
///
/// All providers of one snapshot are requested concurrently; each request is
/// bounded by the client timeout. The auxiliary quote is only requested once
/// enabled with [`MarketDataSource::with_auxiliary`].
#[derive(Debug, Clone)]
pub struct MarketDataSource {
    overview: CoinGeckoClient,
    bitstamp: BitstampClient,
    blockchain: BlockchainClient,
    auxiliary: Option<CexioClient>,
    fetch_auxiliary: bool,
}

impl MarketDataSource {
    pub fn from_settings(settings: &SourceSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Http {
                provider: "http-client",
                source: e,
            })?;

        let auxiliary = settings
            .auxiliary_enabled()
            .then(|| CexioClient::new(client.clone(), settings.auxiliary_url.clone()));

        Ok(Self {
            overview: CoinGeckoClient::new(client.clone(), settings.overview_url.clone()),
            bitstamp: BitstampClient::new(client.clone(), settings.bitstamp_url.clone()),
            blockchain: BlockchainClient::new(client, settings.blockchain_url.clone()),
            auxiliary,
            fetch_auxiliary: false,
        })
    }

    /// Request the auxiliary quote alongside each snapshot. Has no effect
    /// when no auxiliary endpoint is configured.
    pub fn with_auxiliary(mut self, enabled: bool) -> Self {
        self.fetch_auxiliary = enabled;
        self
    }

    fn auxiliary_client(&self) -> Option<&CexioClient> {
        self.auxiliary.as_ref().filter(|_| self.fetch_auxiliary)
    }
}

#[async_trait]
impl FeatureSource for MarketDataSource {
    async fn fetch_current(&self) -> Result<MarketSnapshot, ForecastError> {
        let auxiliary: OptionFuture<_> = self.auxiliary_client().map(|c| c.fetch()).into();

        let (overview, bitstamp, blockchain, auxiliary) = tokio::join!(
            self.overview.fetch(),
            self.bitstamp.fetch(),
            self.blockchain.fetch(),
            auxiliary,
        );

        assemble_snapshot(overview, bitstamp, blockchain, auxiliary)
    }
}

/// Merge provider results into one Feature Record.
///
/// Failed providers contribute sentinels and are listed in
/// `failed_sources`. Fails only when no primary provider answered or none of
/// the twelve fields could be filled.
pub(crate) fn assemble_snapshot(
    overview: Result<MarketOverview, SourceError>,
    bitstamp: Result<BitstampTicker, SourceError>,
    blockchain: Result<BlockchainTicker, SourceError>,
    auxiliary: Option<Result<AuxiliaryQuote, SourceError>>,
) -> Result<MarketSnapshot, ForecastError> {
    let mut failures = Vec::new();
    let mut failed_sources = Vec::new();

    let overview = absorb(overview, &mut failures, &mut failed_sources).unwrap_or_default();
    let bitstamp = absorb(bitstamp, &mut failures, &mut failed_sources).unwrap_or_default();
    let blockchain = absorb(blockchain, &mut failures, &mut failed_sources).unwrap_or_default();

    if failed_sources.len() == 3 {
        return Err(ForecastError::DataUnavailable { failures });
    }

    let fields = [
        overview.price_usd,
        overview.volume_24h_usd,
        overview.market_cap_usd,
        overview.available_supply,
        overview.total_supply,
        overview.percent_change_1h,
        overview.percent_change_24h,
        overview.percent_change_7d,
        bitstamp.volume,
        bitstamp.vwap,
        blockchain.sell,
        blockchain.buy,
    ];
    let (record, missing_fields) = FeatureRecord::from_partial(fields);

    if missing_fields.len() == FeatureRecord::NUM_FEATURES {
        failures.push("no feature field present in any response".to_string());
        return Err(ForecastError::DataUnavailable { failures });
    }
    if !missing_fields.is_empty() {
        debug!("Sentinel substituted for: {}", missing_fields.join(", "));
    }

    let reference_price = overview
        .price_usd
        .or(bitstamp.last)
        .or(blockchain.last)
        .or(blockchain.fifteen_min);

    let auxiliary = match auxiliary {
        Some(Ok(quote)) => Some(quote),
        Some(Err(e)) => {
            warn!("Auxiliary quote unavailable: {}", e);
            None
        }
        None => None,
    };

    Ok(MarketSnapshot {
        record,
        reference_price,
        missing_fields,
        failed_sources,
        auxiliary,
        captured_at: Utc::now(),
    })
}

fn absorb<T>(
    result: Result<T, SourceError>,
    failures: &mut Vec<String>,
    failed_sources: &mut Vec<String>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Provider failed, using sentinels: {}", e);
            failed_sources.push(e.provider().to_string());
            failures.push(e.to_string());
            None
        }
    }
}
