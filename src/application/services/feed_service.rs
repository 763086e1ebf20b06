use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    application::{
        dtos::{
            NameListResponse, NewsFeed, NewsQuery, NewsResponse, PriceFeed, PriceListResponse,
            PriceRecord,
        },
        resilience::ResilientClient,
    },
    domain::{validate, DomainError, FieldSpec, RawRequest, UpstreamError},
};

const NEWS_PATH: &str = "latest";
const DEFAULT_NEWS_TOPIC: &str = "farming";
const DEFAULT_NEWS_LANGUAGE: &str = "hi";
const DEFAULT_NEWS_COUNTRY: &str = "in";
const NEWS_LANGUAGES: [&str; 10] = ["hi", "en", "bn", "mr", "ta", "te", "gu", "kn", "ml", "pa"];
const NEWS_COUNTRIES: [&str; 5] = ["in", "np", "bd", "lk", "pk"];
const PRICE_PAGE_LIMIT: &str = "1000";
const NO_PRICE_DATA: &str = "No data found for the given crop, state, and market.";

/// Contract for one third-party HTTP upstream. A call is a single blocking
/// attempt; retries and caching happen above it.
pub trait FeedSource: Send + Sync {
    fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, UpstreamError>;

    /// Stable cache key for a request. Must not embed credentials.
    fn fingerprint(&self, path: &str, query: &[(String, String)]) -> String {
        let mut params: Vec<&(String, String)> = query.iter().collect();
        params.sort();
        let joined = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{path}?{joined}")
    }
}

/// An upstream paired with the resilient client (and cache) dedicated to it.
pub struct Feed<T> {
    source: Arc<dyn FeedSource>,
    client: ResilientClient<Arc<T>>,
}

impl<T> Feed<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn FeedSource>, client: ResilientClient<Arc<T>>) -> Self {
        Self { source, client }
    }

    /// Fetch and decode `path`. Decoding happens inside the attempt so an
    /// undecodable payload is never cached.
    async fn load(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<Arc<T>, DomainError> {
        let key = self.source.fingerprint(path, &query);
        let producer = || {
            let source = Arc::clone(&self.source);
            let path = path.to_string();
            let query = query.clone();
            async move {
                let value = tokio::task::spawn_blocking(move || source.get_json(&path, &query))
                    .await
                    .map_err(|err| UpstreamError::Aborted(err.to_string()))??;
                serde_json::from_value::<T>(value)
                    .map(Arc::new)
                    .map_err(|err| UpstreamError::Malformed(err.to_string()))
            }
        };

        Ok(self.client.fetch_with_cancel(&key, producer, cancel).await?)
    }
}

/// Remote-upstream endpoints: farming news alerts and mandi prices.
pub struct FeedService {
    news: Option<Feed<NewsFeed>>,
    prices: Option<Feed<PriceFeed>>,
}

impl FeedService {
    pub fn new(news: Option<Feed<NewsFeed>>, prices: Option<Feed<PriceFeed>>) -> Self {
        Self { news, prices }
    }

    /// Upstreams that were not configured at start-up.
    pub fn unconfigured_feeds(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.news.is_none() {
            missing.push("news");
        }
        if self.prices.is_none() {
            missing.push("prices");
        }
        missing
    }

    pub fn news_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("q").optional().max_length(64),
            FieldSpec::one_of("language", NEWS_LANGUAGES).optional(),
            FieldSpec::one_of("country", NEWS_COUNTRIES).optional(),
        ]
    }

    pub fn state_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::text("crop").max_length(64)]
    }

    pub fn market_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("crop").max_length(64),
            FieldSpec::text("state").max_length(64),
        ]
    }

    pub fn price_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("crop").max_length(64),
            FieldSpec::text("state").max_length(64),
            FieldSpec::text("market").max_length(64),
        ]
    }

    pub async fn news(
        &self,
        raw: &RawRequest,
        cancel: &CancellationToken,
    ) -> Result<NewsResponse, DomainError> {
        let record = validate(raw, &Self::news_fields()).into_result()?;
        let feed = self
            .news
            .as_ref()
            .ok_or_else(|| DomainError::internal("news upstream not configured"))?;

        let query = NewsQuery {
            q: record.text("q").unwrap_or(DEFAULT_NEWS_TOPIC).to_string(),
            language: record
                .text("language")
                .unwrap_or(DEFAULT_NEWS_LANGUAGE)
                .to_string(),
            country: record
                .text("country")
                .unwrap_or(DEFAULT_NEWS_COUNTRY)
                .to_string(),
        };
        let params = vec![
            ("qInMeta".to_string(), query.q.clone()),
            ("language".to_string(), query.language.clone()),
            ("country".to_string(), query.country.clone()),
        ];

        let payload = feed.load(NEWS_PATH, params, cancel).await?;
        info!(q = %query.q, articles = payload.results.len(), "news served");

        Ok(NewsResponse {
            total: payload.results.len(),
            articles: payload.results.clone(),
            query,
        })
    }

    pub async fn commodities(
        &self,
        cancel: &CancellationToken,
    ) -> Result<NameListResponse, DomainError> {
        let records = self.price_records(cancel).await?;
        Ok(NameListResponse {
            items: distinct(records.records.iter().map(|r| r.commodity.as_str())),
        })
    }

    pub async fn states(
        &self,
        raw: &RawRequest,
        cancel: &CancellationToken,
    ) -> Result<NameListResponse, DomainError> {
        let record = validate(raw, &Self::state_fields()).into_result()?;
        let crop = record.text("crop").unwrap_or_default();
        let records = self.price_records(cancel).await?;

        Ok(NameListResponse {
            items: distinct(
                records
                    .records
                    .iter()
                    .filter(|r| same(&r.commodity, crop))
                    .map(|r| r.state.as_str()),
            ),
        })
    }

    pub async fn markets(
        &self,
        raw: &RawRequest,
        cancel: &CancellationToken,
    ) -> Result<NameListResponse, DomainError> {
        let record = validate(raw, &Self::market_fields()).into_result()?;
        let crop = record.text("crop").unwrap_or_default();
        let state = record.text("state").unwrap_or_default();
        let records = self.price_records(cancel).await?;

        Ok(NameListResponse {
            items: distinct(
                records
                    .records
                    .iter()
                    .filter(|r| same(&r.commodity, crop) && same(&r.state, state))
                    .map(|r| r.market.as_str()),
            ),
        })
    }

    pub async fn prices(
        &self,
        raw: &RawRequest,
        cancel: &CancellationToken,
    ) -> Result<PriceListResponse, DomainError> {
        let record = validate(raw, &Self::price_fields()).into_result()?;
        let crop = record.text("crop").unwrap_or_default();
        let state = record.text("state").unwrap_or_default();
        let market = record.text("market").unwrap_or_default();
        let records = self.price_records(cancel).await?;

        let matching: Vec<PriceRecord> = records
            .records
            .iter()
            .filter(|r| same(&r.commodity, crop) && same(&r.state, state) && same(&r.market, market))
            .cloned()
            .collect();
        let message = matching.is_empty().then(|| NO_PRICE_DATA.to_string());

        Ok(PriceListResponse {
            records: matching,
            message,
        })
    }

    async fn price_records(&self, cancel: &CancellationToken) -> Result<Arc<PriceFeed>, DomainError> {
        let feed = self
            .prices
            .as_ref()
            .ok_or_else(|| DomainError::internal("price upstream not configured"))?;
        let params = vec![
            ("format".to_string(), "json".to_string()),
            ("limit".to_string(), PRICE_PAGE_LIMIT.to_string()),
        ];
        feed.load("", params, cancel).await
    }
}

fn same(candidate: &str, wanted: &str) -> bool {
    candidate.to_lowercase() == wanted.to_lowercase()
}

fn distinct<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    names
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
