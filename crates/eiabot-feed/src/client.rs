//! HTTP client for the EIA open-data API.
//!
//! Issues one GET per `SeriesQuery` and hands the body to the parser. No
//! retries: a failure is returned to the caller and the scheduler decides
//! whether to try again.

use crate::error::{FeedError, FeedResult};
use crate::parser::{parse_data_response, parse_legacy_response, validate};
use crate::query::{Endpoint, SeriesQuery};
use eiabot_core::{BoxFuture, SeriesSet};
use parking_lot::Mutex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of series data.
///
/// Implemented by `EiaClient` in production and by `StaticSeriesSource`
/// in tests.
pub trait SeriesSource: Send + Sync {
    /// Fetch and shape-check one query.
    fn fetch<'a>(&'a self, query: &'a SeriesQuery) -> BoxFuture<'a, FeedResult<SeriesSet>>;
}

/// Client for the EIA API.
pub struct EiaClient {
    client: Client,
    /// API root, e.g. "https://api.eia.gov".
    base_url: String,
    api_key: String,
}

impl EiaClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - API root without trailing slash
    /// * `api_key` - EIA API key (never logged)
    /// * `timeout` - per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Fetch one query and validate its shape.
    pub async fn fetch_series(&self, query: &SeriesQuery) -> FeedResult<SeriesSet> {
        let body = match &query.endpoint {
            Endpoint::Data { route } => self.get_data(route, query).await?,
            Endpoint::LegacySeries { .. } => self.get_legacy(query).await?,
        };

        let set = match &query.endpoint {
            Endpoint::Data { .. } => parse_data_response(&body, query)?,
            Endpoint::LegacySeries { .. } => parse_legacy_response(&body, query)?,
        };
        validate(query, &set)?;

        info!(
            series = set.len(),
            latest = ?set.iter().next().and_then(|s| s.latest()).map(|p| p.period.to_iso()),
            "Fetched series from EIA"
        );

        Ok(set)
    }

    async fn get_data(&self, route: &str, query: &SeriesQuery) -> FeedResult<String> {
        let url = format!("{}/v2/{}/data/", self.base_url, route.trim_matches('/'));
        let params = serde_json::to_string(&query.x_params())?;

        info!(route = %route, series = query.series.len(), "Fetching v2 data from EIA");
        debug!(x_params = %params, "X-Params");

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .header("X-Params", params)
            .send()
            .await
            // The request URL carries the API key, strip it from the error.
            .map_err(|e| FeedError::UpstreamUnavailable(format!("HTTP request failed: {}", e.without_url())))?;

        Self::read_body(response).await
    }

    async fn get_legacy(&self, query: &SeriesQuery) -> FeedResult<String> {
        let url = format!("{}/series/", self.base_url);
        let series_param = query.legacy_series_param();
        let num = query.lookback.to_string();

        info!(series = %series_param, "Fetching legacy series from EIA");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("out", "json"),
                ("series_id", series_param.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FeedError::UpstreamUnavailable(format!("HTTP request failed: {}", e.without_url())))?;

        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> FeedResult<String> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::UpstreamUnavailable(format!("HTTP {status}: {body}")));
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::UpstreamUnavailable(format!("Failed to read body: {}", e.without_url())))
    }
}

impl SeriesSource for EiaClient {
    fn fetch<'a>(&'a self, query: &'a SeriesQuery) -> BoxFuture<'a, FeedResult<SeriesSet>> {
        Box::pin(self.fetch_series(query))
    }
}

/// Canned series source for tests and dry runs.
///
/// Answers each query by picking the requested series out of a fixed set,
/// then applies the same shape checks as the real client.
#[derive(Debug, Default)]
pub struct StaticSeriesSource {
    data: Mutex<SeriesSet>,
    failure: Mutex<Option<String>>,
    calls: Mutex<usize>,
}

impl StaticSeriesSource {
    pub fn new(data: SeriesSet) -> Self {
        Self {
            data: Mutex::new(data),
            failure: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    /// Replace the canned data (e.g. to simulate a new week).
    pub fn set_data(&self, data: SeriesSet) {
        *self.data.lock() = data;
    }

    /// Make subsequent fetches fail with `UpstreamUnavailable`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

impl SeriesSource for StaticSeriesSource {
    fn fetch<'a>(&'a self, query: &'a SeriesQuery) -> BoxFuture<'a, FeedResult<SeriesSet>> {
        Box::pin(async move {
            *self.calls.lock() += 1;
            if let Some(reason) = self.failure.lock().clone() {
                return Err(FeedError::UpstreamUnavailable(reason));
            }

            let data = self.data.lock().clone();
            let picked = SeriesSet::new(
                query
                    .series
                    .iter()
                    .filter_map(|id| data.get(id).cloned())
                    .collect(),
            );
            validate(query, &picked)?;
            Ok(picked)
        })
    }
}
