use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tickwise::{Candle, UpstreamError, ml::ProbabilityModel};
use url::Url;

const SOURCE: &str = "ml";

/// Bars sent per prediction request.
const HISTORY_BARS: usize = 120;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    symbol: &'a str,
    candles: &'a [Candle],
}

/// Remote multi-horizon model reached over HTTP.
///
/// POSTs `{symbol, candles}` and expects the raw `{enabled, p1, p3, p5, ...}` prediction
/// back; lenient parsing happens downstream.
#[derive(Debug, Clone)]
pub struct HttpModel {
    client: Client,
    url: Url,
}

impl HttpModel {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ProbabilityModel for HttpModel {
    async fn predict_next(&self, symbol: &str, history: &[Candle]) -> Result<Value, UpstreamError> {
        let candles = &history[history.len().saturating_sub(HISTORY_BARS)..];

        let response = self
            .client
            .post(self.url.clone())
            .json(&PredictRequest { symbol, candles })
            .send()
            .await
            .map_err(|error| UpstreamError::unavailable(SOURCE, error.to_string()))?;

        if let Err(status_err) = response.error_for_status_ref() {
            return Err(UpstreamError::unavailable(SOURCE, status_err.to_string()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| UpstreamError::parse(SOURCE, error.to_string()))
    }
}
