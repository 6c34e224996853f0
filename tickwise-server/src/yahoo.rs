//! Yahoo Finance chart API client: spot price, candle history, India VIX and the global
//! cues (Nasdaq 100, Nifty spot).

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tickwise::{
    Candle, UpstreamError,
    candle::HistoryProvider,
    context::{ContextProvider, GlobalCues, MarketQuote},
};
use tracing::debug;

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SOURCE: &str = "yahoo";

const INDIA_VIX: &str = "^INDIAVIX";
const NASDAQ_100: &str = "^NDX";
const NIFTY_50: &str = "^NSEI";

/// Map an exchange symbol to its Yahoo ticker: known indices to their `^` code, anything
/// else to the NSE listing.
pub fn ticker(symbol: &str) -> String {
    let symbol = symbol.trim().to_uppercase();
    match symbol.as_str() {
        "NIFTY" | "NIFTY50" => NIFTY_50.to_owned(),
        "BANKNIFTY" => "^NSEBANK".to_owned(),
        "FINNIFTY" => "NIFTY_FIN_SERVICE.NS".to_owned(),
        "SENSEX" => "^BSESN".to_owned(),
        "INDIAVIX" => INDIA_VIX.to_owned(),
        _ if symbol.starts_with('^') || symbol.contains('.') => symbol,
        _ => format!("{symbol}.NS"),
    }
}

/// Chart `(interval, range)` whose bars are at least as long as the candle interval, so
/// every seed bar spans one or more aggregator buckets.
pub fn chart_params(interval_secs: u64) -> (&'static str, &'static str) {
    match interval_secs {
        0..=60 => ("1m", "5d"),
        61..=300 => ("5m", "1mo"),
        301..=900 => ("15m", "1mo"),
        901..=3600 => ("60m", "3mo"),
        _ => ("1d", "2y"),
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartResult {
    fn parse(body: &str) -> Result<Self, UpstreamError> {
        let response = serde_json::from_str::<ChartResponse>(body)
            .map_err(|error| UpstreamError::parse(SOURCE, error.to_string()))?;

        if let Some(error) = response.chart.error {
            return Err(UpstreamError::unavailable(
                SOURCE,
                format!("{}: {}", error.code, error.description),
            ));
        }

        response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| UpstreamError::parse(SOURCE, "empty chart result"))
    }

    /// Complete, valid bars in chronological order. Bars with a missing field are skipped.
    fn candles(&self) -> Vec<Candle> {
        let Some(quote) = self.indicators.quote.first() else {
            return Vec::new();
        };
        let at = |values: &[Option<f64>], index: usize| values.get(index).copied().flatten();

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(index, ts)| {
                Some(Candle {
                    start_ts: DateTime::from_timestamp(*ts, 0)?,
                    open: at(&quote.open, index)?,
                    high: at(&quote.high, index)?,
                    low: at(&quote.low, index)?,
                    close: at(&quote.close, index)?,
                    volume: at(&quote.volume, index),
                })
            })
            .filter(Candle::is_valid)
            .collect()
    }

    fn closes(&self) -> Vec<f64> {
        self.indicators
            .quote
            .first()
            .map(|quote| quote.close.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    fn last_price(&self) -> Option<f64> {
        self.meta
            .regular_market_price
            .or_else(|| self.closes().last().copied())
            .filter(|price| price.is_finite() && *price > 0.0)
    }

    /// Last daily close and its change versus the previous one, in percent.
    fn daily_quote(&self) -> Option<MarketQuote> {
        let closes = self.closes();
        let last = closes.last().copied().or(self.meta.regular_market_price)?;
        let previous = match closes.len() {
            0 | 1 => self.meta.chart_previous_close,
            len => Some(closes[len - 2]),
        };

        let change_pct = match previous {
            Some(previous) if previous > 0.0 => (last - previous) / previous * 100.0,
            _ => 0.0,
        };
        Some(MarketQuote { last, change_pct })
    }
}

/// Client over the public chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; tickwise)")
            .build()?;
        Ok(Self { client })
    }

    async fn chart(
        &self,
        ticker: &str,
        interval: &str,
        range: &str,
    ) -> Result<ChartResult, UpstreamError> {
        let response = self
            .client
            .get(format!("{BASE_URL}/{ticker}"))
            .query(&[("interval", interval), ("range", range)])
            .send()
            .await
            .map_err(|error| UpstreamError::unavailable(SOURCE, error.to_string()))?;

        if let Err(status_err) = response.error_for_status_ref() {
            return Err(UpstreamError::unavailable(
                SOURCE,
                format!("chart {ticker}: {status_err}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|error| UpstreamError::unavailable(SOURCE, error.to_string()))?;
        ChartResult::parse(&body)
    }

    /// Latest traded price of `symbol`.
    pub async fn price(&self, symbol: &str) -> Result<f64, UpstreamError> {
        let ticker = ticker(symbol);
        self.chart(&ticker, "1m", "1d")
            .await?
            .last_price()
            .ok_or_else(|| UpstreamError::parse(SOURCE, format!("no price for {ticker}")))
    }

    async fn daily_quote(&self, ticker: &str) -> Result<MarketQuote, UpstreamError> {
        self.chart(ticker, "1d", "5d")
            .await?
            .daily_quote()
            .ok_or_else(|| UpstreamError::parse(SOURCE, format!("no daily close for {ticker}")))
    }
}

#[async_trait]
impl HistoryProvider for YahooClient {
    async fn history(
        &self,
        symbol: &str,
        interval_secs: u64,
        limit: usize,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let ticker = ticker(symbol);
        let (interval, range) = chart_params(interval_secs);
        let candles = self.chart(&ticker, interval, range).await?.candles();
        debug!(%ticker, interval, bars = candles.len(), "fetched history");

        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl ContextProvider for YahooClient {
    async fn volatility_index(&self) -> Result<f64, UpstreamError> {
        self.chart(INDIA_VIX, "1d", "5d")
            .await?
            .last_price()
            .ok_or_else(|| UpstreamError::parse(SOURCE, "no India VIX value"))
    }

    /// Either market may be missing; fails only when both are.
    async fn global_cues(&self) -> Result<GlobalCues, UpstreamError> {
        let (nasdaq, nifty_spot) =
            futures::join!(self.daily_quote(NASDAQ_100), self.daily_quote(NIFTY_50));

        match (nasdaq, nifty_spot) {
            (Err(error), Err(_)) => Err(error),
            (nasdaq, nifty_spot) => Ok(GlobalCues {
                nasdaq: nasdaq.ok(),
                nifty_spot: nifty_spot.ok(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"regularMarketPrice": 24150.5, "chartPreviousClose": 23800.0},
                "timestamp": [1736135100, 1736135400, 1736135700],
                "indicators": {"quote": [{
                    "open":   [24000.0, 24050.0, null],
                    "high":   [24080.0, 24120.0, 24160.0],
                    "low":    [23990.0, 24040.0, 24100.0],
                    "close":  [24050.0, 24100.0, 24150.0],
                    "volume": [1200, null, 900]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_ticker() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let cases = vec![
            // TC0
            TestCase {
                input: "nifty",
                expected: "^NSEI",
            },
            // TC1
            TestCase {
                input: "BANKNIFTY",
                expected: "^NSEBANK",
            },
            // TC2
            TestCase {
                input: "reliance",
                expected: "RELIANCE.NS",
            },
            // TC3: already a Yahoo ticker
            TestCase {
                input: "^NDX",
                expected: "^NDX",
            },
            // TC4
            TestCase {
                input: "TCS.BO",
                expected: "TCS.BO",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(ticker(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_chart_params() {
        struct TestCase {
            input: u64,
            expected: (&'static str, &'static str),
        }

        let cases = vec![
            // TC0
            TestCase {
                input: 5,
                expected: ("1m", "5d"),
            },
            // TC1
            TestCase {
                input: 60,
                expected: ("1m", "5d"),
            },
            // TC2: 3m candles never seed from finer 1m bars
            TestCase {
                input: 180,
                expected: ("5m", "1mo"),
            },
            // TC3
            TestCase {
                input: 300,
                expected: ("5m", "1mo"),
            },
            // TC4
            TestCase {
                input: 900,
                expected: ("15m", "1mo"),
            },
            // TC5: 30m rounds up to hourly bars
            TestCase {
                input: 1800,
                expected: ("60m", "3mo"),
            },
            // TC6
            TestCase {
                input: 3600,
                expected: ("60m", "3mo"),
            },
            // TC7
            TestCase {
                input: 3601,
                expected: ("1d", "2y"),
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(chart_params(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_parse_chart_skips_incomplete_bars() {
        let chart = ChartResult::parse(CHART).unwrap();

        let candles = chart.candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].start_ts.timestamp(), 1736135100);
        assert_eq!(candles[0].volume, Some(1200.0));
        assert_eq!(candles[1].close, 24100.0);
        assert_eq!(candles[1].volume, None);

        assert_eq!(chart.last_price(), Some(24150.5));
    }

    #[test]
    fn test_daily_quote() {
        let quote = ChartResult::parse(CHART).unwrap().daily_quote().unwrap();
        assert_eq!(quote.last, 24150.0);
        assert!((quote.change_pct - (50.0 / 24100.0 * 100.0)).abs() < 1e-9);

        let single = r#"{"chart": {"result": [{
            "meta": {"regularMarketPrice": 101.0, "chartPreviousClose": 100.0},
            "timestamp": [1736121600],
            "indicators": {"quote": [{"close": [101.0]}]}
        }]}}"#;
        let quote = ChartResult::parse(single).unwrap().daily_quote().unwrap();
        assert_eq!(quote.last, 101.0);
        assert!((quote.change_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_chart_errors() {
        struct TestCase {
            input: &'static str,
            expected_unavailable: bool,
        }

        let cases = vec![
            // TC0: upstream error payload
            TestCase {
                input: r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#,
                expected_unavailable: true,
            },
            // TC1: empty result
            TestCase {
                input: r#"{"chart": {"result": [], "error": null}}"#,
                expected_unavailable: false,
            },
            // TC2: not JSON
            TestCase {
                input: "<html>Too Many Requests</html>",
                expected_unavailable: false,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let error = ChartResult::parse(test.input).unwrap_err();
            assert_eq!(error.source_name(), SOURCE, "TC{} failed", index);
            assert_eq!(
                matches!(error, UpstreamError::Unavailable { .. }),
                test.expected_unavailable,
                "TC{} failed",
                index
            );
        }
    }
}
