use super::{TtlCache, ttl::TtlSchedule};
use crate::{
    context::{ContextProvider, FlowData, GlobalCues, NewsSentiment, SectorView, Sourced},
    error::UpstreamError,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub const VOLATILITY_INDEX_KEY: &str = "india_vix";
pub const GLOBAL_CUES_KEY: &str = "global_cues";
pub const NEWS_KEY: &str = "news";
pub const FLOWS_KEY: &str = "flows";

/// Shared cache of market context, filled by the [`ContextRefresher`] and read on the
/// request path.
///
/// Sector views are filled on the request path, one key per symbol and action, and are
/// purged by the refresher once expired.
#[derive(Debug, Default)]
pub struct ContextStore {
    pub volatility_index: TtlCache<f64>,
    pub global_cues: TtlCache<GlobalCues>,
    pub news: TtlCache<NewsSentiment>,
    pub flows: TtlCache<FlowData>,
    pub sectors: TtlCache<SectorView>,
}

impl ContextStore {
    /// Last known volatility index, stale or not.
    pub fn vix(&self) -> Option<f64> {
        self.volatility_index.get(VOLATILITY_INDEX_KEY)
    }

    pub fn global(&self) -> Sourced<GlobalCues> {
        sourced(self.global_cues.get(GLOBAL_CUES_KEY))
    }

    pub fn news(&self) -> Sourced<NewsSentiment> {
        sourced(self.news.get(NEWS_KEY))
    }

    pub fn flows(&self) -> Sourced<FlowData> {
        sourced(self.flows.get(FLOWS_KEY))
    }
}

fn sourced<T: Default>(value: Option<T>) -> Sourced<T> {
    value.map_or_else(|| Sourced::unavailable("not fetched yet"), Sourced::available)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// Delay before the first pass.
    pub initial_delay: Duration,
    /// Time between passes; each pass only refreshes entries that are due.
    pub period: Duration,
    pub volatility_index_ttl: Duration,
    /// Bound on every upstream call.
    pub upstream_timeout: Duration,
    pub global_cues: TtlSchedule,
    pub news: TtlSchedule,
    pub flows: TtlSchedule,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            period: Duration::from_secs(10),
            volatility_index_ttl: Duration::from_secs(30),
            upstream_timeout: Duration::from_secs(4),
            global_cues: TtlSchedule::global_cues(),
            news: TtlSchedule::news(),
            flows: TtlSchedule::flows(),
        }
    }
}

impl RefreshConfig {
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }
}

/// Background loop keeping [`ContextStore`] fresh at a rate tied to current volatility.
///
/// Each pass polls the volatility index first (when its own TTL lapsed), then refreshes
/// every context class whose age exceeds the TTL implied by the latest index value. A
/// failing source is logged and keeps its last good value; the other sources are
/// unaffected.
pub struct ContextRefresher {
    provider: Arc<dyn ContextProvider>,
    store: Arc<ContextStore>,
    config: RefreshConfig,
}

impl std::fmt::Debug for ContextRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRefresher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a running [`ContextRefresher`].
#[derive(Debug)]
pub struct RefreshHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the loop and wait for the in-progress pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(error) = self.task.await {
            warn!(%error, "context refresher task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ContextRefresher {
    pub fn new(
        provider: Arc<dyn ContextProvider>,
        store: Arc<ContextStore>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn spawn(self) -> RefreshHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            info!(
                initial_delay_ms = self.config.initial_delay.as_millis() as u64,
                period_secs = self.config.period.as_secs(),
                "context refresher started"
            );

            let start = Instant::now() + self.config.initial_delay;
            let mut interval = tokio::time::interval_at(start, self.config.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => self.refresh_once().await,
                    _ = shutdown_rx.recv() => {
                        info!("context refresher stopped");
                        break;
                    }
                }
            }
        });

        RefreshHandle { shutdown_tx, task }
    }

    /// Run a single refresh pass.
    pub async fn refresh_once(&self) {
        let store = &self.store;
        let vix_ttl = self.config.volatility_index_ttl;

        if is_due(store.volatility_index.age(VOLATILITY_INDEX_KEY), vix_ttl) {
            if let Some(vix) = self
                .fetch("volatility_index", self.provider.volatility_index())
                .await
            {
                store.volatility_index.set(VOLATILITY_INDEX_KEY, vix, vix_ttl);
            }
        }
        let vix = store.vix();

        let ttl = self.config.global_cues.ttl(vix);
        if is_due(store.global_cues.age(GLOBAL_CUES_KEY), ttl) {
            if let Some(cues) = self.fetch("global_cues", self.provider.global_cues()).await {
                store.global_cues.set(GLOBAL_CUES_KEY, cues, ttl);
            }
        }

        let ttl = self.config.flows.ttl(vix);
        if is_due(store.flows.age(FLOWS_KEY), ttl) {
            if let Some(flows) = self.fetch("flows", self.provider.flows()).await {
                store.flows.set(FLOWS_KEY, flows, ttl);
            }
        }

        let ttl = self.config.news.ttl(vix);
        if is_due(store.news.age(NEWS_KEY), ttl) {
            if let Some(news) = self.fetch("news", self.provider.news()).await {
                store.news.set(NEWS_KEY, news, ttl);
            }
        }

        // Sector views are only ever read fresh
        let purged = store.sectors.purge_expired();
        if purged > 0 {
            debug!(purged, remaining = store.sectors.len(), "purged expired sector views");
        }
    }

    async fn fetch<T>(
        &self,
        source: &'static str,
        request: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Option<T> {
        let timeout = self.config.upstream_timeout;
        let result = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::timeout(source, timeout.as_secs())),
        };

        match result {
            Ok(value) => {
                debug!(source, "refreshed context");
                Some(value)
            }
            Err(error) => {
                warn!(source, %error, "context refresh failed, keeping last value");
                None
            }
        }
    }
}

fn is_due(age: Option<Duration>, ttl: Duration) -> bool {
    age.is_none_or(|age| age >= ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingProvider {
        vix: f64,
        vix_calls: AtomicUsize,
        global_calls: AtomicUsize,
        news_calls: AtomicUsize,
        flows_calls: AtomicUsize,
    }

    #[async_trait]
    impl ContextProvider for CountingProvider {
        async fn volatility_index(&self) -> Result<f64, UpstreamError> {
            self.vix_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vix)
        }

        async fn global_cues(&self) -> Result<GlobalCues, UpstreamError> {
            self.global_calls.fetch_add(1, Ordering::SeqCst);
            Ok(GlobalCues::default())
        }

        async fn news(&self) -> Result<NewsSentiment, UpstreamError> {
            self.news_calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::unavailable("news", "HTTP 503"))
        }

        async fn flows(&self) -> Result<FlowData, UpstreamError> {
            self.flows_calls.fetch_add(1, Ordering::SeqCst);
            Ok(FlowData {
                fii_net: 700.0,
                score: 0.7,
                label: "Buying".to_owned(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_cadence_follows_volatility() {
        let provider = Arc::new(CountingProvider {
            vix: 25.0,
            ..Default::default()
        });
        let store = Arc::new(ContextStore::default());
        let handle = ContextRefresher::new(
            Arc::clone(&provider) as Arc<dyn ContextProvider>,
            Arc::clone(&store),
            RefreshConfig::default(),
        )
        .spawn();

        // Passes at t = 2, 12, 22, 32
        tokio::time::sleep(Duration::from_secs(33)).await;

        // 30s index TTL: t = 2, 32
        assert_eq!(provider.vix_calls.load(Ordering::SeqCst), 2);
        // 8s TTL above 20: every pass
        assert_eq!(provider.global_calls.load(Ordering::SeqCst), 4);
        // 30s TTL above 18: t = 2, 32
        assert_eq!(provider.flows_calls.load(Ordering::SeqCst), 2);
        // News never succeeds, so it is retried every pass
        assert_eq!(provider.news_calls.load(Ordering::SeqCst), 4);

        assert_eq!(store.vix(), Some(25.0));
        assert!(store.global().is_available());
        assert_eq!(store.flows().value.fii_net, 700.0);
        assert!(!store.news().is_available());

        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let provider = Arc::new(CountingProvider::default());
        let handle = ContextRefresher::new(
            Arc::clone(&provider) as Arc<dyn ContextProvider>,
            Arc::new(ContextStore::default()),
            RefreshConfig::default(),
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.shutdown().await;
        let calls = provider.global_calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.global_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_purges_expired_sector_views() {
        let store = Arc::new(ContextStore::default());
        let refresher = ContextRefresher::new(
            Arc::new(CountingProvider::default()),
            Arc::clone(&store),
            RefreshConfig::default(),
        );

        let ttl = Duration::from_secs(30);
        for symbol in ["NIFTY", "BANKNIFTY", "INFY", "TCS"] {
            store
                .sectors
                .set(&format!("sector_{symbol}_BUY"), SectorView::default(), ttl);
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        store.sectors.set("sector_NIFTY_SELL", SectorView::default(), ttl);

        refresher.refresh_once().await;
        assert_eq!(store.sectors.len(), 1);
        assert!(store.sectors.get_fresh("sector_NIFTY_SELL").is_some());
    }

    #[tokio::test]
    async fn test_unconfigured_sources_are_unavailable() {
        struct Unconfigured;
        impl ContextProvider for Unconfigured {}

        let store = Arc::new(ContextStore::default());
        ContextRefresher::new(Arc::new(Unconfigured), Arc::clone(&store), RefreshConfig::default())
            .refresh_once()
            .await;

        assert_eq!(store.vix(), None);
        assert!(!store.global().is_available());
        assert!(!store.flows().is_available());
    }
}
