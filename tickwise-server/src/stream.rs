use crate::{config::ServerConfig, yahoo::YahooClient};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::{net::SocketAddr, sync::Arc};
use tickwise::{SignalEngine, engine::MAX_INTERVAL_SECS};
use tokio::{
    net::{TcpListener, TcpStream},
    time::MissedTickBehavior,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
    },
};
use tracing::{debug, error, info, warn};
use url::Url;

/// Shared by every subscriber connection.
#[derive(Debug)]
pub struct AppState {
    pub engine: SignalEngine,
    pub prices: YahooClient,
    pub config: ServerConfig,
}

/// What a client asked for in its upgrade request, e.g. `/ws?symbol=NIFTY&interval=5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub symbol: String,
    pub interval_secs: u64,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            symbol: "NIFTY".to_owned(),
            interval_secs: 5,
        }
    }
}

impl Subscription {
    /// Parse the request target. Missing or malformed parameters keep their defaults.
    pub fn from_target(target: &str) -> Self {
        let mut subscription = Self::default();
        let Ok(url) = Url::parse("ws://localhost/").and_then(|base| base.join(target)) else {
            return subscription;
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "symbol" if !value.trim().is_empty() => {
                    subscription.symbol = value.trim().to_uppercase();
                }
                "interval" => match value.parse::<u64>() {
                    Ok(secs) if (1..=MAX_INTERVAL_SECS).contains(&secs) => {
                        subscription.interval_secs = secs
                    }
                    _ => warn!(%value, "ignoring malformed interval"),
                },
                _ => {}
            }
        }
        subscription
    }
}

/// Accept WebSocket subscribers until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) {
    while let Ok((stream, peer_addr)) = listener.accept().await {
        info!("New WebSocket connection from {}", peer_addr);
        tokio::spawn(handle_client(stream, peer_addr, Arc::clone(&state)));
    }
}

/// Handle individual WebSocket subscriber: one report per period until disconnect.
async fn handle_client(stream: TcpStream, peer_addr: SocketAddr, state: Arc<AppState>) {
    let mut target = String::new();
    let ws_stream = match accept_hdr_async(stream, |request: &Request, response: Response| {
        target = request.uri().to_string();
        Ok(response)
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", peer_addr, e);
            return;
        }
    };

    let subscription = Subscription::from_target(&target);
    info!(
        %peer_addr,
        symbol = %subscription.symbol,
        interval_secs = subscription.interval_secs,
        "WebSocket subscription started"
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = serde_json::json!({
        "type": "welcome",
        "symbol": subscription.symbol,
        "interval": subscription.interval_secs,
        "timestamp": Utc::now()
    });
    if let Ok(msg) = serde_json::to_string(&welcome) {
        let _ = ws_sender.send(Message::Text(msg.into())).await;
    }

    // Evaluate and push reports to this subscriber
    let mut send_task = tokio::spawn(async move {
        let Subscription {
            symbol,
            interval_secs,
        } = subscription;
        let mut ticker = tokio::time::interval(state.config.stream_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let price = match state.prices.price(&symbol).await {
                Ok(price) => Some(price),
                Err(error) => {
                    warn!(%symbol, %error, "price fetch failed, reusing last close");
                    None
                }
            };

            let report = match state.engine.evaluate(&symbol, interval_secs, price).await {
                Ok(report) => report,
                Err(error) => {
                    warn!(%symbol, %error, kind = ?error.kind(), "evaluation failed, retrying");
                    tokio::time::sleep(state.config.retry_delay).await;
                    continue;
                }
            };

            match serde_json::to_string(&report) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(error) => warn!(%symbol, %error, "failed to serialise report"),
            }
        }
    });

    // Handle incoming messages from client (e.g., ping/pong)
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) => {
                    debug!("Received ping from {}", peer_addr);
                }
                Ok(Message::Text(text)) => {
                    debug!("Received text from {}: {}", peer_addr, text);
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", peer_addr, e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => {
            info!("Send task completed for {}", peer_addr);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            info!("Receive task completed for {}", peer_addr);
            send_task.abort();
        }
    }

    info!("WebSocket connection closed for {}", peer_addr);
}
