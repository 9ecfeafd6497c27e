//! Kucoin session — `/market/ticker:<sym>` topic.
//!
//! Kucoin needs a two-step bootstrap: an HTTP POST to `bullet-public`
//! returns a token, the WebSocket endpoint, and the ping cadence the server
//! expects. Subscriptions are sent one per symbol, spaced to respect venue
//! rate limits, and an app-level ping goes out at 90% of the advertised
//! interval. A failed bootstrap is fatal for this session only: it is
//! retried after the usual backoff.

use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, bail};
use futures_util::{SinkExt, StreamExt};
use pix_core::time_util;
use pix_core::types::TickerData;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const BULLET_URL: &str = "https://api.kucoin.com/api/v1/bullet-public";

/// Spacing between the per-symbol subscription messages.
const SUBSCRIBE_SPACING: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct BulletResponse {
    code: String,
    #[serde(default)]
    data: Option<BulletData>,
}

#[derive(Debug, Deserialize)]
struct BulletData {
    token: String,
    #[serde(rename = "instanceServers")]
    instance_servers: Vec<InstanceServer>,
}

#[derive(Debug, Deserialize)]
struct InstanceServer {
    endpoint: String,
    #[serde(rename = "pingInterval")]
    ping_interval: u64, // ms
}

#[derive(Debug, Deserialize)]
struct KucoinTicker {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    topic: String,
    data: KucoinQuote,
}

#[derive(Debug, Deserialize)]
struct KucoinQuote {
    #[serde(rename = "bestBid")]
    best_bid: String,
    #[serde(rename = "bestBidSize")]
    best_bid_size: String,
    #[serde(rename = "bestAsk")]
    best_ask: String,
    #[serde(rename = "bestAskSize")]
    best_ask_size: String,
}

pub async fn run(ctx: SessionCtx) {
    // Pushes are keyed by the full topic, so the slot map is too.
    let slots: AHashMap<String, usize> = ctx
        .slot_entries()
        .map(|(i, s)| (format!("/market/ticker:{s}"), i))
        .collect();
    let http = reqwest::Client::new();
    let mut shutdown = ctx.shutdown.clone();
    let mut backoff = ws::RECONNECT_BACKOFF;

    loop {
        if *shutdown.borrow() {
            info!("[kucoin] shutdown requested");
            return;
        }

        let (ws_url, ping_interval) = match bootstrap(&http).await {
            Ok(b) => b,
            Err(e) => {
                error!("[kucoin] bootstrap failed: {e}, retrying in {backoff:?}");
                if !ws::wait(&mut shutdown, backoff).await {
                    return;
                }
                backoff = ws::next_backoff(backoff);
                continue;
            }
        };

        info!("[kucoin] connecting (ping interval {ping_interval:?})");
        let stream = match ws::connect(&ws_url).await {
            Ok(s) => {
                backoff = ws::RECONNECT_BACKOFF;
                info!("[kucoin] connected");
                s
            }
            Err(e) => {
                error!("[kucoin] connection failed: {e}, retrying in {backoff:?}");
                if !ws::wait(&mut shutdown, backoff).await {
                    return;
                }
                backoff = ws::next_backoff(backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = stream.split();

        // One subscription per symbol, paced to stay under the rate limit.
        let mut subscribed = true;
        for (_, sym) in ctx.slot_entries() {
            let sub = serde_json::json!({
                "id": time_util::now_ns().to_string(),
                "type": "subscribe",
                "topic": format!("/market/ticker:{sym}"),
                "privateChannel": false,
                "response": true
            })
            .to_string();
            if let Err(e) = ws_write.send(Message::Text(sub.into())).await {
                error!("[kucoin] subscribe send failed: {e}");
                subscribed = false;
                break;
            }
            tokio::time::sleep(SUBSCRIBE_SPACING).await;
        }
        if !subscribed {
            if !ws::wait(&mut shutdown, backoff).await {
                return;
            }
            continue;
        }

        let mut ping = tokio::time::interval(ping_interval.mul_f64(0.9));
        ping.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[kucoin] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                _ = ping.tick() => {
                    let msg = serde_json::json!({
                        "id": time_util::now_ms(),
                        "type": "ping"
                    })
                    .to_string();
                    if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                        error!("[kucoin] ping send failed: {e}");
                        break;
                    }
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some((slot, data)) = parse(&text, &slots) {
                                ctx.publish(slot, data).await;
                            }
                        }
                        Some(Ok(Message::Ping(p))) => {
                            let _ = ws_write.send(Message::Pong(p)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[kucoin] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[kucoin] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[kucoin] stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        warn!("[kucoin] disconnected, reconnecting in {backoff:?}");
        if !ws::wait(&mut shutdown, backoff).await {
            return;
        }
        backoff = ws::next_backoff(backoff);
    }
}

/// Request a connection token; returns the tokenized WS URL and the
/// server-advertised ping interval.
async fn bootstrap(http: &reqwest::Client) -> anyhow::Result<(String, Duration)> {
    let resp: BulletResponse = http
        .post(BULLET_URL)
        .send()
        .await
        .context("bullet-public request")?
        .json()
        .await
        .context("bullet-public body")?;
    let (url, interval) = resolve_bullet(&resp)?;
    Ok((url, interval))
}

fn resolve_bullet(resp: &BulletResponse) -> anyhow::Result<(String, Duration)> {
    if resp.code != "200000" {
        bail!("bullet-public returned code {}", resp.code);
    }
    let data = resp.data.as_ref().context("bullet-public data missing")?;
    let server = data.instance_servers.first().context("no instance servers")?;
    let url = format!("{}?token={}", server.endpoint, data.token);
    Ok((url, Duration::from_millis(server.ping_interval)))
}

fn parse(text: &str, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: KucoinTicker = serde_json::from_str(text).ok()?;
    if t.kind != "message" {
        return None;
    }
    let slot = *slots.get(&t.topic)?;
    let data = TickerData::new(
        parse_f64(&t.data.best_bid)?,
        parse_f64(&t.data.best_ask)?,
        parse_f64(&t.data.best_bid_size)?,
        parse_f64(&t.data.best_ask_size)?,
    );
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("/market/ticker:BTC-USDT".to_string(), 0)])
    }

    #[test]
    fn parse_ticker_message() {
        let json = r#"{"type":"message","topic":"/market/ticker:BTC-USDT","subject":"trade.ticker",
            "data":{"bestAsk":"60000.2","bestAskSize":"0.4","bestBid":"60000.1",
                    "bestBidSize":"1.1","price":"60000.15","sequence":"123","size":"0.01",
                    "time":1672515782136}}"#;
        let (slot, t) = parse(json, &slots()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(t, TickerData::new(60000.1, 60000.2, 1.1, 0.4));
    }

    #[test]
    fn welcome_message_dropped() {
        let json = r#"{"id":"abc","type":"welcome"}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn bullet_response_resolves_url_and_interval() {
        let resp: BulletResponse = serde_json::from_str(
            r#"{"code":"200000","data":{"token":"tok123",
                "instanceServers":[{"endpoint":"wss://ws-api.kucoin.com/endpoint",
                                    "pingInterval":18000,"pingTimeout":10000}]}}"#,
        )
        .unwrap();
        let (url, interval) = resolve_bullet(&resp).unwrap();
        assert_eq!(url, "wss://ws-api.kucoin.com/endpoint?token=tok123");
        assert_eq!(interval, Duration::from_millis(18000));
        // pings go out at 90% of the advertised interval
        assert_eq!(interval.mul_f64(0.9), Duration::from_millis(16200));
    }

    #[test]
    fn bullet_error_code_rejected() {
        let resp: BulletResponse =
            serde_json::from_str(r#"{"code":"500000","data":null}"#).unwrap();
        assert!(resolve_bullet(&resp).is_err());
    }
}
