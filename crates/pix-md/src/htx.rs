//! HTX session — `market.<sym>.bbo` channel.
//!
//! HTX gzip-wraps every frame, so the session gunzips before parsing. Ping
//! control frames `{"ping": N}` must be answered with `{"pong": N}` on the
//! same socket and never reach the normalizer, which is why this venue
//! carries its own read loop instead of the generic one in [`crate::ws`].

use std::io::Read;

use ahash::AHashMap;
use flate2::read::GzDecoder;
use futures_util::{SinkExt, StreamExt};
use pix_core::types::TickerData;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://api-aws.huobi.pro/ws";

#[derive(Debug, Deserialize)]
struct HtxTicker {
    #[serde(default)]
    ch: String,
    tick: HtxTick,
}

#[derive(Debug, Deserialize)]
struct HtxTick {
    symbol: String,
    bid: f64,
    #[serde(rename = "bidSize")]
    bid_size: f64,
    ask: f64,
    #[serde(rename = "askSize")]
    ask_size: f64,
}

/// What one gunzipped frame turned out to be.
enum Frame {
    /// Heartbeat to echo back as `{"pong": N}`.
    Ping(serde_json::Value),
    Quote(usize, TickerData),
    /// Ack, unknown symbol, or malformed payload.
    Skip,
}

pub async fn run(ctx: SessionCtx) {
    let slots = ctx.slot_map();
    let mut shutdown = ctx.shutdown.clone();
    let mut backoff = ws::RECONNECT_BACKOFF;

    loop {
        if *shutdown.borrow() {
            info!("[htx] shutdown requested");
            return;
        }

        info!("[htx] connecting to {WS_URL}");
        let stream = match ws::connect(WS_URL).await {
            Ok(s) => {
                backoff = ws::RECONNECT_BACKOFF;
                info!("[htx] connected");
                s
            }
            Err(e) => {
                error!("[htx] connection failed: {e}, retrying in {backoff:?}");
                if !ws::wait(&mut shutdown, backoff).await {
                    return;
                }
                backoff = ws::next_backoff(backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = stream.split();

        // One subscription per symbol on the same socket.
        let mut subscribed = true;
        for (_, sym) in ctx.slot_entries() {
            let sub = serde_json::json!({
                "sub": format!("market.{sym}.bbo"),
                "id": format!("id_{sym}")
            })
            .to_string();
            if let Err(e) = ws_write.send(Message::Text(sub.into())).await {
                error!("[htx] subscribe send failed: {e}");
                subscribed = false;
                break;
            }
        }
        if !subscribed {
            if !ws::wait(&mut shutdown, backoff).await {
                return;
            }
            continue;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[htx] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                msg = ws_read.next() => {
                    let payload = match msg {
                        Some(Ok(Message::Binary(data))) => data,
                        Some(Ok(Message::Text(text))) => text.as_bytes().to_vec().into(),
                        Some(Ok(Message::Ping(p))) => {
                            let _ = ws_write.send(Message::Pong(p)).await;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[htx] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[htx] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[htx] stream ended");
                            break;
                        }
                        _ => continue,
                    };

                    match classify(&payload, &slots) {
                        Frame::Ping(n) => {
                            let pong = serde_json::json!({"pong": n}).to_string();
                            if let Err(e) = ws_write.send(Message::Text(pong.into())).await {
                                error!("[htx] pong send failed: {e}");
                                break;
                            }
                        }
                        Frame::Quote(slot, data) => ctx.publish(slot, data).await,
                        Frame::Skip => {}
                    }
                }
            }
        }

        warn!("[htx] disconnected, reconnecting in {backoff:?}");
        if !ws::wait(&mut shutdown, backoff).await {
            return;
        }
        backoff = ws::next_backoff(backoff);
    }
}

/// Gunzip a frame and sort it into ping / quote / skip.
fn classify(frame: &[u8], slots: &AHashMap<String, usize>) -> Frame {
    let Some(payload) = inflate(frame) else {
        return Frame::Skip;
    };
    let Ok(v) = serde_json::from_slice::<serde_json::Value>(&payload) else {
        return Frame::Skip;
    };
    if let Some(n) = v.get("ping") {
        return Frame::Ping(n.clone());
    }
    match parse(&v, slots) {
        Some((slot, data)) => Frame::Quote(slot, data),
        None => Frame::Skip,
    }
}

fn inflate(frame: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(frame).read_to_end(&mut out).ok()?;
    Some(out)
}

fn parse(v: &serde_json::Value, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: HtxTicker = serde_json::from_value(v.clone()).ok()?;
    if t.ch.is_empty() {
        return None;
    }
    let slot = *slots.get(&t.tick.symbol)?;
    let data = TickerData::new(t.tick.bid, t.tick.ask, t.tick.bid_size, t.tick.ask_size);
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn gz(payload: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("btcusdt".to_string(), 0)])
    }

    #[test]
    fn ping_frame_is_echoed_not_parsed() {
        let frame = gz(r#"{"ping": 12345}"#);
        match classify(&frame, &slots()) {
            Frame::Ping(n) => assert_eq!(n, serde_json::json!(12345)),
            _ => panic!("expected ping"),
        }
    }

    #[test]
    fn bbo_frame_becomes_quote() {
        let frame = gz(
            r#"{"ch":"market.btcusdt.bbo","ts":1672515782136,
               "tick":{"seqId":1,"ask":60000.2,"askSize":0.5,"bid":60000.1,
                       "bidSize":1.5,"quoteTime":1672515782000,"symbol":"btcusdt"}}"#,
        );
        match classify(&frame, &slots()) {
            Frame::Quote(slot, t) => {
                assert_eq!(slot, 0);
                assert_eq!(t, TickerData::new(60000.1, 60000.2, 1.5, 0.5));
            }
            _ => panic!("expected quote"),
        }
    }

    #[test]
    fn subscribe_ack_skipped() {
        let frame = gz(r#"{"id":"id_btcusdt","status":"ok","subbed":"market.btcusdt.bbo","ts":1}"#);
        assert!(matches!(classify(&frame, &slots()), Frame::Skip));
    }

    #[test]
    fn non_gzip_frame_skipped() {
        assert!(matches!(classify(b"plain text", &slots()), Frame::Skip));
    }
}
