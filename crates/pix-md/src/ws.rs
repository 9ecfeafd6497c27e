//! Shared WebSocket session plumbing.
//!
//! Every session walks the same lifecycle: disconnected → connecting →
//! subscribing → streaming, and back to connecting after any fault (read
//! error, server close, stream end). Shutdown is cooperative via a shared
//! `watch` flag checked in every `select!`; faults trigger a reconnect after
//! a backoff that starts at [`RECONNECT_BACKOFF`] and doubles up to
//! [`MAX_BACKOFF`].
//!
//! The state machine lives in one place, [`run_session`], parameterized by a
//! normalizer over the received [`Frame`]. Venues whose protocol is "one
//! socket, one subscribe-all message" call it through the thin
//! [`run_text_session`] (Binance, Bybit shards, Coinbase, Gate.io, OKX) or
//! [`run_binary_session`] (Mexc) wrappers, which vary only the frame kind
//! they feed to the parser. HTX and Kucoin need write access mid-stream and
//! carry their own loops built from the same pieces.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pix_core::types::TickerData;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::SessionCtx;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Minimum delay before a reconnect attempt.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A received data frame, borrowed from the socket message.
pub(crate) enum Frame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// Establish a TLS WebSocket connection.
pub async fn connect(url: &str) -> anyhow::Result<WsStream> {
    use tokio_tungstenite::tungstenite::http::Request;

    let request = Request::builder()
        .uri(url)
        .header("Host", extract_host(url))
        .body(())?;

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("").to_string())
        .unwrap_or_default()
}

/// Double the backoff, saturating at [`MAX_BACKOFF`].
pub fn next_backoff(d: Duration) -> Duration {
    (d * 2).min(MAX_BACKOFF)
}

/// Sleep for `delay`, or return `false` immediately when shutdown fires.
pub async fn wait(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

/// The session state machine shared by all subscribe-and-read venues:
/// connect → subscribe → stream until fault → backoff → reconnect.
///
/// `parse` is the venue normalizer: slot-resolved quote or `None` (silent
/// drop — acks, heartbeats, frames of the other kind, malformed payloads).
pub(crate) async fn run_session<P>(
    label: String,
    url: &str,
    subscribe: String,
    parse: P,
    ctx: SessionCtx,
) where
    P: Fn(Frame<'_>) -> Option<(usize, TickerData)>,
{
    let mut shutdown = ctx.shutdown.clone();
    let mut backoff = RECONNECT_BACKOFF;

    loop {
        if *shutdown.borrow() {
            info!("[{label}] shutdown requested");
            return;
        }

        info!("[{label}] connecting to {url}");
        let stream = match connect(url).await {
            Ok(s) => {
                backoff = RECONNECT_BACKOFF;
                info!("[{label}] connected");
                s
            }
            Err(e) => {
                error!("[{label}] connection failed: {e}, retrying in {backoff:?}");
                if !wait(&mut shutdown, backoff).await {
                    return;
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = stream.split();

        if let Err(e) = ws_write.send(Message::Text(subscribe.clone().into())).await {
            error!("[{label}] subscribe send failed: {e}");
            if !wait(&mut shutdown, backoff).await {
                return;
            }
            continue;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[{label}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some((slot, data)) = parse(Frame::Text(&text)) {
                                ctx.publish(slot, data).await;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if let Some((slot, ticker)) = parse(Frame::Binary(&data)) {
                                ctx.publish(slot, ticker).await;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws_write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[{label}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[{label}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[{label}] stream ended");
                            break;
                        }
                        _ => {} // Pong, Frame — ignore
                    }
                }
            }
        }

        warn!("[{label}] disconnected, reconnecting in {backoff:?}");
        if !wait(&mut shutdown, backoff).await {
            return;
        }
        backoff = next_backoff(backoff);
    }
}

/// Run [`run_session`] for a text-protocol venue; binary frames drop.
pub(crate) async fn run_text_session<P>(
    label: String,
    url: &str,
    subscribe: String,
    parse: P,
    ctx: SessionCtx,
) where
    P: Fn(&str) -> Option<(usize, TickerData)>,
{
    let on_frame = move |frame: Frame<'_>| match frame {
        Frame::Text(text) => parse(text),
        Frame::Binary(_) => None,
    };
    run_session(label, url, subscribe, on_frame, ctx).await;
}

/// Run [`run_session`] for a binary-protocol venue; text frames (acks) drop.
pub(crate) async fn run_binary_session<P>(
    label: String,
    url: &str,
    subscribe: String,
    parse: P,
    ctx: SessionCtx,
) where
    P: Fn(&[u8]) -> Option<(usize, TickerData)>,
{
    let on_frame = move |frame: Frame<'_>| match frame {
        Frame::Binary(data) => parse(data),
        Frame::Text(_) => None,
    };
    run_session(label, url, subscribe, on_frame, ctx).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let mut d = RECONNECT_BACKOFF;
        d = next_backoff(d);
        assert_eq!(d, Duration::from_secs(4));
        for _ in 0..10 {
            d = next_backoff(d);
        }
        assert_eq!(d, MAX_BACKOFF);
    }

    #[test]
    fn host_extraction() {
        assert_eq!(extract_host("wss://stream.binance.com:9443/ws"), "stream.binance.com");
        assert_eq!(extract_host("wss://api.gateio.ws/ws/v4/"), "api.gateio.ws");
    }
}
