//! Gate.io session — `spot.book_ticker` channel.

use ahash::AHashMap;
use pix_core::types::TickerData;
use serde::Deserialize;

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://api.gateio.ws/ws/v4/";

#[derive(Debug, Deserialize)]
struct GateioTicker {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    result: GateioResult,
}

#[derive(Debug, Default, Deserialize)]
struct GateioResult {
    #[serde(default)]
    s: String,
    #[serde(default)]
    b: String,
    #[serde(rename = "B", default)]
    bid_qty: String,
    #[serde(default)]
    a: String,
    #[serde(rename = "A", default)]
    ask_qty: String,
}

pub async fn run(ctx: SessionCtx) {
    let slots = ctx.slot_map();
    let subscribe = build_subscribe(&ctx.symbols);
    ws::run_text_session(
        "gateio".into(),
        WS_URL,
        subscribe,
        move |text| parse(text, &slots),
        ctx,
    )
    .await;
}

fn build_subscribe(symbols: &[String]) -> String {
    let payload: Vec<&String> = symbols.iter().filter(|s| !s.is_empty()).collect();
    serde_json::json!({
        "channel": "spot.book_ticker",
        "event": "subscribe",
        "payload": payload
    })
    .to_string()
}

/// Normalize one frame; non-update events (subscribe acks, pings) are
/// dropped.
fn parse(text: &str, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: GateioTicker = serde_json::from_str(text).ok()?;
    if t.channel != "spot.book_ticker" || t.event != "update" {
        return None;
    }
    let slot = *slots.get(&t.result.s)?;
    let data = TickerData::new(
        parse_f64(&t.result.b)?,
        parse_f64(&t.result.a)?,
        parse_f64(&t.result.bid_qty)?,
        parse_f64(&t.result.ask_qty)?,
    );
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("BTC_USDT".to_string(), 0)])
    }

    #[test]
    fn parse_update_event() {
        let json = r#"{"time":1672515782,"time_ms":1672515782136,"channel":"spot.book_ticker",
            "event":"update","result":{"t":1672515782136,"u":48733182,"s":"BTC_USDT",
            "b":"60000.1","B":"2.0","a":"60000.2","A":"1.0"}}"#;
        let (slot, t) = parse(json, &slots()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(t, TickerData::new(60000.1, 60000.2, 2.0, 1.0));
    }

    #[test]
    fn subscribe_ack_dropped() {
        let json = r#"{"time":1672515782,"channel":"spot.book_ticker","event":"subscribe",
            "result":{"status":"success"}}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn other_channel_dropped() {
        let json = r#"{"time":1,"channel":"spot.pong","event":"","result":{}}"#;
        assert!(parse(json, &slots()).is_none());
    }
}
