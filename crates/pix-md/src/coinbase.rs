//! Coinbase session — `ticker` channel.

use ahash::AHashMap;
use pix_core::types::TickerData;
use serde::Deserialize;

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

#[derive(Debug, Deserialize)]
struct CoinbaseTicker {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    product_id: String,
    #[serde(default)]
    best_bid: String,
    #[serde(default)]
    best_ask: String,
    #[serde(default)]
    best_bid_size: String,
    #[serde(default)]
    best_ask_size: String,
}

pub async fn run(ctx: SessionCtx) {
    let slots = ctx.slot_map();
    let subscribe = build_subscribe(&ctx.symbols);
    ws::run_text_session(
        "coinbase".into(),
        WS_URL,
        subscribe,
        move |text| parse(text, &slots),
        ctx,
    )
    .await;
}

fn build_subscribe(symbols: &[String]) -> String {
    let product_ids: Vec<&String> = symbols.iter().filter(|s| !s.is_empty()).collect();
    serde_json::json!({
        "type": "subscribe",
        "channels": [{
            "name": "ticker",
            "product_ids": product_ids
        }]
    })
    .to_string()
}

/// Normalize one frame; anything but a `ticker` event is dropped.
fn parse(text: &str, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: CoinbaseTicker = serde_json::from_str(text).ok()?;
    if t.kind != "ticker" {
        return None;
    }
    let slot = *slots.get(&t.product_id)?;
    let data = TickerData::new(
        parse_f64(&t.best_bid)?,
        parse_f64(&t.best_ask)?,
        parse_f64(&t.best_bid_size)?,
        parse_f64(&t.best_ask_size)?,
    );
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("BTC-USD".to_string(), 0)])
    }

    #[test]
    fn parse_ticker_event() {
        let json = r#"{"type":"ticker","sequence":12345,"product_id":"BTC-USD",
            "price":"60000.15","best_bid":"60000.10","best_bid_size":"0.7",
            "best_ask":"60000.20","best_ask_size":"0.3","side":"buy",
            "time":"2023-01-01T00:00:00.000000Z","trade_id":1,"last_size":"0.01"}"#;
        let (slot, t) = parse(json, &slots()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(t, TickerData::new(60000.10, 60000.20, 0.7, 0.3));
    }

    #[test]
    fn subscriptions_event_dropped() {
        let json = r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn subscribe_names_ticker_channel() {
        let msg = build_subscribe(&["BTC-USD".into(), "ETH-USD".into()]);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["type"], "subscribe");
        assert_eq!(v["channels"][0]["name"], "ticker");
        assert_eq!(v["channels"][0]["product_ids"].as_array().unwrap().len(), 2);
    }
}
