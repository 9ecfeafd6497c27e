//! Binance session — `<sym>@bookTicker` channel.

use ahash::AHashMap;
use pix_core::types::TickerData;
use serde::Deserialize;

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Book ticker push, e.g.
/// `{"u":400900217,"s":"BTCUSDT","b":"60000.10","B":"1.2","a":"60000.20","A":"0.8"}`.
#[derive(Debug, Deserialize)]
struct BinanceTicker {
    s: String,
    b: String,
    #[serde(rename = "B")]
    bid_qty: String,
    a: String,
    #[serde(rename = "A")]
    ask_qty: String,
}

pub async fn run(ctx: SessionCtx) {
    // The push reports the symbol upper-case regardless of how we subscribed.
    let slots: AHashMap<String, usize> =
        ctx.slot_entries().map(|(i, s)| (s.to_uppercase(), i)).collect();
    let subscribe = build_subscribe(&ctx.symbols);
    ws::run_text_session(
        "binance".into(),
        WS_URL,
        subscribe,
        move |text| parse(text, &slots),
        ctx,
    )
    .await;
}

fn build_subscribe(symbols: &[String]) -> String {
    let params: Vec<String> = symbols
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}@bookTicker", s.to_lowercase()))
        .collect();
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": params,
        "id": 1
    })
    .to_string()
}

/// Normalize one frame; `None` for acks, unknown symbols, and empty price
/// fields.
fn parse(text: &str, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: BinanceTicker = serde_json::from_str(text).ok()?;
    let slot = *slots.get(&t.s)?;
    let data = TickerData::new(
        parse_f64(&t.b)?,
        parse_f64(&t.a)?,
        parse_f64(&t.bid_qty)?,
        parse_f64(&t.ask_qty)?,
    );
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("BTCUSDT".to_string(), 0), ("ETHUSDT".to_string(), 1)])
    }

    #[test]
    fn parse_book_ticker() {
        let json = r#"{"u":400900217,"s":"BTCUSDT","b":"60000.10","B":"1.2","a":"60000.20","A":"0.8"}"#;
        let (slot, t) = parse(json, &slots()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(t, TickerData::new(60000.10, 60000.20, 1.2, 0.8));
    }

    #[test]
    fn subscribe_ack_dropped() {
        assert!(parse(r#"{"result":null,"id":1}"#, &slots()).is_none());
    }

    #[test]
    fn empty_price_dropped() {
        let json = r#"{"u":1,"s":"BTCUSDT","b":"","B":"1.0","a":"60000.2","A":"0.8"}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn unknown_symbol_dropped() {
        let json = r#"{"u":1,"s":"DOGEUSDT","b":"0.1","B":"1","a":"0.2","A":"1"}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn subscribe_lower_cases_streams() {
        let msg = build_subscribe(&["BTCUSDT".into(), "".into(), "ETHUSDT".into()]);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["method"], "SUBSCRIBE");
        let params = v["params"].as_array().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], "btcusdt@bookTicker");
    }
}
