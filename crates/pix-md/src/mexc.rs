//! Mexc session — `spot@public.aggre.bookTicker` channel (protobuf).
//!
//! Mexc is the only venue pushing protobuf instead of JSON. The wrapper and
//! body messages are declared by hand with `prost` derives; fields the feed
//! does not use are left undeclared and skipped by the decoder.

use ahash::AHashMap;
use pix_core::types::TickerData;
use prost::Message as _;

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://wbs-api.mexc.com/ws";

/// Envelope for every v3 push (`PushDataV3ApiWrapper`).
#[derive(Clone, PartialEq, prost::Message)]
struct PushDataWrapper {
    #[prost(string, tag = "1")]
    channel: String,
    #[prost(string, optional, tag = "3")]
    symbol: Option<String>,
    #[prost(message, optional, tag = "315")]
    book_ticker: Option<AggreBookTicker>,
}

/// `PublicAggreBookTickerV3Api` — prices and sizes arrive as decimal strings.
#[derive(Clone, PartialEq, prost::Message)]
struct AggreBookTicker {
    #[prost(string, tag = "1")]
    bid_price: String,
    #[prost(string, tag = "2")]
    bid_quantity: String,
    #[prost(string, tag = "3")]
    ask_price: String,
    #[prost(string, tag = "4")]
    ask_quantity: String,
}

pub async fn run(ctx: SessionCtx) {
    let slots = ctx.slot_map();
    let subscribe = build_subscribe(&ctx.symbols);
    ws::run_binary_session(
        "mexc".into(),
        WS_URL,
        subscribe,
        move |frame| parse(frame, &slots),
        ctx,
    )
    .await;
}

fn build_subscribe(symbols: &[String]) -> String {
    let params: Vec<String> = symbols
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| format!("spot@public.aggre.bookTicker.v3.api.pb@10ms@{s}"))
        .collect();
    serde_json::json!({
        "method": "SUBSCRIPTION",
        "params": params
    })
    .to_string()
}

/// Normalize one frame; decode errors and non-book-ticker pushes drop.
fn parse(frame: &[u8], slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let wrapper = PushDataWrapper::decode(frame).ok()?;
    let slot = *slots.get(wrapper.symbol.as_deref()?)?;
    let tick = wrapper.book_ticker?;
    let data = TickerData::new(
        parse_f64(&tick.bid_price)?,
        parse_f64(&tick.ask_price)?,
        parse_f64(&tick.bid_quantity)?,
        parse_f64(&tick.ask_quantity)?,
    );
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("BTCUSDT".to_string(), 0)])
    }

    fn frame() -> Vec<u8> {
        let wrapper = PushDataWrapper {
            channel: "spot@public.aggre.bookTicker.v3.api.pb@10ms@BTCUSDT".into(),
            symbol: Some("BTCUSDT".into()),
            book_ticker: Some(AggreBookTicker {
                bid_price: "60000.1".into(),
                bid_quantity: "1.5".into(),
                ask_price: "60000.2".into(),
                ask_quantity: "0.5".into(),
            }),
        };
        wrapper.encode_to_vec()
    }

    #[test]
    fn parse_book_ticker_push() {
        let (slot, t) = parse(&frame(), &slots()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(t, TickerData::new(60000.1, 60000.2, 1.5, 0.5));
    }

    #[test]
    fn undecodable_frame_dropped() {
        assert!(parse(b"\xff\xff\xff\xff", &slots()).is_none());
    }

    #[test]
    fn push_without_body_dropped() {
        let wrapper = PushDataWrapper {
            channel: "spot@public.aggre.deals.v3.api.pb@BTCUSDT".into(),
            symbol: Some("BTCUSDT".into()),
            book_ticker: None,
        };
        assert!(parse(&wrapper.encode_to_vec(), &slots()).is_none());
    }

    #[test]
    fn subscribe_uses_pb_channel() {
        let msg = build_subscribe(&["BTCUSDT".into()]);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["method"], "SUBSCRIPTION");
        assert_eq!(v["params"][0], "spot@public.aggre.bookTicker.v3.api.pb@10ms@BTCUSDT");
    }
}
