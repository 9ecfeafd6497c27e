//! Bybit session — `orderbook.1.<sym>` channel.
//!
//! Bybit caps a single public connection at [`MAX_SYMBOLS_PER_CONN`]
//! symbols, so the roster row is sharded into groups of that size and one
//! subconnection is opened per shard. The shard's position in the row is its
//! slot offset, keeping slot ordering intact across subconnections.

use ahash::AHashMap;
use pix_core::types::TickerData;
use serde::Deserialize;

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://stream.bybit.com/v5/public/spot";

/// Venue cap: symbols one connection may carry.
const MAX_SYMBOLS_PER_CONN: usize = 10;

/// `orderbook.1` push; `b`/`a` are `[price, size]` levels and may be empty
/// in deltas that only touch the other side.
#[derive(Debug, Deserialize)]
struct BybitTicker {
    data: BybitBook,
}

#[derive(Debug, Deserialize)]
struct BybitBook {
    s: String,
    #[serde(default)]
    b: Vec<Vec<String>>,
    #[serde(default)]
    a: Vec<Vec<String>>,
}

pub async fn run(ctx: SessionCtx) {
    let mut tasks = Vec::new();
    for (offset, group) in shards(&ctx.symbols) {
        let shard_ctx = ctx.clone();
        let group = group.to_vec();
        tasks.push(tokio::spawn(run_shard(shard_ctx, offset, group)));
    }
    for task in tasks {
        let _ = task.await;
    }
}

/// Split the slot-aligned roster row into `(slot offset, group)` shards.
fn shards(symbols: &[String]) -> impl Iterator<Item = (usize, &[String])> {
    symbols
        .chunks(MAX_SYMBOLS_PER_CONN)
        .enumerate()
        .map(|(i, group)| (i * MAX_SYMBOLS_PER_CONN, group))
}

async fn run_shard(ctx: SessionCtx, offset: usize, group: Vec<String>) {
    let slots: AHashMap<String, usize> = group
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_empty())
        .map(|(i, s)| (s.clone(), offset + i))
        .collect();
    let subscribe = build_subscribe(&group);
    ws::run_text_session(
        format!("bybit[{offset}]"),
        WS_URL,
        subscribe,
        move |text| parse(text, &slots),
        ctx,
    )
    .await;
}

fn build_subscribe(symbols: &[String]) -> String {
    let args: Vec<String> = symbols
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| format!("orderbook.1.{s}"))
        .collect();
    serde_json::json!({
        "op": "subscribe",
        "args": args
    })
    .to_string()
}

/// Normalize one frame; `None` when either side of the book is absent.
fn parse(text: &str, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: BybitTicker = serde_json::from_str(text).ok()?;
    let slot = *slots.get(&t.data.s)?;
    let bid = t.data.b.first()?;
    let ask = t.data.a.first()?;
    let data = TickerData::new(
        parse_f64(bid.first()?)?,
        parse_f64(ask.first()?)?,
        parse_f64(bid.get(1)?)?,
        parse_f64(ask.get(1)?)?,
    );
    Some((slot, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> AHashMap<String, usize> {
        AHashMap::from_iter([("BTCUSDT".to_string(), 0)])
    }

    #[test]
    fn parse_orderbook_one() {
        let json = r#"{"topic":"orderbook.1.BTCUSDT","type":"snapshot","ts":1672515782136,
            "data":{"s":"BTCUSDT","b":[["60000.1","1.5"]],"a":[["60000.2","0.5"]],"u":1,"seq":2}}"#;
        let (slot, t) = parse(json, &slots()).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(t, TickerData::new(60000.1, 60000.2, 1.5, 0.5));
    }

    #[test]
    fn one_sided_delta_dropped() {
        let json = r#"{"topic":"orderbook.1.BTCUSDT","type":"delta","ts":1,
            "data":{"s":"BTCUSDT","b":[["60000.1","1.5"]],"a":[],"u":3,"seq":4}}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn subscribe_ack_dropped() {
        let json = r#"{"success":true,"ret_msg":"subscribe","conn_id":"x","op":"subscribe"}"#;
        assert!(parse(json, &slots()).is_none());
    }

    #[test]
    fn twenty_five_symbols_make_three_shards() {
        let symbols: Vec<String> = (0..25).map(|i| format!("S{i}USDT")).collect();
        let got: Vec<(usize, usize)> = shards(&symbols).map(|(o, g)| (o, g.len())).collect();
        assert_eq!(got, [(0, 10), (10, 10), (20, 5)]);
    }

    #[test]
    fn shard_slots_keep_roster_positions() {
        let symbols: Vec<String> = (0..25).map(|i| format!("S{i}USDT")).collect();
        let (offset, group) = shards(&symbols).nth(2).unwrap();
        assert_eq!(offset, 20);
        assert_eq!(group[0], "S20USDT");
        assert_eq!(group[4], "S24USDT");
    }
}
