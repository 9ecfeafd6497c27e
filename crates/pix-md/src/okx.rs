//! OKX session — `bbo-tbt` channel.

use ahash::AHashMap;
use pix_core::types::TickerData;
use serde::Deserialize;

use crate::json_util::parse_f64;
use crate::{SessionCtx, ws};

const WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

#[derive(Debug, Deserialize)]
struct OkxTicker {
    arg: OkxArg,
    #[serde(default)]
    data: Vec<OkxBook>,
}

#[derive(Debug, Deserialize)]
struct OkxArg {
    #[serde(rename = "instId", default)]
    inst_id: String,
}

#[derive(Debug, Deserialize)]
struct OkxBook {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

pub async fn run(ctx: SessionCtx) {
    let slots = ctx.slot_map();
    let subscribe = build_subscribe(&ctx.symbols);
    ws::run_text_session(
        "okx".into(),
        WS_URL,
        subscribe,
        move |text| parse(text, &slots),
        ctx,
    )
    .await;
}

fn build_subscribe(symbols: &[String]) -> String {
    let args: Vec<serde_json::Value> = symbols
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| serde_json::json!({"channel": "bbo-tbt", "instId": s}))
        .collect();
    serde_json::json!({
        "op": "subscribe",
        "args": args
    })
    .to_string()
}

/// Normalize one frame; events with no `data` rows (acks, errors) drop.
fn parse(text: &str, slots: &AHashMap<String, usize>) -> Option<(usize, TickerData)> {
    let t: OkxTicker = serde_json::from_str(text).ok()?;
    let slot = *slots.get(&t.arg.inst_id)?;
    let book = t.data.first()?;
    let bid = book.bids.first()?;
    let ask = book.asks.first()?;
    let data = TickerData::new(
        parse_f64(bid.first()?)?,
        parse_f64(ask.first()?)?,
        parse_f64(bid.get(1)?)?,
        parse_f64(ask.get(1)?)?,
    );
    Some((slot, data))
}
