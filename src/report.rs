use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::models::{Category, NormalizedRow};

/// Everything one query produces: the summary numbers, the chart series, the
/// gallery, and the normalized table itself. Serves as the JSON payload of
/// the web API and the CLI query output.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub address: String,
    pub transfer_count: usize,
    pub eth_flow: EthFlowSummary,
    pub daily_flow: Vec<DailyFlow>,
    pub token_activity: Vec<TokenActivity>,
    pub gallery: Vec<GalleryItem>,
    pub rows: Vec<NormalizedRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EthFlowSummary {
    pub total_in: Decimal,
    pub total_out: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyFlow {
    /// UTC calendar date, ISO `YYYY-MM-DD`.
    pub date: String,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenActivity {
    pub symbol: String,
    pub transfers: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryItem {
    pub token_symbol: Option<String>,
    pub token_id: Option<String>,
    pub contract_address: Option<String>,
    pub image: String,
}

impl HistoryReport {
    pub fn build(address: String, rows: Vec<NormalizedRow>) -> Self {
        Self {
            transfer_count: rows.len(),
            eth_flow: eth_flow(&rows, &address),
            daily_flow: daily_flow(&rows, &address),
            token_activity: token_activity(&rows),
            gallery: gallery(&rows),
            address,
            rows,
        }
    }
}

/// Sums only external/internal rows with a parsed value; token categories may
/// carry a derived `value_eth` too, so the category filter comes first.
fn eth_flow(rows: &[NormalizedRow], address: &str) -> EthFlowSummary {
    let mut summary = EthFlowSummary::default();
    for row in rows.iter().filter(|r| r.is_native()) {
        let Some(value) = row.value_eth else { continue };
        if row.is_incoming_for(address) {
            summary.total_in += value;
        }
        if row.is_outgoing_for(address) {
            summary.total_out += value;
        }
    }
    summary.net = summary.total_in - summary.total_out;
    summary
}

fn daily_flow(rows: &[NormalizedRow], address: &str) -> Vec<DailyFlow> {
    let mut days: BTreeMap<time::Date, (Decimal, Decimal)> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_native()) {
        let (Some(value), Some(ts)) = (row.value_eth, row.timestamp) else {
            continue;
        };
        let entry = days.entry(ts.date()).or_default();
        if row.is_incoming_for(address) {
            entry.0 += value;
        }
        if row.is_outgoing_for(address) {
            entry.1 += value;
        }
    }
    days.into_iter()
        .map(|(date, (inflow, outflow))| DailyFlow {
            date: date.to_string(),
            inflow,
            outflow,
            net: inflow - outflow,
        })
        .collect()
}

fn token_activity(rows: &[NormalizedRow]) -> Vec<TokenActivity> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for row in rows.iter().filter(|r| r.category == Some(Category::Erc20)) {
        if let Some(symbol) = row.token_symbol.as_deref() {
            *counts.entry(symbol).or_default() += 1;
        }
    }
    let mut activity: Vec<TokenActivity> = counts
        .into_iter()
        .map(|(symbol, transfers)| TokenActivity {
            symbol: symbol.to_string(),
            transfers,
        })
        .collect();
    activity.sort_by(|a, b| b.transfers.cmp(&a.transfers).then(a.symbol.cmp(&b.symbol)));
    activity
}

fn gallery(rows: &[NormalizedRow]) -> Vec<GalleryItem> {
    rows.iter()
        .filter(|r| r.is_nft)
        .filter_map(|r| {
            r.nft_image.as_ref().map(|image| GalleryItem {
                token_symbol: r.token_symbol.clone(),
                token_id: r.token_id.clone(),
                contract_address: r.contract_address.clone(),
                image: image.clone(),
            })
        })
        .collect()
}

/// Column order mirrors the normalized row schema; the export carries every
/// row, unfiltered.
pub const CSV_COLUMNS: &[&str] = &[
    "timestamp",
    "category",
    "from",
    "to",
    "hash",
    "value_eth",
    "token_symbol",
    "token_amount",
    "token_decimals",
    "token_id",
    "is_nft",
    "contract_address",
    "nft_image",
];

pub fn to_csv(rows: &[NormalizedRow]) -> String {
    let mut out = String::with_capacity(64 + rows.len() * 128);
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');
    for row in rows {
        let timestamp = row
            .timestamp
            .and_then(|ts| ts.format(&Rfc3339).ok())
            .unwrap_or_default();
        let fields = [
            timestamp,
            row.category.map(|c| c.as_str().to_string()).unwrap_or_default(),
            row.from.clone(),
            row.to.clone(),
            row.hash.clone(),
            opt_to_string(&row.value_eth),
            row.token_symbol.clone().unwrap_or_default(),
            opt_to_string(&row.token_amount),
            opt_to_string(&row.token_decimals),
            row.token_id.clone().unwrap_or_default(),
            row.is_nft.to_string(),
            row.contract_address.clone().unwrap_or_default(),
            row.nft_image.clone().unwrap_or_default(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn opt_to_string<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
