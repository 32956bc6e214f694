use alloy_primitives::U256;
use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::models::{Category, NormalizedRow, RawTransfer};

/// Candidate provider fields per logical attribute, probed in order; the
/// first present and non-empty value wins. The provider's schema varies by
/// asset category, so the variability is kept as an auditable table instead
/// of inline conditionals.
const TIMESTAMP_PATHS: &[&[&str]] = &[&["metadata", "blockTimestamp"]];
const NATIVE_VALUE_PATHS: &[&[&str]] = &[&["value"]];
const TOKEN_SYMBOL_PATHS: &[&[&str]] = &[&["asset"], &["tokenSymbol"]];
const TOKEN_DECIMALS_PATHS: &[&[&str]] = &[&["rawContract", "decimal"], &["tokenDecimal"]];
const TOKEN_AMOUNT_PATHS: &[&[&str]] = &[
    &["rawContract", "value"],
    &["tokenAmount"],
    &["amount"],
    &["value"],
];
const TOKEN_ID_PATHS: &[&[&str]] = &[&["tokenId"], &["erc721TokenId"]];
const CONTRACT_ADDRESS_PATHS: &[&[&str]] = &[&["rawContract", "address"], &["contractAddress"]];

const WEI_DECIMALS: u32 = 18;
const MAX_TOKEN_DECIMALS: u32 = 36;
/// Largest scale `Decimal` can carry directly; higher valid decimals divide
/// in two steps.
const DECIMAL_SCALE_LIMIT: u32 = 28;

/// Normalize a fetched batch and order it for display: newest first,
/// rows without a parseable timestamp at the end.
pub fn normalize_transfers(raws: &[RawTransfer]) -> Vec<NormalizedRow> {
    let mut rows: Vec<NormalizedRow> = raws.iter().map(normalize_transfer).collect();
    rows.sort_by(|a, b| match (&a.timestamp, &b.timestamp) {
        (Some(ta), Some(tb)) => tb.cmp(ta),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    rows
}

/// Total per row: every derivation is independent and `Option`-typed, so a
/// malformed field never blocks another field or drops the row.
pub fn normalize_transfer(raw: &RawTransfer) -> NormalizedRow {
    let category = string_at(raw, &["category"]).and_then(|s| Category::parse(&s));
    let is_nft = category.map(|c| c.is_nft()).unwrap_or(false);

    let token_decimals = first_string(raw, TOKEN_DECIMALS_PATHS)
        .and_then(|s| parse_uint(&s))
        .and_then(valid_decimals);
    let token_amount = first_string(raw, TOKEN_AMOUNT_PATHS)
        .and_then(|s| parse_uint(&s))
        .and_then(|units| match token_decimals {
            Some(decimals) => scale_units(units, decimals),
            None => autoscale_units(units),
        });

    NormalizedRow {
        timestamp: first_string(raw, TIMESTAMP_PATHS).and_then(|s| parse_instant(&s)),
        category,
        from: string_at(raw, &["from"]).unwrap_or_default(),
        to: string_at(raw, &["to"]).unwrap_or_default(),
        hash: string_at(raw, &["hash"]).unwrap_or_default(),
        value_eth: first_string(raw, NATIVE_VALUE_PATHS)
            .and_then(|s| parse_uint(&s))
            .and_then(|wei| scale_units(wei, WEI_DECIMALS)),
        token_symbol: first_string(raw, TOKEN_SYMBOL_PATHS),
        token_amount,
        token_decimals,
        token_id: first_string(raw, TOKEN_ID_PATHS),
        is_nft,
        contract_address: first_string(raw, CONTRACT_ADDRESS_PATHS),
        nft_image: None,
    }
}

fn lookup<'a>(raw: &'a RawTransfer, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cursor = raw;
    for key in path {
        cursor = cursor.as_object()?.get(*key)?;
    }
    Some(cursor)
}

/// Strings and numbers both count; empty and whitespace-only strings do not.
pub(crate) fn string_at(raw: &RawTransfer, path: &[&str]) -> Option<String> {
    match lookup(raw, path)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_string(raw: &RawTransfer, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| string_at(raw, path))
}

/// Unsigned integer from a `0x`-prefixed hex string or a decimal string.
fn parse_uint(raw: &str) -> Option<U256> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_str_radix(s, 10).ok(),
    }
}

/// Accepts only [0, 36]; anything else is unknown, not clamped.
fn valid_decimals(raw: U256) -> Option<u32> {
    if raw > U256::from(MAX_TOKEN_DECIMALS) {
        return None;
    }
    Some(raw.to::<u32>())
}

/// raw / 10^decimals. Amounts beyond Decimal's 96-bit mantissa come back as
/// absent rather than wrong.
fn scale_units(raw: U256, decimals: u32) -> Option<Decimal> {
    let mantissa = i128::try_from(raw).ok()?;
    if decimals <= DECIMAL_SCALE_LIMIT {
        Decimal::try_from_i128_with_scale(mantissa, decimals).ok()
    } else {
        let head = Decimal::try_from_i128_with_scale(mantissa, DECIMAL_SCALE_LIMIT).ok()?;
        let rest = 10u64.checked_pow(decimals - DECIMAL_SCALE_LIMIT)?;
        head.checked_div(Decimal::from(rest))
    }
}

/// Decimals-unknown fallback, a documented imprecision: magnitudes above
/// 10^20 are assumed to be 18-decimal raw units, smaller ones are taken as
/// already human-scaled. The provider does not always supply the metadata
/// needed to do better.
fn autoscale_units(raw: U256) -> Option<Decimal> {
    if raw > U256::from(10u128.pow(20)) {
        scale_units(raw, WEI_DECIMALS)
    } else {
        raw.to_string().parse::<Decimal>().ok()
    }
}

fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}
