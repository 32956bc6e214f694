use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::AppError;

/// One provider record as returned by `alchemy_getAssetTransfers`. The shape
/// varies by asset category, so it stays an opaque JSON value and the
/// normalizer probes known candidate fields.
pub type RawTransfer = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    External,
    Internal,
    Erc20,
    Erc721,
    Erc1155,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "external" => Some(Self::External),
            "internal" => Some(Self::Internal),
            "erc20" => Some(Self::Erc20),
            "erc721" => Some(Self::Erc721),
            "erc1155" => Some(Self::Erc1155),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Internal => "internal",
            Self::Erc20 => "erc20",
            Self::Erc721 => "erc721",
            Self::Erc1155 => "erc1155",
        }
    }

    /// Native ETH movement rather than a token contract event.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::External | Self::Internal)
    }

    pub fn is_nft(&self) -> bool {
        matches!(self, Self::Erc721 | Self::Erc1155)
    }
}

/// Fixed-schema row derived from one `RawTransfer`. Every derivation is
/// best-effort: a field that cannot be extracted is absent, the row survives.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedRow {
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub category: Option<Category>,
    pub from: String,
    pub to: String,
    pub hash: String,
    pub value_eth: Option<Decimal>,
    pub token_symbol: Option<String>,
    pub token_amount: Option<Decimal>,
    pub token_decimals: Option<u32>,
    pub token_id: Option<String>,
    pub is_nft: bool,
    pub contract_address: Option<String>,
    pub nft_image: Option<String>,
}

impl NormalizedRow {
    pub fn is_native(&self) -> bool {
        self.category.map(|c| c.is_native()).unwrap_or(false)
    }

    /// Case-insensitive match against the queried address; addresses are
    /// stored as the provider sent them.
    pub fn is_incoming_for(&self, address: &str) -> bool {
        self.to.eq_ignore_ascii_case(address)
    }

    pub fn is_outgoing_for(&self, address: &str) -> bool {
        self.from.eq_ignore_ascii_case(address)
    }
}

/// Minimal shape check only: a 0x prefix with something after it. Checksums
/// and exact lengths are left to the provider.
pub fn validate_address(raw: &str) -> Result<String, AppError> {
    let s = raw.trim();
    if !s.starts_with("0x") || s.len() <= 2 {
        return Err(AppError::InvalidAddress(raw.trim().to_string()));
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_known_values_case_insensitively() {
        assert_eq!(Category::parse("erc20"), Some(Category::Erc20));
        assert_eq!(Category::parse(" External "), Some(Category::External));
        assert_eq!(Category::parse("ERC1155"), Some(Category::Erc1155));
        assert_eq!(Category::parse("spl-token"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn nft_flag_follows_category() {
        assert!(Category::Erc721.is_nft());
        assert!(Category::Erc1155.is_nft());
        assert!(!Category::Erc20.is_nft());
        assert!(!Category::External.is_nft());
        assert!(!Category::Internal.is_nft());
    }

    #[test]
    fn address_validation_requires_prefix_and_body() {
        assert!(validate_address("0xabc123").is_ok());
        assert!(validate_address("  0xdeadbeef  ").is_ok());
        assert!(validate_address("").is_err());
        assert!(validate_address("0x").is_err());
        assert!(validate_address("abc123").is_err());
    }

    #[test]
    fn direction_checks_ignore_case() {
        let row = NormalizedRow {
            timestamp: None,
            category: Some(Category::External),
            from: "0xAbC".to_string(),
            to: "0xDeF".to_string(),
            hash: String::new(),
            value_eth: None,
            token_symbol: None,
            token_amount: None,
            token_decimals: None,
            token_id: None,
            is_nft: false,
            contract_address: None,
            nft_image: None,
        };
        assert!(row.is_outgoing_for("0xabc"));
        assert!(row.is_incoming_for("0xdef"));
        assert!(!row.is_incoming_for("0xabc"));
    }
}
