use std::time::Duration;

use crate::error::AppError;

/// Built once at startup from CLI/env and passed explicitly to the client;
/// nothing reads ambient configuration after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub network: String,
    /// Per-request `maxCount` for the transfer listing, as a hex string.
    pub page_size: u32,
    /// Upper bound on transfer pages fetched per query. The provider promises
    /// to eventually omit the continuation token; this guards against one
    /// that never does.
    pub max_pages: u32,
    pub request_timeout: Duration,
    pub nft_timeout: Duration,
}

pub const DEFAULT_NETWORK: &str = "eth-sepolia";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_MAX_PAGES: u32 = 100;

impl AppConfig {
    pub fn new(api_key: String, network: String, max_pages: u32) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::Config("ALCHEMY_API_KEY is missing".to_string()));
        }
        if network.trim().is_empty() {
            return Err(AppError::Config("NETWORK is empty".to_string()));
        }
        Ok(Self {
            api_key: api_key.trim().to_string(),
            network: network.trim().to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: max_pages.max(1),
            request_timeout: Duration::from_secs(30),
            nft_timeout: Duration::from_secs(10),
        })
    }

    pub fn rpc_url(&self) -> String {
        format!("https://{}.g.alchemy.com/v2/{}", self.network, self.api_key)
    }

    pub fn nft_metadata_url(&self) -> String {
        format!(
            "https://{}.g.alchemy.com/nft/v2/{}/getNFTMetadata",
            self.network, self.api_key
        )
    }

    pub fn page_size_hex(&self) -> String {
        format!("{:#x}", self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_fatal() {
        let err = AppConfig::new("  ".to_string(), DEFAULT_NETWORK.to_string(), 100);
        assert!(matches!(err, Err(AppError::Config(msg)) if msg.contains("ALCHEMY_API_KEY")));
    }

    #[test]
    fn urls_embed_network_and_key() {
        let cfg = AppConfig::new("k3y".to_string(), "eth-mainnet".to_string(), 100).unwrap();
        assert_eq!(cfg.rpc_url(), "https://eth-mainnet.g.alchemy.com/v2/k3y");
        assert!(cfg.nft_metadata_url().ends_with("/nft/v2/k3y/getNFTMetadata"));
        assert_eq!(cfg.page_size_hex(), "0x3e8");
    }

    #[test]
    fn max_pages_has_a_floor() {
        let cfg = AppConfig::new("k".to_string(), DEFAULT_NETWORK.to_string(), 0).unwrap();
        assert_eq!(cfg.max_pages, 1);
    }
}
