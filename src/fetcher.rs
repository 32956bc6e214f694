use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{truncate_body, AppError};
use crate::models::{validate_address, NormalizedRow, RawTransfer};
use crate::normalize::{normalize_transfers, string_at};
use crate::report::HistoryReport;

pub const TRANSFER_CATEGORIES: &[&str] = &["external", "internal", "erc20", "erc721", "erc1155"];

/// One page of the transfer listing. A present `page_key` means the provider
/// has more.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransfersPage {
    #[serde(default)]
    pub transfers: Vec<RawTransfer>,
    #[serde(default)]
    pub page_key: Option<String>,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<TransfersPage>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Seam between the pagination loop and the wire so the loop is testable
/// against an in-memory source.
#[async_trait]
pub trait TransferPageSource {
    async fn transfers_page(
        &self,
        address: &str,
        page_key: Option<&str>,
    ) -> Result<TransfersPage, AppError>;
}

/// Re-issues the listing call with each returned continuation token until a
/// response omits one, concatenating pages in order. Any page failure aborts
/// the whole fetch; there are no partial results.
pub async fn fetch_all_transfers<S>(
    source: &S,
    address: &str,
    max_pages: u32,
) -> Result<Vec<RawTransfer>, AppError>
where
    S: TransferPageSource + Sync,
{
    let mut all = Vec::new();
    let mut page_key: Option<String> = None;
    let mut pages = 0u32;
    loop {
        let page = source.transfers_page(address, page_key.as_deref()).await?;
        all.extend(page.transfers);
        pages += 1;
        match page.page_key {
            Some(key) if pages < max_pages => page_key = Some(key),
            Some(_) => {
                warn!(pages, transfers = all.len(), "Page cap reached with a continuation token still pending; returning what was fetched");
                break;
            }
            None => break,
        }
    }
    debug!(pages, transfers = all.len(), "Pagination complete");
    Ok(all)
}

pub struct AlchemyClient {
    http: reqwest::Client,
    config: AppConfig,
}

impl AlchemyClient {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub async fn fetch_all(&self, address: &str) -> Result<Vec<RawTransfer>, AppError> {
        fetch_all_transfers(self, address, self.config.max_pages).await
    }

    /// Per-item metadata lookup for the gallery. Strictly best-effort: any
    /// transport, shape, or timeout problem is an absent image.
    pub async fn nft_image(&self, contract_address: &str, token_id: &str) -> Option<String> {
        let response = self
            .http
            .get(self.config.nft_metadata_url())
            .timeout(self.config.nft_timeout)
            .query(&[("contractAddress", contract_address), ("tokenId", token_id)])
            .send()
            .await;
        let body = match response {
            Ok(resp) => resp.json::<serde_json::Value>().await.ok()?,
            Err(err) => {
                debug!(%contract_address, %token_id, %err, "NFT metadata lookup failed");
                return None;
            }
        };
        extract_image_url(&body)
    }

    /// Sequential, one lookup per qualifying row.
    pub async fn attach_nft_images(&self, rows: &mut [NormalizedRow]) {
        for row in rows.iter_mut().filter(|r| r.is_nft) {
            let (Some(contract), Some(token_id)) = (&row.contract_address, &row.token_id) else {
                continue;
            };
            row.nft_image = self.nft_image(contract, token_id).await;
        }
    }
}

#[async_trait]
impl TransferPageSource for AlchemyClient {
    async fn transfers_page(
        &self,
        address: &str,
        page_key: Option<&str>,
    ) -> Result<TransfersPage, AppError> {
        let body = json!({
            "id": 1,
            "jsonrpc": "2.0",
            "method": "alchemy_getAssetTransfers",
            "params": [{
                "fromBlock": "0x0",
                "toBlock": "latest",
                "withMetadata": true,
                "excludeZeroValue": false,
                "maxCount": self.config.page_size_hex(),
                "category": TRANSFER_CATEGORIES,
                "pageKey": page_key,
                "fromAddress": address,
                "toAddress": address,
            }],
        });
        let response = self
            .http
            .post(self.config.rpc_url())
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        parse_transfers_response(status, &text)
    }
}

/// A body that is not valid JSON-RPC (an HTML error page, plain text) aborts
/// the fetch with the status and a truncated copy of what came back. An empty
/// `result` is a successful zero-transfer response, not an error.
fn parse_transfers_response(status: u16, body: &str) -> Result<TransfersPage, AppError> {
    let envelope: RpcEnvelope =
        serde_json::from_str(body).map_err(|_| AppError::ProviderResponse {
            status,
            body: truncate_body(body),
        })?;
    if let Some(err) = envelope.error {
        return Err(AppError::Provider(format!(
            "{} (code {})",
            err.message, err.code
        )));
    }
    Ok(envelope.result.unwrap_or_default())
}

/// First available of a media gateway URL, a media raw URL, or an image field
/// from the nested metadata object.
fn extract_image_url(body: &serde_json::Value) -> Option<String> {
    if let Some(entries) = body.get("media").and_then(|m| m.as_array()) {
        for entry in entries {
            if let Some(url) = string_at(entry, &["gateway"]).or_else(|| string_at(entry, &["raw"]))
            {
                return Some(url);
            }
        }
    }
    let metadata = body.get("metadata")?;
    string_at(metadata, &["image"]).or_else(|| string_at(metadata, &["image_url"]))
}

/// The whole query path: validate, fetch every page, normalize, decorate NFT
/// rows, aggregate.
pub async fn query_history(
    client: &AlchemyClient,
    address: &str,
) -> Result<HistoryReport, AppError> {
    let address = validate_address(address)?;
    let raws = client.fetch_all(&address).await?;
    info!(%address, transfers = raws.len(), "Fetched transfer history");
    let mut rows = normalize_transfers(&raws);
    client.attach_nft_images(&mut rows).await;
    Ok(HistoryReport::build(address, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedSource {
        pages: Mutex<VecDeque<TransfersPage>>,
        requests: AtomicUsize,
        seen_keys: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<TransfersPage>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                requests: AtomicUsize::new(0),
                seen_keys: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransferPageSource for ScriptedSource {
        async fn transfers_page(
            &self,
            _address: &str,
            page_key: Option<&str>,
        ) -> Result<TransfersPage, AppError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.seen_keys
                .lock()
                .unwrap()
                .push(page_key.map(str::to_string));
            Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    /// Always hands back another continuation token.
    struct EndlessSource {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl TransferPageSource for EndlessSource {
        async fn transfers_page(
            &self,
            _address: &str,
            _page_key: Option<&str>,
        ) -> Result<TransfersPage, AppError> {
            let n = self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(TransfersPage {
                transfers: vec![json!({"hash": format!("0x{n}")})],
                page_key: Some(format!("key-{n}")),
            })
        }
    }

    fn page(hashes: &[&str], key: Option<&str>) -> TransfersPage {
        TransfersPage {
            transfers: hashes.iter().map(|h| json!({"hash": h})).collect(),
            page_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn pagination_issues_one_request_per_page_and_concatenates_in_order() {
        let source = ScriptedSource::new(vec![
            page(&["0xa", "0xb"], Some("k1")),
            page(&["0xc"], Some("k2")),
            page(&["0xd", "0xe"], None),
        ]);
        let all = fetch_all_transfers(&source, "0xabc", 100).await.unwrap();

        assert_eq!(source.requests.load(Ordering::SeqCst), 3);
        assert_eq!(all.len(), 5);
        let hashes: Vec<&str> = all.iter().map(|t| t["hash"].as_str().unwrap()).collect();
        assert_eq!(hashes, vec!["0xa", "0xb", "0xc", "0xd", "0xe"]);

        let keys = source.seen_keys.lock().unwrap().clone();
        assert_eq!(
            keys,
            vec![None, Some("k1".to_string()), Some("k2".to_string())]
        );
    }

    #[tokio::test]
    async fn zero_transfer_history_is_empty_not_an_error() {
        let source = ScriptedSource::new(vec![page(&[], None)]);
        let all = fetch_all_transfers(&source, "0xabc", 100).await.unwrap();
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn endless_continuation_tokens_stop_at_the_page_cap() {
        let source = EndlessSource {
            requests: AtomicUsize::new(0),
        };
        let all = fetch_all_transfers(&source, "0xabc", 3).await.unwrap();
        assert_eq!(source.requests.load(Ordering::SeqCst), 3);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn non_json_body_surfaces_status_and_truncated_body() {
        let err = parse_transfers_response(503, "<html>Service Unavailable</html>").unwrap_err();
        match err {
            AppError::ProviderResponse { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("Service Unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rpc_error_object_is_a_provider_failure() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad params"}}"#;
        let err = parse_transfers_response(200, body).unwrap_err();
        assert!(matches!(err, AppError::Provider(msg) if msg.contains("bad params")));
    }

    #[test]
    fn missing_result_parses_as_an_empty_page() {
        let parsed = parse_transfers_response(200, r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(parsed.transfers.is_empty());
        assert!(parsed.page_key.is_none());
    }

    #[test]
    fn image_extraction_prefers_gateway_then_raw_then_metadata() {
        let gateway = json!({"media": [{"gateway": "https://g/1.png", "raw": "ipfs://r"}]});
        assert_eq!(extract_image_url(&gateway).as_deref(), Some("https://g/1.png"));

        let raw = json!({"media": [{"gateway": "", "raw": "ipfs://r"}]});
        assert_eq!(extract_image_url(&raw).as_deref(), Some("ipfs://r"));

        let metadata = json!({"media": [], "metadata": {"image": "https://m/2.png"}});
        assert_eq!(extract_image_url(&metadata).as_deref(), Some("https://m/2.png"));

        let image_url = json!({"metadata": {"image_url": "https://m/3.png"}});
        assert_eq!(extract_image_url(&image_url).as_deref(), Some("https://m/3.png"));

        assert_eq!(extract_image_url(&json!({})), None);
    }
}
