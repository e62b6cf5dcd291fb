use crate::harvester::config::HarvestConfig;
use crate::harvester::error_handler::ExponentialBackoff;
use crate::harvester::types::{RawTransaction, TokenBalance};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionTokenBalance};
use std::time::Duration;

#[derive(Debug)]
pub enum SourceError {
    Transport(String),
    Http(u16),
    Rpc { code: i64, message: String },
    Decode(String),
}

impl SourceError {
    /// Transport hiccups, throttling and server faults are worth another try
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Http(status) => *status == 429 || *status >= 500,
            SourceError::Rpc { .. } | SourceError::Decode(_) => false,
        }
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "Transport error: {}", msg),
            SourceError::Http(status) => write!(f, "HTTP status {}", status),
            SourceError::Rpc { code, message } => write!(f, "RPC error {}: {}", code, message),
            SourceError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// The two upstream operations the harvester consumes
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Signatures touching `address`, newest first, strictly older than `before`
    async fn list_signatures(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SourceError>;

    /// `Ok(None)` when the node does not know the signature
    async fn get_transaction(&self, signature: &str) -> Result<Option<RawTransaction>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
}

/// JSON-RPC client for a Solana node
pub struct RpcLedgerSource {
    client: reqwest::Client,
    rpc_url: String,
    commitment: String,
    max_retries: u32,
}

impl RpcLedgerSource {
    pub fn new(config: &HarvestConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            commitment: config.commitment.clone(),
            max_retries: config.rpc_max_retries,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, SourceError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut backoff = ExponentialBackoff::new(250, 8_000, self.max_retries);

        loop {
            match self.send_once::<T>(&body).await {
                Ok(result) => {
                    if backoff.attempts() > 0 {
                        log::info!("✅ {} succeeded after {} retries", method, backoff.attempts());
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() => {
                    log::warn!("⚠️  {} failed: {}", method, e);
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, body: &Value) -> Result<Option<T>, SourceError> {
        let response = self
            .client
            .post(&self.rpc_url)
            .json(body)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        parse_response(&text)
    }
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<Option<T>, SourceError> {
    let parsed: RpcResponse<T> =
        serde_json::from_str(text).map_err(|e| SourceError::Decode(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(SourceError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    Ok(parsed.result)
}

#[async_trait]
impl LedgerSource for RpcLedgerSource {
    async fn list_signatures(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        let mut options = json!({
            "limit": limit,
            "commitment": self.commitment,
        });
        if let Some(before) = before {
            options["before"] = json!(before);
        }

        let infos: Option<Vec<SignatureInfo>> = self
            .call("getSignaturesForAddress", json!([address, options]))
            .await?;

        Ok(infos
            .unwrap_or_default()
            .into_iter()
            .map(|info| info.signature)
            .collect())
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<RawTransaction>, SourceError> {
        let tx: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": self.commitment,
                        "maxSupportedTransactionVersion": 0,
                    }
                ]),
            )
            .await?;

        Ok(tx.map(project_transaction))
    }
}

/// Keep only what classification needs from the node's transaction view
pub fn project_transaction(tx: EncodedConfirmedTransactionWithStatusMeta) -> RawTransaction {
    let block_time = tx.block_time;

    match tx.transaction.meta {
        Some(meta) => {
            let pre: Option<Vec<UiTransactionTokenBalance>> = meta.pre_token_balances.into();
            let post: Option<Vec<UiTransactionTokenBalance>> = meta.post_token_balances.into();

            RawTransaction {
                failed: meta.err.is_some(),
                block_time,
                pre_balances: pre.unwrap_or_default().into_iter().map(to_token_balance).collect(),
                post_balances: post.unwrap_or_default().into_iter().map(to_token_balance).collect(),
            }
        }
        None => RawTransaction {
            failed: false,
            block_time,
            pre_balances: Vec::new(),
            post_balances: Vec::new(),
        },
    }
}

fn to_token_balance(balance: UiTransactionTokenBalance) -> TokenBalance {
    let owner: Option<String> = balance.owner.into();
    TokenBalance {
        account_index: balance.account_index,
        owner,
        mint: balance.mint,
        amount: balance.ui_token_amount.ui_amount_string,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_page() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":[
            {"signature":"sigA","slot":10,"err":null,"memo":null,"blockTime":1700000000},
            {"signature":"sigB","slot":9,"err":{"InstructionError":[0,"Custom"]},"memo":null,"blockTime":null}
        ]}"#;

        let infos: Option<Vec<SignatureInfo>> = parse_response(text).unwrap();
        let sigs: Vec<String> = infos.unwrap().into_iter().map(|i| i.signature).collect();
        assert_eq!(sigs, vec!["sigA", "sigB"]);
    }

    #[test]
    fn test_parse_null_result() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let result: Option<Vec<SignatureInfo>> = parse_response(text).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_rpc_error_not_retryable() {
        let text = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param"}}"#;
        let err = parse_response::<Vec<SignatureInfo>>(text).unwrap_err();

        assert!(matches!(err, SourceError::Rpc { code: -32602, .. }));
        assert!(!err.is_retryable());
    }

    fn decode_transaction(text: &str) -> RawTransaction {
        let tx: Option<EncodedConfirmedTransactionWithStatusMeta> = parse_response(text).unwrap();
        project_transaction(tx.expect("transaction present"))
    }

    #[test]
    fn test_project_failed_transaction() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{
            "slot":228000000,
            "blockTime":1700000000,
            "transaction":["AQID","base64"],
            "meta":{
                "err":{"InstructionError":[2,{"Custom":6001}]},
                "status":{"Err":{"InstructionError":[2,{"Custom":6001}]}},
                "fee":5000,
                "preBalances":[1000000,2039280],
                "postBalances":[995000,2039280],
                "preTokenBalances":[
                    {"accountIndex":3,"mint":"QuoteMint","owner":"Router","programId":"TokenProgram",
                     "uiTokenAmount":{"uiAmount":100.0,"decimals":9,"amount":"100000000000","uiAmountString":"100"}}
                ],
                "postTokenBalances":[
                    {"accountIndex":3,"mint":"QuoteMint","owner":"Router","programId":"TokenProgram",
                     "uiTokenAmount":{"uiAmount":105.0,"decimals":9,"amount":"105000000000","uiAmountString":"105"}}
                ]
            }
        }}"#;

        let raw = decode_transaction(text);
        assert!(raw.failed);
        assert_eq!(raw.block_time, Some(1700000000));
        assert_eq!(
            raw.pre_balances,
            vec![TokenBalance {
                account_index: 3,
                owner: Some("Router".to_string()),
                mint: "QuoteMint".to_string(),
                amount: "100".to_string(),
            }]
        );
        assert_eq!(raw.post_balances[0].amount, "105");
    }

    #[test]
    fn test_project_success_without_token_balances() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{
            "slot":228000001,
            "blockTime":1700000100,
            "transaction":["AQID","base64"],
            "meta":{
                "err":null,
                "status":{"Ok":null},
                "fee":5000,
                "preBalances":[1000000],
                "postBalances":[995000]
            }
        }}"#;

        let raw = decode_transaction(text);
        assert!(!raw.failed);
        assert_eq!(raw.block_time, Some(1700000100));
        assert!(raw.pre_balances.is_empty());
        assert!(raw.post_balances.is_empty());
    }

    #[test]
    fn test_project_owner_missing_and_null_meta() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{
            "slot":228000002,
            "blockTime":null,
            "transaction":["AQID","base64"],
            "meta":{
                "err":null,
                "status":{"Ok":null},
                "fee":5000,
                "preBalances":[],
                "postBalances":[],
                "preTokenBalances":[
                    {"accountIndex":1,"mint":"BaseMint",
                     "uiTokenAmount":{"uiAmount":null,"decimals":6,"amount":"0","uiAmountString":"0"}}
                ],
                "postTokenBalances":[]
            }
        }}"#;

        let raw = decode_transaction(text);
        assert_eq!(raw.block_time, None);
        assert_eq!(raw.pre_balances[0].owner, None);
        assert_eq!(raw.pre_balances[0].amount, "0");

        let text = r#"{"jsonrpc":"2.0","id":1,"result":{
            "slot":228000003,
            "blockTime":1700000200,
            "transaction":["AQID","base64"],
            "meta":null
        }}"#;

        let raw = decode_transaction(text);
        assert!(!raw.failed);
        assert_eq!(raw.block_time, Some(1700000200));
        assert!(raw.pre_balances.is_empty() && raw.post_balances.is_empty());
    }

    #[test]
    fn test_unknown_signature_is_none() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let tx: Option<EncodedConfirmedTransactionWithStatusMeta> = parse_response(text).unwrap();
        assert!(tx.is_none());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(SourceError::Http(429).is_retryable());
        assert!(SourceError::Http(503).is_retryable());
        assert!(!SourceError::Http(404).is_retryable());
        assert!(SourceError::Transport("reset".to_string()).is_retryable());
        assert!(!SourceError::Decode("eof".to_string()).is_retryable());
    }
}
