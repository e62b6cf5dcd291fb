use solana_pubkey::Pubkey;
use solana_signature::Signature;
use std::env;
use std::str::FromStr;

pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Largest page `getSignaturesForAddress` accepts
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Csv,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub rpc_url: String,
    pub token_mint: String,
    pub quote_mint: String,
    pub router_account: String,
    pub base_symbol: String,
    pub quote_symbol: String,
    pub target_tx_count: usize,
    pub page_size: usize,
    pub worker_limit: usize,
    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,
    pub output_path: String,
    pub backend: BackendType,
    pub sort_by_timestamp: bool,
    pub start_before: Option<String>,
    pub rpc_max_retries: u32,
    pub rpc_timeout_secs: u64,
    pub commitment: String,
    pub rust_log: String,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl HarvestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup (environment, map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().to_string())
                .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
        };

        let rpc_url = required("RPC_URL")?;
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "RPC_URL must start with http:// or https://".to_string(),
            ));
        }

        let token_mint = parse_address("TOKEN_MINT", required("TOKEN_MINT")?)?;
        let router_account = parse_address("ROUTER_ACCOUNT", required("ROUTER_ACCOUNT")?)?;
        let quote_mint = parse_address(
            "QUOTE_MINT",
            lookup("QUOTE_MINT").unwrap_or_else(|| WRAPPED_SOL_MINT.to_string()),
        )?;

        let base_symbol = lookup("BASE_SYMBOL").unwrap_or_else(|| "TOKEN".to_string());
        let quote_symbol = lookup("QUOTE_SYMBOL").unwrap_or_else(|| "SOL".to_string());

        let target_tx_count = positive(&lookup, "TARGET_TX_COUNT", 1000usize)?;
        let page_size = positive(&lookup, "PAGE_SIZE", MAX_PAGE_SIZE)?;
        if page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "PAGE_SIZE must be at most {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        let worker_limit = positive(&lookup, "WORKER_LIMIT", 10usize)?;
        let rate_limit_per_sec = positive(&lookup, "RATE_LIMIT_PER_SEC", 5u32)?;
        let rate_limit_burst = positive(&lookup, "RATE_LIMIT_BURST", 5u32)?;

        let output_path = lookup("OUTPUT_PATH").unwrap_or_else(|| "transactions.csv".to_string());

        let backend_str = lookup("LEDGER_BACKEND").unwrap_or_else(|| "csv".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "csv" => BackendType::Csv,
            "sqlite" => BackendType::Sqlite,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "LEDGER_BACKEND must be csv or sqlite, got '{}'",
                    other
                )))
            }
        };

        let sort_by_timestamp = lookup("SORT_BY_TIMESTAMP")
            .map(|v| v.to_lowercase().parse::<bool>().unwrap_or(false))
            .unwrap_or(false);

        let start_before = match lookup("START_BEFORE").filter(|v| !v.is_empty()) {
            Some(sig) => {
                Signature::from_str(&sig).map_err(|_| {
                    ConfigError::InvalidValue(format!("START_BEFORE is not a valid signature: {}", sig))
                })?;
                Some(sig)
            }
            None => None,
        };

        let rpc_max_retries = parse_or(&lookup, "RPC_MAX_RETRIES", 3u32);
        let rpc_timeout_secs = parse_or(&lookup, "RPC_TIMEOUT_SECS", 30u64);

        let commitment_str = lookup("COMMITMENT").unwrap_or_else(|| "confirmed".to_string());
        let commitment = match commitment_str.to_lowercase().as_str() {
            "finalized" => "finalized".to_string(),
            "confirmed" => "confirmed".to_string(),
            _ => {
                log::warn!(
                    "Invalid COMMITMENT '{}', defaulting to confirmed",
                    commitment_str
                );
                "confirmed".to_string()
            }
        };

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            rpc_url,
            token_mint,
            quote_mint,
            router_account,
            base_symbol,
            quote_symbol,
            target_tx_count,
            page_size,
            worker_limit,
            rate_limit_per_sec,
            rate_limit_burst,
            output_path,
            backend,
            sort_by_timestamp,
            start_before,
            rpc_max_retries,
            rpc_timeout_secs,
            commitment,
            rust_log,
        })
    }
}

fn parse_address(key: &str, value: String) -> Result<String, ConfigError> {
    Pubkey::from_str(&value)
        .map(|_| value.clone())
        .map_err(|_| ConfigError::InvalidValue(format!("{} is not a valid address: {}", key, value)))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("Invalid {} '{}', defaulting to {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}

fn positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy + PartialEq + Default,
{
    let value = parse_or(lookup, key, default);
    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!("{} must be greater than zero", key)));
    }
    Ok(value)
}
