pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod csv_writer;
pub mod cursor;
pub mod error_handler;
pub mod errors;
pub mod fetcher;
pub mod orchestrator;
pub mod rate_limiter;
pub mod rpc_client;
pub mod sqlite_writer;
pub mod types;
pub mod writer_backend;

pub use aggregator::LedgerAggregator;
pub use classifier::classify;
pub use config::{BackendType, HarvestConfig};
pub use errors::{HarvestError, SkipReason};
pub use orchestrator::{run, HarvestOrchestrator, HarvestReport, HarvestSettings, StopReason};
pub use rpc_client::{LedgerSource, RpcLedgerSource};
pub use types::{ClassifiedTransaction, Direction, RawTransaction, TokenBalance};
