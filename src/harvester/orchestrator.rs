use crate::harvester::{
    aggregator::LedgerAggregator,
    classifier::classify,
    config::{BackendType, HarvestConfig},
    csv_writer::CsvLedgerWriter,
    cursor::SignatureCursor,
    errors::{HarvestError, SkipReason},
    fetcher::{ConcurrentFetcher, FetchStats, Fetched},
    rate_limiter::RateLimiter,
    rpc_client::{LedgerSource, RpcLedgerSource},
    sqlite_writer::SqliteLedgerWriter,
    types::ClassifiedTransaction,
    writer_backend::LedgerWriter,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What the orchestrator needs to know about one harvest
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub token_mint: String,
    pub quote_mint: String,
    pub router_account: String,
    pub target_tx_count: usize,
    pub page_size: usize,
    pub worker_limit: usize,
    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,
    pub start_before: Option<String>,
}

impl From<&HarvestConfig> for HarvestSettings {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            token_mint: config.token_mint.clone(),
            quote_mint: config.quote_mint.clone(),
            router_account: config.router_account.clone(),
            target_tx_count: config.target_tx_count,
            page_size: config.page_size,
            worker_limit: config.worker_limit,
            rate_limit_per_sec: config.rate_limit_per_sec,
            rate_limit_burst: config.rate_limit_burst,
            start_before: config.start_before.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HistoryExhausted,
    QuotaReached,
    Cancelled,
}

#[derive(Debug)]
enum HarvestState {
    Seeking,
    Processing(Vec<String>),
    Persisting(Vec<ClassifiedTransaction>),
    Done(StopReason),
}

#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub stop_reason: StopReason,
    pub rounds: usize,
    pub signatures_listed: usize,
    pub already_recorded: usize,
    pub not_relevant: usize,
    pub persisted: usize,
    pub ledger_size: usize,
    pub fetch: FetchStats,
    /// `START_BEFORE` value that re-walks the last unfinished page; `None`
    /// once history is exhausted or when the newest page is the place to resume
    pub resume_before: Option<String>,
}

/// Drives cursor → fetch → classify → persist until history runs out,
/// the quota is met, or the caller cancels.
///
/// The quota counts rows persisted by this run. Rounds are sequential: a
/// round's workers all finish before its records are persisted.
pub struct HarvestOrchestrator {
    settings: HarvestSettings,
    cursor: SignatureCursor,
    fetcher: ConcurrentFetcher,
    aggregator: LedgerAggregator,
    round_before: Option<String>,
    rounds: usize,
    signatures_listed: usize,
    already_recorded: usize,
    not_relevant: usize,
}

impl HarvestOrchestrator {
    pub fn new(source: Arc<dyn LedgerSource>, aggregator: LedgerAggregator, settings: HarvestSettings) -> Self {
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit_per_sec, settings.rate_limit_burst));
        let cursor = SignatureCursor::new(source.clone(), settings.token_mint.clone(), settings.page_size)
            .starting_before(settings.start_before.clone());
        log::info!(
            "⏱️  Pacing: {}/s (burst {}), {} workers",
            limiter.rate_per_sec(),
            limiter.burst(),
            settings.worker_limit
        );
        let fetcher = ConcurrentFetcher::new(source, limiter, settings.worker_limit);

        Self {
            settings,
            cursor,
            fetcher,
            aggregator,
            round_before: None,
            rounds: 0,
            signatures_listed: 0,
            already_recorded: 0,
            not_relevant: 0,
        }
    }

    fn remaining_quota(&self) -> usize {
        self.settings
            .target_tx_count
            .saturating_sub(self.aggregator.persisted_count())
    }

    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<HarvestReport, HarvestError> {
        let mut state = HarvestState::Seeking;

        let stop_reason = loop {
            state = match state {
                HarvestState::Seeking => self.seek(cancel).await?,
                HarvestState::Processing(signatures) => {
                    HarvestState::Persisting(self.process_round(signatures, cancel).await)
                }
                HarvestState::Persisting(records) => self.persist(records, cancel).await?,
                HarvestState::Done(reason) => break reason,
            };
        };

        let report = HarvestReport {
            stop_reason,
            rounds: self.rounds,
            signatures_listed: self.signatures_listed,
            already_recorded: self.already_recorded,
            not_relevant: self.not_relevant,
            persisted: self.aggregator.persisted_count(),
            ledger_size: self.aggregator.ledger_size(),
            fetch: self.fetcher.stats(),
            resume_before: if self.cursor.is_exhausted() {
                None
            } else {
                self.round_before.clone()
            },
        };

        log::info!(
            "🏁 Harvest finished ({:?}): {} rows written in {} rounds, ledger holds {}",
            report.stop_reason,
            report.persisted,
            report.rounds,
            report.ledger_size
        );

        Ok(report)
    }

    async fn seek(&mut self, cancel: &CancellationToken) -> Result<HarvestState, HarvestError> {
        if cancel.is_cancelled() {
            return Ok(HarvestState::Done(StopReason::Cancelled));
        }
        if self.remaining_quota() == 0 {
            return Ok(HarvestState::Done(StopReason::QuotaReached));
        }

        let before = self.cursor.before().map(str::to_string);

        // Upstream retries can back off for seconds; cancellation must not wait on them
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(HarvestState::Done(StopReason::Cancelled)),
            page = self.cursor.next_page() => page?,
        };
        if page.is_empty() {
            log::info!("📭 Signature history exhausted");
            return Ok(HarvestState::Done(StopReason::HistoryExhausted));
        }

        self.round_before = before;
        self.rounds += 1;
        self.signatures_listed += page.len();

        let listed = page.len();
        let fresh: Vec<String> = page
            .into_iter()
            .filter(|sig| !self.aggregator.has_seen(sig))
            .collect();
        self.already_recorded += listed - fresh.len();

        log::info!(
            "🔎 Round {}: {} signatures listed, {} not yet recorded",
            self.rounds,
            listed,
            fresh.len()
        );

        Ok(HarvestState::Processing(fresh))
    }

    async fn process_round(&mut self, signatures: Vec<String>, cancel: &CancellationToken) -> Vec<ClassifiedTransaction> {
        if signatures.is_empty() {
            return Vec::new();
        }

        let round_cancel = cancel.child_token();
        let remaining = self.remaining_quota();
        let mut rx = self.fetcher.fetch_batch(signatures, &round_cancel).await;

        let mut records = Vec::new();
        while let Some(Fetched { signature, transaction }) = rx.recv().await {
            match classify(
                &transaction,
                &signature,
                &self.settings.quote_mint,
                &self.settings.token_mint,
                &self.settings.router_account,
            ) {
                Ok(record) => {
                    records.push(record);
                    if records.len() >= remaining && !round_cancel.is_cancelled() {
                        log::debug!("Quota covered mid-round, letting in-flight fetches drain");
                        round_cancel.cancel();
                    }
                }
                Err(reason) => {
                    if reason == SkipReason::NoRelevantDelta {
                        self.not_relevant += 1;
                    }
                    log::debug!("Skipping {}: {}", signature, reason);
                }
            }
        }

        records
    }

    async fn persist(
        &mut self,
        records: Vec<ClassifiedTransaction>,
        cancel: &CancellationToken,
    ) -> Result<HarvestState, HarvestError> {
        let classified = records.len();
        let written = self
            .aggregator
            .persist_batch(records, Some(self.remaining_quota()))
            .await?;

        log::info!(
            "💾 Round {}: {} classified, {} written ({}/{})",
            self.rounds,
            classified,
            written,
            self.aggregator.persisted_count(),
            self.settings.target_tx_count
        );

        if self.remaining_quota() == 0 {
            Ok(HarvestState::Done(StopReason::QuotaReached))
        } else if cancel.is_cancelled() {
            Ok(HarvestState::Done(StopReason::Cancelled))
        } else {
            Ok(HarvestState::Seeking)
        }
    }
}

pub fn open_writer(config: &HarvestConfig) -> Result<Box<dyn LedgerWriter>, HarvestError> {
    let writer: Box<dyn LedgerWriter> = match config.backend {
        BackendType::Csv => Box::new(CsvLedgerWriter::new(
            &config.output_path,
            &config.base_symbol,
            &config.quote_symbol,
        )?),
        BackendType::Sqlite => Box::new(SqliteLedgerWriter::new(
            &config.output_path,
            &config.base_symbol,
            &config.quote_symbol,
        )?),
    };
    Ok(writer)
}

/// Harvest against a live node with the configured sink
pub async fn run(config: HarvestConfig, cancel: CancellationToken) -> Result<HarvestReport, HarvestError> {
    log::info!("🚀 Starting harvest for {}", config.token_mint);
    log::info!("   Router: {}", config.router_account);
    log::info!("   Quote mint: {}", config.quote_mint);
    log::info!("   Output: {}", config.output_path);
    log::info!("   RPC URL: {}", config.rpc_url);
    log::info!("   Target: {} txs", config.target_tx_count);
    if let Some(before) = &config.start_before {
        log::info!("   Starting below: {}", before);
    }

    let source = RpcLedgerSource::new(&config)
        .map_err(|e| HarvestError::Upstream(format!("building RPC client: {}", e)))?;

    let writer = open_writer(&config)?;
    let aggregator = LedgerAggregator::open(writer, config.sort_by_timestamp).await?;

    let mut orchestrator = HarvestOrchestrator::new(Arc::new(source), aggregator, HarvestSettings::from(&config));
    orchestrator.run(&cancel).await
}
