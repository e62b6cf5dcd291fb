use crate::harvester::errors::SkipReason;
use crate::harvester::rate_limiter::RateLimiter;
use crate::harvester::rpc_client::LedgerSource;
use crate::harvester::types::RawTransaction;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// A successfully retrieved, on-chain-successful transaction
#[derive(Debug, Clone)]
pub struct Fetched {
    pub signature: String,
    pub transaction: RawTransaction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub fetched: u64,
    pub failed: u64,
    pub not_found: u64,
    pub execution_failed: u64,
    pub duplicates_skipped: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicU64,
    failed: AtomicU64,
    not_found: AtomicU64,
    execution_failed: AtomicU64,
    duplicates_skipped: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn record_skip(&self, reason: &SkipReason) {
        let counter = match reason {
            SkipReason::FetchFailed(_) => &self.failed,
            SkipReason::NotFound => &self.not_found,
            SkipReason::ExecutionFailure => &self.execution_failed,
            SkipReason::Cancelled => &self.cancelled,
            SkipReason::NoRelevantDelta | SkipReason::MissingTimestamp => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FetchStats {
        FetchStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            execution_failed: self.execution_failed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-width worker pool retrieving transaction detail under the rate limiter.
///
/// A signature is claimed once per run: duplicates inside a batch and
/// signatures resolved in earlier batches are never fetched again.
pub struct ConcurrentFetcher {
    source: Arc<dyn LedgerSource>,
    limiter: Arc<RateLimiter>,
    worker_limit: usize,
    claimed: Arc<Mutex<HashSet<String>>>,
    counters: Arc<Counters>,
}

impl ConcurrentFetcher {
    pub fn new(source: Arc<dyn LedgerSource>, limiter: Arc<RateLimiter>, worker_limit: usize) -> Self {
        Self {
            source,
            limiter,
            worker_limit: worker_limit.max(1),
            claimed: Arc::new(Mutex::new(HashSet::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> FetchStats {
        self.counters.snapshot()
    }

    /// Fetch a batch. The receiver yields transactions in completion order
    /// and closes once every worker has finished. After `cancel` fires no
    /// new fetch starts; fetches already under way still deliver.
    pub async fn fetch_batch(
        &self,
        signatures: Vec<String>,
        cancel: &CancellationToken,
    ) -> mpsc::Receiver<Fetched> {
        let mut queue = VecDeque::with_capacity(signatures.len());
        {
            let mut claimed = self.claimed.lock().await;
            for signature in signatures {
                if claimed.insert(signature.clone()) {
                    queue.push_back(signature);
                } else {
                    self.counters.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let workers = self.worker_limit.min(queue.len());
        let (tx, rx) = mpsc::channel(self.worker_limit * 2);
        let queue = Arc::new(Mutex::new(queue));

        log::debug!(
            "🚚 Dispatching {} signatures to {} workers",
            queue.lock().await.len(),
            workers
        );

        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                source: self.source.clone(),
                limiter: self.limiter.clone(),
                queue: queue.clone(),
                claimed: self.claimed.clone(),
                counters: self.counters.clone(),
                cancel: cancel.clone(),
                tx: tx.clone(),
            };
            tokio::spawn(worker.run());
        }

        rx
    }
}

struct Worker {
    id: usize,
    source: Arc<dyn LedgerSource>,
    limiter: Arc<RateLimiter>,
    queue: Arc<Mutex<VecDeque<String>>>,
    claimed: Arc<Mutex<HashSet<String>>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Fetched>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                self.release_pending().await;
                break;
            }

            let signature = match self.queue.lock().await.pop_front() {
                Some(signature) => signature,
                None => break,
            };

            if self.limiter.acquire(&self.cancel).await.is_err() {
                self.release(&signature).await;
                self.release_pending().await;
                break;
            }

            match self.fetch_one(&signature).await {
                Ok(transaction) => {
                    self.counters.fetched.fetch_add(1, Ordering::Relaxed);
                    if self.tx.send(Fetched { signature, transaction }).await.is_err() {
                        log::debug!("Worker {}: receiver dropped, stopping", self.id);
                        break;
                    }
                }
                Err(reason) => {
                    self.counters.record_skip(&reason);
                    match reason {
                        SkipReason::FetchFailed(_) => {
                            log::warn!("⚠️  Dropping {}: {}", signature, reason)
                        }
                        _ => log::debug!("Skipping {}: {}", signature, reason),
                    }
                }
            }
        }
    }

    async fn fetch_one(&self, signature: &str) -> Result<RawTransaction, SkipReason> {
        match self.source.get_transaction(signature).await {
            Ok(Some(tx)) if tx.failed => Err(SkipReason::ExecutionFailure),
            Ok(Some(tx)) => Ok(tx),
            Ok(None) => Err(SkipReason::NotFound),
            Err(e) => Err(SkipReason::FetchFailed(e.to_string())),
        }
    }

    /// Un-claim a signature that was never fetched
    async fn release(&self, signature: &str) {
        self.claimed.lock().await.remove(signature);
        self.counters.record_skip(&SkipReason::Cancelled);
    }

    async fn release_pending(&self) {
        let pending: Vec<String> = self.queue.lock().await.drain(..).collect();
        for signature in pending {
            self.release(&signature).await;
        }
    }
}
