use crate::harvester::types::ClassifiedTransaction;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum WriterError {
    Io(std::io::Error),
    Csv(String),
    Database(String),
}

impl From<std::io::Error> for WriterError {
    fn from(err: std::io::Error) -> Self {
        WriterError::Io(err)
    }
}

impl From<csv::Error> for WriterError {
    fn from(err: csv::Error) -> Self {
        WriterError::Csv(err.to_string())
    }
}

impl From<rusqlite::Error> for WriterError {
    fn from(err: rusqlite::Error) -> Self {
        WriterError::Database(err.to_string())
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Io(e) => write!(f, "IO error: {}", e),
            WriterError::Csv(e) => write!(f, "CSV error: {}", e),
            WriterError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for WriterError {}

#[async_trait]
pub trait LedgerWriter: Send {
    /// Signatures already persisted by earlier runs against this sink
    async fn existing_signatures(&mut self) -> Result<Vec<String>, WriterError>;

    /// Append rows and make them durable before returning
    async fn append(&mut self, records: &[ClassifiedTransaction]) -> Result<(), WriterError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// In-process sink; clones share the same rows
#[derive(Clone, Default)]
pub struct MemoryLedgerWriter {
    rows: Arc<Mutex<Vec<ClassifiedTransaction>>>,
}

impl MemoryLedgerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<ClassifiedTransaction> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl LedgerWriter for MemoryLedgerWriter {
    async fn existing_signatures(&mut self) -> Result<Vec<String>, WriterError> {
        Ok(self.rows.lock().await.iter().map(|r| r.signature.clone()).collect())
    }

    async fn append(&mut self, records: &[ClassifiedTransaction]) -> Result<(), WriterError> {
        self.rows.lock().await.extend_from_slice(records);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "MEMORY"
    }
}
