use crate::harvester::errors::HarvestError;
use crate::harvester::rpc_client::LedgerSource;
use std::sync::Arc;

/// One page of signatures older than `before`, newest first
pub async fn fetch_page(
    source: &dyn LedgerSource,
    address: &str,
    before: Option<&str>,
    page_size: usize,
) -> Result<Vec<String>, HarvestError> {
    let mut page = source
        .list_signatures(address, before, page_size)
        .await
        .map_err(|e| HarvestError::Upstream(format!("listing signatures for {}: {}", address, e)))?;

    page.truncate(page_size);
    Ok(page)
}

/// Walks an address's history from newest to oldest, one page at a time
pub struct SignatureCursor {
    source: Arc<dyn LedgerSource>,
    address: String,
    page_size: usize,
    before: Option<String>,
    exhausted: bool,
}

impl SignatureCursor {
    pub fn new(source: Arc<dyn LedgerSource>, address: impl Into<String>, page_size: usize) -> Self {
        Self {
            source,
            address: address.into(),
            page_size,
            before: None,
            exhausted: false,
        }
    }

    /// Start below a known signature instead of at the newest one
    pub fn starting_before(mut self, before: Option<String>) -> Self {
        self.before = before;
        self
    }

    pub fn before(&self) -> Option<&str> {
        self.before.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next page; empty once history is exhausted
    pub async fn next_page(&mut self) -> Result<Vec<String>, HarvestError> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let page = fetch_page(
            self.source.as_ref(),
            &self.address,
            self.before.as_deref(),
            self.page_size,
        )
        .await?;

        match page.last() {
            Some(oldest) => self.before = Some(oldest.clone()),
            None => self.exhausted = true,
        }

        log::debug!(
            "📄 Page of {} signatures (cursor: {})",
            page.len(),
            self.before.as_deref().unwrap_or("newest")
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvester::rpc_client::SourceError;
    use crate::harvester::types::RawTransaction;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Newest-first history `s9 .. s0`, recording each `before` it receives
    struct PagedHistory {
        history: Vec<String>,
        calls: Mutex<Vec<Option<String>>>,
        fail: bool,
    }

    impl PagedHistory {
        fn new(len: usize) -> Self {
            Self {
                history: (0..len).rev().map(|i| format!("s{}", i)).collect(),
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl LedgerSource for PagedHistory {
        async fn list_signatures(
            &self,
            _address: &str,
            before: Option<&str>,
            limit: usize,
        ) -> Result<Vec<String>, SourceError> {
            self.calls.lock().unwrap().push(before.map(str::to_string));
            if self.fail {
                return Err(SourceError::Http(503));
            }

            let start = match before {
                Some(b) => self.history.iter().position(|s| s == b).map(|i| i + 1).unwrap_or(self.history.len()),
                None => 0,
            };
            Ok(self.history.iter().skip(start).take(limit).cloned().collect())
        }

        async fn get_transaction(&self, _signature: &str) -> Result<Option<RawTransaction>, SourceError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_cursor_walks_history_and_exhausts() {
        let source = Arc::new(PagedHistory::new(10));
        let mut cursor = SignatureCursor::new(source.clone(), "addr", 4);

        let mut seen = Vec::new();
        loop {
            let page = cursor.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 4);
            seen.extend(page);
        }

        assert_eq!(seen.len(), 10);
        assert_eq!(seen.first().map(String::as_str), Some("s9"));
        assert_eq!(seen.last().map(String::as_str), Some("s0"));
        assert!(cursor.is_exhausted());

        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![None, Some("s6".to_string()), Some("s2".to_string()), Some("s0".to_string())]
        );
    }

    #[tokio::test]
    async fn test_exhausted_cursor_stops_calling_upstream() {
        let source = Arc::new(PagedHistory::new(0));
        let mut cursor = SignatureCursor::new(source.clone(), "addr", 4);

        assert!(cursor.next_page().await.unwrap().is_empty());
        assert!(cursor.next_page().await.unwrap().is_empty());
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_starting_before() {
        let source = Arc::new(PagedHistory::new(10));
        let mut cursor = SignatureCursor::new(source, "addr", 3).starting_before(Some("s5".to_string()));

        let page = cursor.next_page().await.unwrap();
        assert_eq!(page, vec!["s4", "s3", "s2"]);
        assert_eq!(cursor.before(), Some("s2"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_fatal() {
        let mut history = PagedHistory::new(3);
        history.fail = true;
        let mut cursor = SignatureCursor::new(Arc::new(history), "addr", 3);

        assert!(matches!(cursor.next_page().await, Err(HarvestError::Upstream(_))));
    }
}
