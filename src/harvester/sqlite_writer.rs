use crate::harvester::types::ClassifiedTransaction;
use crate::harvester::writer_backend::{LedgerWriter, WriterError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct SqliteLedgerWriter {
    conn: Connection,
}

impl SqliteLedgerWriter {
    pub fn new(
        db_path: impl AsRef<Path>,
        base_symbol: &str,
        quote_symbol: &str,
    ) -> Result<Self, WriterError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WriterError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to create database directory {}: {}", parent.display(), e),
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature TEXT UNIQUE NOT NULL,
                timestamp INTEGER NOT NULL,
                date TEXT NOT NULL,
                direction TEXT NOT NULL,
                base_amount TEXT NOT NULL,
                quote_amount TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ledger_timestamp ON ledger(timestamp DESC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        // Column labels are fixed by the first run against this database
        conn.execute(
            "INSERT OR IGNORE INTO ledger_meta (key, value) VALUES ('base_symbol', ?1), ('quote_symbol', ?2)",
            params![base_symbol, quote_symbol],
        )?;

        let stored_base: Option<String> = conn
            .query_row(
                "SELECT value FROM ledger_meta WHERE key = 'base_symbol'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if stored_base.as_deref() != Some(base_symbol) {
            log::warn!(
                "⚠️  Ledger database labels base leg {:?}, configured {}",
                stored_base,
                base_symbol
            );
        }

        let writer = Self { conn };
        log::info!(
            "✅ SQLite ledger initialized with WAL mode ({} rows)",
            writer.row_count()?
        );

        Ok(writer)
    }

    pub fn row_count(&self) -> Result<usize, WriterError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl LedgerWriter for SqliteLedgerWriter {
    async fn existing_signatures(&mut self) -> Result<Vec<String>, WriterError> {
        let mut stmt = self.conn.prepare("SELECT signature FROM ledger ORDER BY id")?;
        let signatures = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(signatures)
    }

    async fn append(&mut self, records: &[ClassifiedTransaction]) -> Result<(), WriterError> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ledger
                 (signature, timestamp, date, direction, base_amount, quote_amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for record in records {
                let [date, _, direction, base, quote, signature] = record.row();
                stmt.execute(params![signature, record.timestamp, date, direction, base, quote])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLITE"
    }
}
