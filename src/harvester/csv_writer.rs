use crate::harvester::types::{ledger_header, ClassifiedTransaction, Direction};
use crate::harvester::writer_backend::{LedgerWriter, WriterError};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Column holding the direction label
const TYPE_COLUMN: usize = 2;

/// Column holding the signature
const TXN_COLUMN: usize = 5;

const SCAN_CHUNK: u64 = 4096;

/// Cut an interrupted final row back to the last complete line.
///
/// A row only counts as written once its newline is on disk, so anything
/// after the last `\n` was never acknowledged. Returns the bytes dropped.
fn drop_torn_row(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut buf = vec![0u8; SCAN_CHUNK as usize];
    let mut end = len;
    let mut keep = 0u64;

    while end > 0 {
        let start = end.saturating_sub(SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if keep < len {
        file.set_len(keep)?;
        file.sync_data()?;
    }
    Ok(len - keep)
}

/// Append-only CSV ledger. The header goes in exactly once, when the file
/// is created (or found empty); every later open only appends rows.
pub struct CsvLedgerWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    header: [String; 6],
}

impl CsvLedgerWriter {
    pub fn new(
        path: impl AsRef<Path>,
        base_symbol: &str,
        quote_symbol: &str,
    ) -> Result<Self, WriterError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(path)?;

        let dropped = drop_torn_row(&mut file)?;
        if dropped > 0 {
            log::warn!(
                "⚠️  Dropped {} bytes of an incomplete row at the end of {}",
                dropped,
                path.display()
            );
        }

        let is_fresh = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let header = ledger_header(base_symbol, quote_symbol);
        if is_fresh {
            writer.write_record(&header)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
            log::info!("📝 Created ledger {}", path.display());
        } else {
            log::info!("📝 Appending to existing ledger {}", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            header,
        })
    }
}

#[async_trait]
impl LedgerWriter for CsvLedgerWriter {
    async fn existing_signatures(&mut self) -> Result<Vec<String>, WriterError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let existing_header = reader.headers()?.clone();
        if existing_header.iter().ne(self.header.iter().map(String::as_str)) {
            log::warn!(
                "⚠️  Ledger header {:?} differs from configured {:?}",
                existing_header,
                self.header
            );
        }

        let mut signatures = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.get(TYPE_COLUMN).and_then(Direction::parse).is_none() {
                log::warn!(
                    "⚠️  Malformed ledger row at line {}: {:?}",
                    record.position().map(|p| p.line()).unwrap_or(0),
                    record
                );
                continue;
            }
            if let Some(sig) = record.get(TXN_COLUMN).filter(|s| !s.is_empty()) {
                signatures.push(sig.to_string());
            }
        }

        Ok(signatures)
    }

    async fn append(&mut self, records: &[ClassifiedTransaction]) -> Result<(), WriterError> {
        for record in records {
            self.writer.write_record(&record.row())?;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "CSV"
    }
}
