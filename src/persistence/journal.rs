//! Trade Journal
//!
//! Append-only JSONL record of trade events. Each line is an independent JSON
//! object, so a crash can at worst leave one truncated trailing line, which
//! replay skips. Appends are serialized and fsynced before returning; reads
//! scan the file, so they always see every acknowledged append.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::domain::{TradeOutcome, TradeRecord};
use crate::error::{GuardError, Result};

/// Durable trade journal backed by a JSONL file
pub struct TradeJournal {
    path: PathBuf,
    /// Serializes appends; holds the last written timestamp so replay order is ascending
    writer: Mutex<Option<DateTime<Utc>>>,
}

impl TradeJournal {
    /// Open (or prepare to create) the journal at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let journal = Self {
            path,
            writer: Mutex::new(None),
        };

        let last = journal.read_records().await?.last().map(|r| r.timestamp);
        *journal.writer.lock().await = last;

        debug!("Opened trade journal at {}", journal.path.display());
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the journal can currently be written
    pub async fn ensure_writable(&self) -> Result<()> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| GuardError::JournalWrite(format!("{}: {}", self.path.display(), e)))
    }

    /// Durably append a record.
    ///
    /// The record is stamped with the write time (never earlier than the
    /// previous record), written, and fsynced before this returns.
    pub async fn append(&self, mut record: TradeRecord) -> Result<TradeRecord> {
        let mut last = self.writer.lock().await;

        let now = Utc::now();
        record.timestamp = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await
        };

        if let Err(e) = write.await {
            error!("Journal append failed for position {}: {}", record.position_id, e);
            return Err(GuardError::JournalWrite(format!("{}: {}", self.path.display(), e)));
        }

        *last = Some(record.timestamp);
        debug!(
            position_id = %record.position_id,
            outcome = ?record.outcome,
            pnl = %record.pnl,
            "Journaled trade record"
        );
        Ok(record)
    }

    /// Read every record currently in the journal
    pub async fn read_records(&self) -> Result<Vec<TradeRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GuardError::JournalRead(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        Ok(contents
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| parse_line(idx, line))
            .collect())
    }

    /// Net pnl of records stamped on `date` (UTC)
    pub async fn daily_pnl(&self, date: NaiveDate) -> Result<Decimal> {
        Ok(self
            .read_records()
            .await?
            .iter()
            .filter(|r| r.timestamp.date_naive() == date)
            .map(|r| r.pnl)
            .sum())
    }

    /// Sum of the negative pnl stamped on `date` (UTC); zero or negative
    pub async fn daily_loss(&self, date: NaiveDate) -> Result<Decimal> {
        Ok(self
            .read_records()
            .await?
            .iter()
            .filter(|r| r.timestamp.date_naive() == date && r.pnl < Decimal::ZERO)
            .map(|r| r.pnl)
            .sum())
    }

    /// Lazy, restartable replay of the journal in timestamp order
    pub fn all(&self) -> JournalReplay {
        JournalReplay {
            path: self.path.clone(),
        }
    }

    /// Aggregate statistics over finished positions
    pub async fn summary(&self) -> Result<JournalSummary> {
        Ok(JournalSummary::from_records(&self.read_records().await?))
    }
}

fn parse_line(idx: usize, line: &str) -> Option<TradeRecord> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<TradeRecord>(line) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping malformed journal line {}: {}", idx + 1, e);
            None
        }
    }
}

/// Replays the journal from storage; every `iter()` starts from the beginning
#[derive(Debug, Clone)]
pub struct JournalReplay {
    path: PathBuf,
}

impl JournalReplay {
    pub fn iter(&self) -> io::Result<JournalIter> {
        let reader = match fs::File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        Ok(JournalIter { reader, line_no: 0 })
    }
}

/// Streaming iterator over journal records
pub struct JournalIter {
    reader: Option<BufReader<fs::File>>,
    line_no: usize,
}

impl Iterator for JournalIter {
    type Item = TradeRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let idx = self.line_no;
                    self.line_no += 1;
                    if let Some(record) = parse_line(idx, line.trim_end()) {
                        return Some(record);
                    }
                }
                Err(e) => {
                    warn!("Journal replay stopped at line {}: {}", self.line_no + 1, e);
                    return None;
                }
            }
        }
    }
}

/// Statistics over terminal journal records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSummary {
    /// Positions that were opened and closed
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Entries that never filled
    pub rejected: usize,
    pub total_pnl: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
    /// Largest peak-to-trough fall of cumulative pnl
    pub max_drawdown: Decimal,
}

impl JournalSummary {
    pub fn from_records(records: &[TradeRecord]) -> Self {
        let mut summary = JournalSummary::default();
        let mut cumulative = Decimal::ZERO;
        let mut peak = Decimal::ZERO;

        for record in records.iter().filter(|r| r.outcome.is_terminal()) {
            if record.outcome == TradeOutcome::Rejected {
                summary.rejected += 1;
                continue;
            }

            summary.trades += 1;
            if record.pnl > Decimal::ZERO {
                summary.wins += 1;
            } else if record.pnl < Decimal::ZERO {
                summary.losses += 1;
            }

            summary.best_trade = summary.best_trade.max(record.pnl);
            summary.worst_trade = summary.worst_trade.min(record.pnl);

            cumulative += record.pnl;
            peak = peak.max(cumulative);
            summary.max_drawdown = summary.max_drawdown.max(peak - cumulative);
        }

        summary.total_pnl = cumulative;
        summary
    }

    /// Fraction of closed trades with positive pnl
    pub fn win_rate(&self) -> Option<Decimal> {
        if self.trades == 0 {
            None
        } else {
            Some(Decimal::from(self.wins) / Decimal::from(self.trades))
        }
    }
}
