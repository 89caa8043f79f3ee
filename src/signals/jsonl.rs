use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

use super::TradeSignalSource;
use crate::domain::TradeIntent;
use crate::error::Result;

/// Intents read from a file, one JSON object per line
///
/// ```text
/// {"symbol":"BTCUSDT","side":"long","entry_price":"100","confidence":"0.8"}
/// ```
pub struct JsonlSignalSource {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonlSignalSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

#[async_trait]
impl TradeSignalSource for JsonlSignalSource {
    async fn next_intent(&mut self) -> Option<TradeIntent> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Signal file read failed at line {}: {}", self.line_no + 1, e);
                    return None;
                }
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match serde_json::from_str::<TradeIntent>(line) {
                Ok(intent) => return Some(intent),
                Err(e) => warn!("Skipping malformed signal on line {}: {}", self.line_no, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_reads_intents_and_skips_bad_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# replayed signals").unwrap();
        writeln!(
            file,
            r#"{{"symbol":"BTCUSDT","side":"long","entry_price":"100","confidence":"0.9"}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"symbol":"ETHUSDT","side":"short","entry_price":2500.5,"confidence":0.6}}"#
        )
        .unwrap();

        let mut source = JsonlSignalSource::open(file.path()).await.unwrap();
        let first = source.next_intent().await.unwrap();
        assert_eq!(first.side, Side::Long);
        assert_eq!(first.entry_price, dec!(100));

        let second = source.next_intent().await.unwrap();
        assert_eq!(second.symbol, "ETHUSDT");
        assert_eq!(second.entry_price, dec!(2500.5));
        assert!(source.next_intent().await.is_none());
    }
}
