use anyhow::Context;
use datatypes::PositionRecord;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;

/// One recorded observation, queued from the sampling loop to the writer
/// and serialized as a single JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub source: String,
    #[serde(rename = "sample")]
    pub write_number: u64,
    pub position: PositionRecord,
}

/// JSON-lines position log with a dedicated writer thread.
///
/// Sampling must release each lock-step cycle promptly; file I/O happens on
/// the writer side of the queue so a slow disk never stalls the producers.
pub struct PositionLog {
    tx: Option<mpsc::Sender<LogEntry>>,
    writer: Option<JoinHandle<anyhow::Result<u64>>>,
}

impl PositionLog {
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
        let mut out = BufWriter::new(file);

        let (tx, rx) = mpsc::channel::<LogEntry>();
        let writer = std::thread::spawn(move || -> anyhow::Result<u64> {
            let mut written = 0u64;
            for entry in rx {
                let line =
                    serde_json::to_string(&entry).context("Failed to serialize log entry")?;
                writeln!(out, "{line}").context("Failed to write log line")?;
                written += 1;
            }
            out.flush().context("Failed to flush position log")?;
            Ok(written)
        });

        Ok(Self {
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    pub fn record(&self, entry: LogEntry) -> anyhow::Result<()> {
        self.tx
            .as_ref()
            .expect("log still open")
            .send(entry)
            .map_err(|_| anyhow::anyhow!("Position log writer has stopped"))
    }

    /// Close the queue and wait for the writer to drain; returns the number
    /// of lines written.
    pub fn finish(mut self) -> anyhow::Result<u64> {
        drop(self.tx.take());
        let handle = self.writer.take().expect("log still open");
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("Position log writer panicked"))?
    }
}

impl Drop for PositionLog {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.writer.take()
            && let Err(e) = handle.join().unwrap_or(Ok(0))
        {
            tracing::warn!(error = %e, "Position log writer failed during drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datatypes::Position2D;
    use serde_json::json;

    #[test]
    fn writes_one_json_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let log = PositionLog::create(&path).unwrap();
        for i in 0..3u64 {
            let mut position = Position2D::default();
            position.position_valid = true;
            position.position = [i as f64, 0.0];
            log.record(LogEntry {
                source: "pos1".to_string(),
                write_number: i + 1,
                position: position.record(true),
            })
            .unwrap();
        }
        assert_eq!(log.finish().unwrap(), 3);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["source"], "pos1");
        assert_eq!(first["sample"], 1);
        assert_eq!(first["position"]["pos_xy"], json!([0.0, 0.0]));
        // Verbose serialization keeps invalid fields for alignment.
        assert_eq!(first["position"]["vel_ok"], true);
    }
}
