use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use ttyrelay_protocol::WindowSize;

use crate::lock;

/// JSONL transcript of one session's traffic
pub struct TranscriptLogger {
    session: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl TranscriptLogger {
    /// Create `session-<name>.jsonl` under `log_dir`
    pub fn create(log_dir: &Path, session: &str) -> Result<Self> {
        std::fs::create_dir_all(log_dir).context("Failed to create transcript directory")?;

        let path = log_dir.join(format!("session-{}.jsonl", session));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to create transcript {}", path.display()))?;

        Ok(Self {
            session: session.to_string(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log input sent to the inferior
    pub fn log_input(&self, data: &str) -> Result<()> {
        self.log_traffic("in", data)
    }

    /// Log output relayed from the inferior
    pub fn log_output(&self, data: &str) -> Result<()> {
        self.log_traffic("out", data)
    }

    pub fn log_resize(&self, size: WindowSize) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session": self.session,
            "event": "resize",
            "rows": size.rows,
            "cols": size.cols,
        }))
    }

    /// Log a control event, such as a version handshake or session end
    pub fn log_event(&self, event: &str, data: &str) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session": self.session,
            "event": event,
            "data": data,
        }))
    }

    fn log_traffic(&self, direction: &str, data: &str) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session": self.session,
            "direction": direction,
            "data": data,
        }))
    }

    fn write_entry(&self, entry: serde_json::Value) -> Result<()> {
        let mut file = lock(&self.file);
        writeln!(file, "{}", entry).context("Failed to write to transcript")?;
        file.flush()?;
        Ok(())
    }
}
