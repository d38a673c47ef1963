//! Optional JSON-lines dump of every bridge message, for debugging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use log::info;
use serde::Serialize;
use serde_json::Value;

/// Which way a message crossed the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToWebview,
    FromWebview,
}

/// Entry in the dump file - wraps a message with metadata for analysis
#[derive(Serialize)]
struct DumpEntry {
    /// ISO 8601 timestamp when the message was logged
    ts: String,
    dir: Direction,
    /// The message itself, or the raw text when it was not valid JSON
    msg: Value,
}

pub struct MessageDump {
    file: Mutex<File>,
}

impl MessageDump {
    /// Create (or truncate) the dump file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        info!("Dumping bridge messages to {:?}", path);
        Ok(MessageDump {
            file: Mutex::new(file),
        })
    }

    pub fn record(&self, dir: Direction, raw: &str) {
        let entry = DumpEntry {
            ts: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            dir,
            msg: serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        };
        if let Ok(json) = serde_json::to_string(&entry) {
            if let Ok(mut f) = self.file.lock() {
                let _ = writeln!(f, "{}", json);
                let _ = f.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_one_line_per_message() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.jsonl");
        let dump = MessageDump::create(&path).unwrap();
        dump.record(Direction::FromWebview, r#"{"command":"connected"}"#);
        dump.record(Direction::ToWebview, "not json");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["dir"], "from_webview");
        assert_eq!(lines[0]["msg"]["command"], "connected");
        assert_eq!(lines[1]["dir"], "to_webview");
        assert_eq!(lines[1]["msg"], "not json");
    }
}
