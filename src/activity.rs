// Download activity audit log
//
// One line per completed download:
//   timestamp, user, client-ip, country, original-url, human-size
// The file is capped at a fixed line count; the oldest entries are dropped
// first. Writers serialize behind a mutex since the rewrite is
// read-modify-write.

use std::path::{Path, PathBuf};

use humansize::{format_size, WINDOWS};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{info, warn};

const MAX_LINES: usize = 1000;

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Identity fields attributed to one download.
#[derive(Debug)]
pub struct ActivityRecord<'a> {
    pub user: &'a str,
    pub ip: &'a str,
    pub country: &'a str,
    pub url: &'a str,
    pub size_bytes: u64,
}

pub struct ActivityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, keeping only the newest `MAX_LINES` lines.
    /// Best-effort: logging must never fail a download.
    pub async fn record(&self, record: ActivityRecord<'_>) {
        let timestamp = OffsetDateTime::now_utc()
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_default();
        let size = format_size(record.size_bytes, WINDOWS);
        let line = format!(
            "{}, {}, {}, {}, {}, {}",
            timestamp, record.user, record.ip, record.country, record.url, size
        );

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.append_trimmed(&line).await {
            warn!("failed to write activity log: {}", e);
            return;
        }
        info!(
            "activity logged: {} downloaded {} ({})",
            record.user, record.url, size
        );
    }

    async fn append_trimmed(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existing = tokio::fs::read_to_string(&self.path)
            .await
            .unwrap_or_default();
        let mut lines: Vec<&str> = existing.lines().collect();
        lines.push(line);
        if lines.len() > MAX_LINES {
            lines.drain(..lines.len() - MAX_LINES);
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        tokio::fs::write(&self.path, contents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> ActivityRecord<'_> {
        ActivityRecord {
            user: "someone@example.com",
            ip: "203.0.113.7",
            country: "IL",
            url,
            size_bytes: 3_500_000,
        }
    }

    #[tokio::test]
    async fn test_record_appends_formatted_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("logs/activity.log"));

        log.record(record("https://youtu.be/dQw4w9WgXcQ")).await;

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let line = contents.lines().next().unwrap();
        let fields: Vec<&str> = line.split(", ").collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[1], "someone@example.com");
        assert_eq!(fields[2], "203.0.113.7");
        assert_eq!(fields[3], "IL");
        assert_eq!(fields[4], "https://youtu.be/dQw4w9WgXcQ");
        assert!(fields[5].ends_with("MB"));
    }

    #[tokio::test]
    async fn test_oldest_lines_are_dropped_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.log");

        // Pre-fill to the cap
        let filler: Vec<String> = (0..MAX_LINES).map(|i| format!("old line {}", i)).collect();
        std::fs::write(&path, format!("{}\n", filler.join("\n"))).unwrap();

        let log = ActivityLog::new(path.clone());
        log.record(record("https://vimeo.com/76979871")).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), MAX_LINES);
        // Oldest entry dropped, newest present at the tail
        assert_eq!(lines[0], "old line 1");
        assert!(lines.last().unwrap().contains("vimeo.com"));
    }
}
