use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::error::BatchSetupError;
use crate::model::{ChildRecord, RunSummary, TopLevelRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Per-identifier persistence. Each call replaces whatever an earlier call
/// wrote for the same identifier in this run.
pub trait RecordWriter {
    fn write_records(
        &mut self,
        identifier: &str,
        top_level: &[TopLevelRecord],
        children: &[ChildRecord],
    ) -> Result<()>;

    /// Called once after the last identifier.
    fn finish(&mut self, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}

pub trait SummarySink {
    fn write_summary(&mut self, summary: &RunSummary) -> Result<()>;
}

/// Create `dir` if needed and prove we can write into it.
pub fn ensure_writable_dir(dir: &Path) -> Result<(), BatchSetupError> {
    let not_writable = |source| BatchSetupError::OutputNotWritable {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(not_writable)?;
    let probe = dir.join(".write_probe");
    File::create(&probe).map_err(not_writable)?;
    fs::remove_file(&probe).map_err(not_writable)?;
    Ok(())
}

/// Writes `video_{id}_comments.csv` and `video_{id}_replies.csv` into one
/// date-stamped directory.
pub struct CsvWriter {
    dir: PathBuf,
}

impl CsvWriter {
    pub fn new(dir: &Path) -> Result<Self, BatchSetupError> {
        ensure_writable_dir(dir)?;
        Ok(CsvWriter {
            dir: dir.to_path_buf(),
        })
    }

    pub fn comments_path(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("video_{}_comments.csv", file_stem(identifier)))
    }

    pub fn replies_path(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("video_{}_replies.csv", file_stem(identifier)))
    }
}

impl RecordWriter for CsvWriter {
    fn write_records(
        &mut self,
        identifier: &str,
        top_level: &[TopLevelRecord],
        children: &[ChildRecord],
    ) -> Result<()> {
        let comments = self.comments_path(identifier);
        if !top_level.is_empty() {
            write_csv(&comments, top_level)?;
        }

        // Both files or neither: a half-written identifier is reported as failed.
        if let Err(e) = self.write_replies(identifier, children) {
            if !top_level.is_empty() {
                if let Err(rm) = fs::remove_file(&comments) {
                    warn!("Could not remove {:?} after failed write: {}", comments, rm);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

impl CsvWriter {
    fn write_replies(&self, identifier: &str, children: &[ChildRecord]) -> Result<()> {
        let replies = self.replies_path(identifier);
        if children.is_empty() {
            // A rerun with no replies must not leave the previous file behind.
            if replies.exists() {
                fs::remove_file(&replies)
                    .with_context(|| format!("Failed to remove stale {:?}", replies))?;
            }
            Ok(())
        } else {
            write_csv(&replies, children)
        }
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    file.write_all(UTF8_BOM)?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Identifiers end up in file names; keep them from escaping the directory.
fn file_stem(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Overwrites `{log_dir}/{date}_comments.log` with the run totals.
pub struct LogFileSink {
    path: PathBuf,
}

impl LogFileSink {
    pub fn new(path: &Path) -> Self {
        LogFileSink {
            path: path.to_path_buf(),
        }
    }
}

impl SummarySink for LogFileSink {
    fn write_summary(&mut self, summary: &RunSummary) -> Result<()> {
        fs::write(&self.path, render_summary(summary))
            .with_context(|| format!("Failed to write run log {:?}", self.path))
    }
}

pub fn render_summary(summary: &RunSummary) -> String {
    let date = &summary.run_date;
    let mut out = String::new();
    out.push_str(&format!("[{}] comments collected: {}\n", date, summary.total_top_level));
    out.push_str(&format!("[{}] replies collected: {}\n", date, summary.total_child));
    out.push_str(&format!(
        "[{}] videos processed: {} ({} written) in {:.1}s\n",
        date,
        summary.identifiers,
        summary.written,
        summary.elapsed.as_secs_f64()
    ));
    if !summary.failed.is_empty() {
        out.push_str(&format!("[{}] failed videos: {}\n", date, summary.failed.len()));
        for f in &summary.failed {
            out.push_str(&format!(" - {}: {}\n", f.identifier, f.error));
        }
    }
    out
}

/// Replace the run log with a single line when the run could not start.
pub fn write_abort(path: &Path, date: &str, error: &anyhow::Error) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("[{}] run aborted: {:#}\n", date, error))
        .with_context(|| format!("Failed to write run log {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FailedIdentifier;
    use std::time::Duration;

    fn top(id: &str) -> TopLevelRecord {
        TopLevelRecord {
            identifier: "vid".into(),
            record_id: id.into(),
            author: "a".into(),
            author_id: "UCa".into(),
            text: "hello, world".into(),
            like_count: 5,
            published_at: "2025-06-01T00:00:00Z".into(),
            updated_at: "2025-06-01T00:00:00Z".into(),
            child_count: 1,
        }
    }

    fn child(parent: &str, id: &str) -> ChildRecord {
        ChildRecord {
            identifier: "vid".into(),
            parent_record_id: parent.into(),
            child_id: id.into(),
            author: "b".into(),
            author_id: "UCb".into(),
            text: "reply".into(),
            like_count: 0,
            published_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn writes_bom_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path()).unwrap();
        writer
            .write_records("vid", &[top("c1"), top("c2")], &[child("c1", "c1.r1")])
            .unwrap();

        let bytes = std::fs::read(writer.comments_path("vid")).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("video_id,comment_id,author,author_channel_id,text,likeCount,publishedAt,updatedAt,replyCount")
        );
        assert_eq!(
            lines.next(),
            Some("vid,c1,a,UCa,\"hello, world\",5,2025-06-01T00:00:00Z,2025-06-01T00:00:00Z,1")
        );
        assert_eq!(text.lines().count(), 3);

        let replies = std::fs::read(writer.replies_path("vid")).unwrap();
        let replies = String::from_utf8(replies[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(replies.starts_with(
            "video_id,parent_comment_id,reply_id,author,author_channel_id,text,likeCount,publishedAt,updatedAt"
        ));
    }

    #[test]
    fn no_replies_file_without_replies() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path()).unwrap();
        writer.write_records("vid", &[top("c1")], &[child("c1", "r")]).unwrap();
        assert!(writer.replies_path("vid").exists());

        writer.write_records("vid", &[top("c1")], &[]).unwrap();
        assert!(writer.comments_path("vid").exists());
        assert!(!writer.replies_path("vid").exists());
    }

    #[test]
    fn failed_replies_write_leaves_no_comments_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path()).unwrap();
        // A directory squatting on the replies path makes File::create fail.
        std::fs::create_dir(writer.replies_path("vid")).unwrap();

        let err = writer
            .write_records("vid", &[top("c1")], &[child("c1", "c1.r1")])
            .unwrap_err();
        assert!(err.to_string().contains("Failed to create"));
        assert!(!writer.comments_path("vid").exists());
    }

    #[test]
    fn identifier_cannot_escape_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvWriter::new(dir.path()).unwrap();
        let path = writer.comments_path("../../etc/x");
        assert_eq!(path.parent(), Some(dir.path()));
    }

    #[test]
    fn unwritable_dir_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, "x").unwrap();
        let err = CsvWriter::new(&file.join("sub")).err().unwrap();
        assert!(matches!(err, BatchSetupError::OutputNotWritable { .. }));
    }

    #[test]
    fn summary_lists_failures() {
        let summary = RunSummary {
            run_date: "20250601".into(),
            identifiers: 3,
            written: 2,
            total_top_level: 150,
            total_child: 12,
            failed: vec![FailedIdentifier {
                identifier: "b".into(),
                error: "HTTP 403: quotaExceeded".into(),
            }],
            elapsed: Duration::from_millis(2500),
        };
        let text = render_summary(&summary);
        assert!(text.contains("[20250601] comments collected: 150\n"));
        assert!(text.contains("[20250601] replies collected: 12\n"));
        assert!(text.contains("[20250601] failed videos: 1\n"));
        assert!(text.contains(" - b: HTTP 403: quotaExceeded\n"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20250601_comments.log");
        LogFileSink::new(&path).write_summary(&summary).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn abort_overwrites_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log").join("20250601_comments.log");
        write_abort(&path, "20250601", &anyhow::anyhow!("trending file missing")).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[20250601] run aborted: trending file missing\n"
        );
    }
}
