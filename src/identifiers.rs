use std::collections::HashSet;
use std::path::Path;

use crate::error::BatchSetupError;

const ID_COLUMN: &str = "video_id";

/// Read video ids from the trending CSV's `video_id` column. Blank cells are
/// dropped and repeats keep their first position.
pub fn read_trending_csv(path: &Path) -> Result<Vec<String>, BatchSetupError> {
    if !path.exists() {
        return Err(BatchSetupError::MissingSource(path.to_path_buf()));
    }
    let unreadable = |e: csv::Error| BatchSetupError::UnreadableSource {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;
    let column = reader
        .headers()
        .map_err(unreadable)?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == ID_COLUMN)
        .ok_or_else(|| BatchSetupError::MissingColumn(path.to_path_buf()))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.map_err(unreadable)?;
        if let Some(id) = record.get(column) {
            ids.push(id.to_string());
        }
    }
    Ok(dedupe(ids))
}

/// Trim ids and drop blanks and repeats, keeping first positions.
pub fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_video_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "20250601.csv",
            "\u{feff}rank,video_id,title\n1,abc123,\"Hello, world\"\n2,,blank\n3,def456,x\n4,abc123,dup\n",
        );
        assert_eq!(read_trending_csv(&path).unwrap(), vec!["abc123", "def456"]);
    }

    #[test]
    fn missing_file_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_trending_csv(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, BatchSetupError::MissingSource(_)));
    }

    #[test]
    fn missing_column_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "t.csv", "id,title\nabc,x\n");
        let err = read_trending_csv(&path).unwrap_err();
        assert!(matches!(err, BatchSetupError::MissingColumn(_)));
    }

    #[test]
    fn dedupe_trims_and_keeps_order() {
        let ids = vec![" b ".to_string(), "a".into(), "".into(), "b".into()];
        assert_eq!(dedupe(ids), vec!["b", "a"]);
    }
}
