//! Append-only JSON Lines logs of produced clips and fetched posts.
//!
//! Each run appends one line per record as soon as it exists, so an
//! interrupted run keeps everything written so far. Upload state is tracked by
//! appending a newer copy of a clip record; the latest line for a
//! `file_path` wins.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::reddit::Post;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record log I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line} of the record log is not a valid record: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no clip recorded for {0}")]
    UnknownClip(String),
}

pub type RecordResult<T> = Result<T, RecordError>;

/// One rendered clip part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    /// 1-based part number.
    pub part: usize,
    pub file_path: String,
    #[serde(default)]
    pub uploaded: bool,
}

/// One fetched subreddit post and where its media was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(flatten)]
    pub post: Post,
    pub category: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// A JSON Lines file of `T` records.
#[derive(Debug, Clone)]
pub struct RecordLog<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordLog<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize> RecordLog<T> {
    /// Appends one record and flushes it to disk.
    pub fn append(&self, record: &T) -> RecordResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl<T: DeserializeOwned> RecordLog<T> {
    /// Every record in file order. A missing file is an empty log.
    pub fn read_all(&self) -> RecordResult<Vec<T>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| RecordError::Json { line: idx + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Latest record per file path, in first-seen order.
fn latest_clips(log: &RecordLog<ClipRecord>) -> RecordResult<Vec<ClipRecord>> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, ClipRecord> = HashMap::new();
    for record in log.read_all()? {
        if !latest.contains_key(&record.file_path) {
            order.push(record.file_path.clone());
        }
        latest.insert(record.file_path.clone(), record);
    }
    Ok(order.into_iter().filter_map(|path| latest.remove(&path)).collect())
}

/// Clips not yet uploaded.
pub fn pending(log: &RecordLog<ClipRecord>) -> RecordResult<Vec<ClipRecord>> {
    Ok(latest_clips(log)?.into_iter().filter(|c| !c.uploaded).collect())
}

/// Records the clip at `file_path` as uploaded.
pub fn mark_uploaded(log: &RecordLog<ClipRecord>, file_path: &str) -> RecordResult<ClipRecord> {
    let mut record = latest_clips(log)?
        .into_iter()
        .find(|c| c.file_path == file_path)
        .ok_or_else(|| RecordError::UnknownClip(file_path.to_string()))?;
    record.uploaded = true;
    log.append(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(part: usize) -> ClipRecord {
        ClipRecord {
            id: "abc".into(),
            title: "Title".into(),
            description: format!("Part {}/2 of Title", part),
            part,
            file_path: format!("out/abc+{}.mp4", part - 1),
            uploaded: false,
        }
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log: RecordLog<ClipRecord> = RecordLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::new(dir.path().join("nested/clips.jsonl"));
        log.append(&clip(1)).unwrap();
        log.append(&clip(2)).unwrap();
        assert_eq!(log.read_all().unwrap(), vec![clip(1), clip(2)]);
    }

    #[test]
    fn test_upload_queue() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::new(dir.path().join("clips.jsonl"));
        log.append(&clip(1)).unwrap();
        log.append(&clip(2)).unwrap();

        let marked = mark_uploaded(&log, "out/abc+0.mp4").unwrap();
        assert!(marked.uploaded);
        assert_eq!(pending(&log).unwrap(), vec![clip(2)]);
        assert_eq!(log.read_all().unwrap().len(), 3);

        assert!(matches!(mark_uploaded(&log, "missing.mp4"), Err(RecordError::UnknownClip(_))));
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips.jsonl");
        let log = RecordLog::new(&path);
        log.append(&clip(1)).unwrap();
        fs::write(&path, format!("{}\n\nnot json\n", serde_json::to_string(&clip(1)).unwrap())).unwrap();
        match log.read_all() {
            Err(RecordError::Json { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_post_record_is_flat() {
        let record = PostRecord {
            post: Post {
                id: "p1".into(),
                subreddit: "memes".into(),
                url: "https://i.redd.it/a.png".into(),
                ..Post::default()
            },
            category: "hot".into(),
            file_path: None,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["category"], "hot");
        let back: PostRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
