use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::types::ChunkRecord;

/// Position in the ordered corpus stream: file index (sorted by name) and
/// record index within that file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct CorpusCursor {
    pub file_index: usize,
    pub record_index: usize,
}

/// All `*.jsonl` files under `root`, sorted by path.
pub fn list_corpus_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    files
}

/// Parse one corpus file. Blank lines are ignored, malformed lines skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<ChunkRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(line) {
            Ok(mut rec) => {
                rec.ensure_id();
                out.push(rec);
            }
            Err(e) => warn!(file = %path.display(), line = line_no + 1, error = %e, "skipping malformed record"),
        }
    }
    debug!(file = %path.display(), records = out.len(), "read corpus file");
    Ok(out)
}

/// Records of `files` from `start` on, each tagged with its cursor.
///
/// Files are read lazily one at a time; an unreadable file ends the stream
/// with its error.
pub fn iter_corpus(
    files: &[PathBuf],
    start: CorpusCursor,
) -> impl Iterator<Item = Result<(CorpusCursor, ChunkRecord)>> + '_ {
    files
        .iter()
        .enumerate()
        .skip(start.file_index)
        .flat_map(move |(file_index, path)| {
            let skip = if file_index == start.file_index { start.record_index } else { 0 };
            let batch: Vec<Result<(CorpusCursor, ChunkRecord)>> = match read_records(path) {
                Ok(records) => records
                    .into_iter()
                    .enumerate()
                    .skip(skip)
                    .map(|(record_index, rec)| Ok((CorpusCursor { file_index, record_index }, rec)))
                    .collect(),
                Err(e) => vec![Err(e)],
            };
            batch
        })
}
