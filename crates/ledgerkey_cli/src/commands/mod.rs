//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use ledgerkey_core::audit::{decode_raw, EncodedEntry};
use ledgerkey_core::CodecError;
use ledgerkey_storage::{FileBackend, Journal, StorageBackend};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Command failures that are not library errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The journal file does not exist.
    #[error("journal not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The output format is not `text` or `json`.
    #[error("unknown output format `{0}` (expected text or json)")]
    UnknownFormat(String),

    /// Verification found problems.
    #[error("verification failed with {0} issue(s)")]
    VerificationFailed(usize),
}

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(format: &str) -> Result<Self, CommandError> {
        match format {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CommandError::UnknownFormat(other.to_string())),
        }
    }
}

/// One frame of a journal, decoded without knowing its family.
#[derive(Debug)]
pub struct DecodedFrame {
    /// Frame offset in the file.
    pub offset: u64,
    /// The entry, or why it could not be decoded.
    pub entry: Result<EncodedEntry, CodecError>,
}

/// Everything read from a journal file.
#[derive(Debug)]
pub struct JournalContents {
    /// File size in bytes.
    pub size: u64,
    /// Number of sealed batches.
    pub batches: usize,
    /// Bytes after the last sealed batch.
    pub torn_bytes: u64,
    /// Intact frames in the torn tail that no commit marker seals.
    pub unsealed_frames: usize,
    /// Frames of sealed batches in file order.
    pub frames: Vec<DecodedFrame>,
}

impl JournalContents {
    /// Successfully decoded entries in journal order.
    pub fn entries(&self) -> impl Iterator<Item = &EncodedEntry> {
        self.frames.iter().filter_map(|frame| frame.entry.as_ref().ok())
    }
}

/// Reads and decodes every sealed frame of a journal file. The file is not
/// modified; a torn tail is reported, not truncated.
pub fn load(path: &Path) -> Result<JournalContents, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CommandError::NotFound(path.to_path_buf()).into());
    }

    let backend = FileBackend::open(path)?;
    let size = backend.size()?;
    let scan = Journal::new(Box::new(backend), false).scan()?;
    debug!(
        path = %path.display(),
        frames = scan.frames.len(),
        batches = scan.batches,
        torn_bytes = scan.torn_bytes,
        "journal scanned"
    );

    let frames = scan
        .frames
        .into_iter()
        .map(|frame| DecodedFrame {
            offset: frame.offset,
            entry: decode_raw(&frame.payload),
        })
        .collect();

    Ok(JournalContents {
        size,
        batches: scan.batches,
        torn_bytes: scan.torn_bytes,
        unsealed_frames: scan.unsealed_frames,
        frames,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse() {
        assert_eq!(Format::parse("json").unwrap(), Format::Json);
        assert!(matches!(
            Format::parse("yaml"),
            Err(CommandError::UnknownFormat(_))
        ));
    }

    #[test]
    fn missing_journal_is_reported() {
        let err = load(Path::new("/nonexistent/ledger.lkj")).unwrap_err();
        assert!(err.to_string().contains("journal not found"));
    }

    #[test]
    fn sample_journal_loads() {
        let journal = test_journal::sample();
        let contents = load(journal.path()).unwrap();
        assert_eq!(contents.frames.len(), 4);
        assert_eq!(contents.batches, 4);
        assert_eq!(contents.torn_bytes, 0);
        assert_eq!(contents.entries().count(), 4);
    }
}
