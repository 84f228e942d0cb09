//! Verify command implementation.

use super::{load, CommandError};
use ledgerkey_core::audit::{verify_entries, VerifyReport};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of sealed frames.
    pub frames_checked: usize,
    /// Bytes after the last sealed batch.
    pub torn_bytes: u64,
    /// Intact frames in the torn tail, dropped on replay.
    pub unsealed_frames: usize,
    /// Frames that did not decode, with the reason.
    pub undecodable: Vec<(u64, String)>,
    /// Ledger continuity report over the decoded entries.
    pub report: VerifyReport,
}

impl VerifyResult {
    /// Number of problems found.
    pub fn issue_count(&self) -> usize {
        usize::from(self.torn_bytes > 0) + self.undecodable.len() + self.report.issues.len()
    }

    fn is_ok(&self) -> bool {
        self.issue_count() == 0
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying ledger journal {}", path.display());
    println!();

    let result = verify(path)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Ledger verification passed");
        Ok(())
    } else {
        println!("✗ Ledger verification failed");
        Err(CommandError::VerificationFailed(result.issue_count()).into())
    }
}

/// Checks frame checksums, decoding and per-key revision continuity.
///
/// A checksum mismatch before the final frame is returned as an error.
pub fn verify(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let contents = load(path)?;
    let undecodable = contents
        .frames
        .iter()
        .filter_map(|frame| {
            frame
                .entry
                .as_ref()
                .err()
                .map(|err| (frame.offset, err.to_string()))
        })
        .collect();
    let entries: Vec<_> = contents.entries().cloned().collect();

    Ok(VerifyResult {
        frames_checked: contents.frames.len(),
        torn_bytes: contents.torn_bytes,
        unsealed_frames: contents.unsealed_frames,
        undecodable,
        report: verify_entries(&entries),
    })
}

fn print_result(result: &VerifyResult) {
    println!("  Frames checked: {}", result.frames_checked);
    println!("  Entries verified: {}", result.report.entries);
    println!("  Live keys: {}", result.report.live);
    if result.torn_bytes > 0 {
        println!(
            "  Torn tail: {} bytes ({} unsealed frames)",
            result.torn_bytes, result.unsealed_frames
        );
    }
    for (offset, error) in &result.undecodable {
        println!("    - [{offset:08}] undecodable: {error}");
    }
    for issue in &result.report.issues {
        println!("    - {issue}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_journal;
    use ledgerkey_storage::{FileBackend, StorageBackend, COMMIT_MARKER_SIZE};

    #[test]
    fn clean_journal_passes() {
        let journal = test_journal::sample();
        let result = verify(journal.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.report.entries, 4);
        assert_eq!(result.report.live, 1);
    }

    #[test]
    fn torn_tail_is_an_issue() {
        let journal = test_journal::sample();
        {
            let mut backend = FileBackend::open(journal.path()).unwrap();
            backend.append(b"LKJ1").unwrap();
        }
        let result = verify(journal.path()).unwrap();
        assert_eq!(result.torn_bytes, 4);
        assert_eq!(result.issue_count(), 1);
        assert!(run(journal.path()).is_err());
    }

    #[test]
    fn unsealed_write_is_an_issue() {
        let journal = test_journal::sample();
        {
            let mut backend = FileBackend::open(journal.path()).unwrap();
            let size = backend.size().unwrap();
            backend.truncate(size - COMMIT_MARKER_SIZE as u64).unwrap();
        }
        let result = verify(journal.path()).unwrap();
        assert_eq!(result.frames_checked, 3);
        assert_eq!(result.unsealed_frames, 1);
        assert_eq!(result.issue_count(), 1);
        // Without the final delete, both hosts are live.
        assert_eq!(result.report.live, 2);
    }
}
