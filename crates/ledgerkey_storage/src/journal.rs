//! Checksummed, append-only journal of opaque frames.
//!
//! Frame layout (little endian):
//!
//! ```text
//! +-------+--------+-----------------+--------+
//! | magic | length | payload         | crc32  |
//! | 4     | 4      | length bytes    | 4      |
//! +-------+--------+-----------------+--------+
//! ```
//!
//! The CRC covers magic, length and payload.
//!
//! Frames are written in batches. Every batch ends with a commit marker
//! holding the number of frames it seals:
//!
//! ```text
//! +-------+--------+--------+
//! | magic | count  | crc32  |
//! | 4     | 4      | 4      |
//! +-------+--------+--------+
//! ```
//!
//! Only sealed batches are read back. Frames after the last commit marker
//! belong to a write that never finished and count as the torn tail, as does
//! a frame cut short or failing its checksum at the very end of the journal.
//! The same failures anywhere earlier are corruption.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use tracing::{debug, error, warn};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"LKJ1";

/// Magic bytes opening a commit marker.
pub const COMMIT_MAGIC: [u8; 4] = *b"LKC1";

/// magic (4) + length (4).
pub const FRAME_HEADER_SIZE: usize = 8;

/// magic (4) + frame count (4) + crc32 (4).
pub const COMMIT_MARKER_SIZE: usize = 12;

/// Trailing checksum size.
pub const FRAME_CRC_SIZE: usize = 4;

/// Largest payload a single frame may carry.
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024 * 1024;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalFrame {
    /// Offset of the frame header.
    pub offset: u64,
    /// Frame payload.
    pub payload: Vec<u8>,
}

/// Result of scanning a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalScan {
    /// Every frame of a sealed batch, in write order.
    pub frames: Vec<JournalFrame>,
    /// Number of sealed batches.
    pub batches: usize,
    /// Length of the sealed prefix.
    pub valid_len: u64,
    /// Bytes after the sealed prefix (a torn or unsealed final write).
    pub torn_bytes: u64,
    /// Intact frames in the torn tail that no commit marker seals.
    pub unsealed_frames: usize,
}

/// Encodes one payload into a complete frame.
///
/// # Errors
///
/// Returns [`StorageError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_PAYLOAD`].
pub fn encode_frame(payload: &[u8]) -> StorageResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(StorageError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + FRAME_CRC_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Encodes the commit marker sealing a batch of `count` frames.
#[must_use]
pub fn encode_commit(count: u32) -> [u8; COMMIT_MARKER_SIZE] {
    let mut marker = [0u8; COMMIT_MARKER_SIZE];
    marker[..4].copy_from_slice(&COMMIT_MAGIC);
    marker[4..8].copy_from_slice(&count.to_le_bytes());
    let crc = crc32fast::hash(&marker[..8]);
    marker[8..].copy_from_slice(&crc.to_le_bytes());
    marker
}

/// An append-only journal over a [`StorageBackend`].
///
/// A batch that fails to append or sync is truncated away again. If the
/// truncation cannot be synced either, the journal is poisoned and refuses
/// further appends until it is reopened.
pub struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_append: bool,
    poisoned: bool,
}

impl Journal {
    /// Wraps a backend. With `sync_on_append`, every append is synced
    /// before it returns.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_append: bool) -> Self {
        Self {
            backend,
            sync_on_append,
            poisoned: false,
        }
    }

    /// Appends one payload as a batch of its own and returns the frame
    /// offset.
    ///
    /// # Errors
    ///
    /// Same as [`Journal::append_batch`].
    pub fn append(&mut self, payload: &[u8]) -> StorageResult<u64> {
        self.append_batch(&[payload.to_vec()])
    }

    /// Appends several payloads and their commit marker as one write
    /// followed by at most one sync. Replay sees either all of them or none.
    ///
    /// Returns the offset of the first frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is empty, a payload is too large or the
    /// journal is poisoned (nothing is written in those cases), or if the
    /// write or sync fails. A failed write leaves the journal as it was.
    pub fn append_batch(&mut self, payloads: &[Vec<u8>]) -> StorageResult<u64> {
        if self.poisoned {
            return Err(StorageError::Poisoned);
        }
        let count = u32::try_from(payloads.len())
            .ok()
            .filter(|&count| count > 0)
            .ok_or(StorageError::EmptyBatch)?;
        let mut buffer = Vec::new();
        for payload in payloads {
            buffer.extend_from_slice(&encode_frame(payload)?);
        }
        buffer.extend_from_slice(&encode_commit(count));

        let start = self.backend.size()?;
        let written = self.backend.append(&buffer).and_then(|offset| {
            if self.sync_on_append {
                self.backend.sync()?;
            }
            Ok(offset)
        });
        written.inspect_err(|err| self.roll_back(start, err))
    }

    fn roll_back(&mut self, start: u64, cause: &StorageError) {
        let undone = self
            .backend
            .truncate(start)
            .and_then(|()| self.backend.sync());
        match undone {
            Ok(()) => warn!(offset = start, error = %cause, "journal append rolled back"),
            Err(err) => {
                self.poisoned = true;
                error!(offset = start, error = %cause, rollback = %err, "journal poisoned");
            }
        }
    }

    /// Whether a failed append could not be rolled back durably.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Reads every frame of a sealed batch without modifying the journal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if a frame before the tail is
    /// damaged, or a backend error.
    pub fn scan(&self) -> StorageResult<JournalScan> {
        let size = self.backend.size()?;
        let mut offset = 0u64;
        let mut frames = Vec::new();
        let mut unsealed = Vec::new();
        let mut batches = 0;
        let mut valid_len = 0u64;

        while offset < size {
            let remaining = size - offset;
            if remaining < FRAME_HEADER_SIZE as u64 {
                break;
            }

            let header = self.backend.read_at(offset, FRAME_HEADER_SIZE)?;
            let word = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if header[..4] == COMMIT_MAGIC {
                if remaining < COMMIT_MARKER_SIZE as u64 {
                    break;
                }
                let marker = self.backend.read_at(offset, COMMIT_MARKER_SIZE)?;
                let stored = u32::from_le_bytes([marker[8], marker[9], marker[10], marker[11]]);
                if crc32fast::hash(&marker[..8]) != stored {
                    if offset + COMMIT_MARKER_SIZE as u64 == size {
                        break;
                    }
                    return Err(StorageError::corrupted(offset, "commit marker checksum mismatch"));
                }
                if word as usize != unsealed.len() {
                    return Err(StorageError::corrupted(
                        offset,
                        format!("commit marker seals {word} frames, batch has {}", unsealed.len()),
                    ));
                }
                frames.append(&mut unsealed);
                batches += 1;
                offset += COMMIT_MARKER_SIZE as u64;
                valid_len = offset;
                continue;
            }

            if header[..4] != FRAME_MAGIC {
                return Err(StorageError::corrupted(offset, "bad frame magic"));
            }
            let len = word as usize;
            if len > MAX_FRAME_PAYLOAD {
                return Err(StorageError::corrupted(
                    offset,
                    format!("frame length {len} exceeds limit"),
                ));
            }

            let frame_len = (FRAME_HEADER_SIZE + len + FRAME_CRC_SIZE) as u64;
            if remaining < frame_len {
                break;
            }

            let frame = self.backend.read_at(offset, frame_len as usize)?;
            let body_end = FRAME_HEADER_SIZE + len;
            let stored = u32::from_le_bytes([
                frame[body_end],
                frame[body_end + 1],
                frame[body_end + 2],
                frame[body_end + 3],
            ]);
            if crc32fast::hash(&frame[..body_end]) != stored {
                if offset + frame_len == size {
                    break;
                }
                return Err(StorageError::corrupted(offset, "checksum mismatch"));
            }

            unsealed.push(JournalFrame {
                offset,
                payload: frame[FRAME_HEADER_SIZE..body_end].to_vec(),
            });
            offset += frame_len;
        }

        Ok(JournalScan {
            frames,
            batches,
            valid_len,
            torn_bytes: size - valid_len,
            unsealed_frames: unsealed.len(),
        })
    }

    /// Scans the journal and truncates a torn tail, returning the intact
    /// frames.
    ///
    /// # Errors
    ///
    /// Same as [`Journal::scan`], plus truncation failures.
    pub fn recover(&mut self) -> StorageResult<Vec<JournalFrame>> {
        let scan = self.scan()?;
        if scan.torn_bytes > 0 {
            warn!(
                valid_len = scan.valid_len,
                torn_bytes = scan.torn_bytes,
                unsealed_frames = scan.unsealed_frames,
                "truncating torn journal tail"
            );
            self.backend.truncate(scan.valid_len)?;
            self.backend.sync()?;
        }
        debug!(
            frames = scan.frames.len(),
            batches = scan.batches,
            "journal recovered"
        );
        Ok(scan.frames)
    }

    /// Returns the journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the size cannot be read.
    pub fn len(&self) -> StorageResult<u64> {
        self.backend.size()
    }

    /// Returns true if nothing has been written.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the size cannot be read.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Forces everything appended so far to durable storage.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the sync fails.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.backend.sync()
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_append", &self.sync_on_append)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use proptest::prelude::*;

    fn journal_over(backend: &InMemoryBackend) -> Journal {
        Journal::new(Box::new(backend.clone()), false)
    }

    /// Shares a buffer like [`InMemoryBackend`] but can fail syncs and
    /// truncations.
    struct FaultyBackend {
        inner: InMemoryBackend,
        failing_syncs: u32,
        fail_truncate: bool,
    }

    impl FaultyBackend {
        fn over(inner: &InMemoryBackend) -> Self {
            Self {
                inner: inner.clone(),
                failing_syncs: 0,
                fail_truncate: false,
            }
        }
    }

    impl StorageBackend for FaultyBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            if self.failing_syncs > 0 {
                self.failing_syncs -= 1;
                return Err(std::io::Error::other("sync failed").into());
            }
            self.inner.sync()
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            if self.fail_truncate {
                return Err(std::io::Error::other("truncate failed").into());
            }
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn frames_come_back_in_order() {
        let backend = InMemoryBackend::new();
        let mut journal = journal_over(&backend);
        journal.append(b"one").unwrap();
        journal.append_batch(&[b"two".to_vec(), b"three".to_vec()]).unwrap();

        let scan = journal.scan().unwrap();
        let payloads: Vec<_> = scan.frames.iter().map(|f| f.payload.clone()).collect();
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(scan.torn_bytes, 0);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let backend = InMemoryBackend::new();
        let mut journal = journal_over(&backend);
        journal.append(b"kept").unwrap();
        let intact = backend.data().len();

        // Half of a second frame.
        let frame = encode_frame(b"lost in the crash").unwrap();
        let mut raw = backend.clone();
        raw.append(&frame[..frame.len() / 2]).unwrap();

        let mut reopened = journal_over(&backend);
        let frames = reopened.recover().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(backend.data().len(), intact);
    }

    #[test]
    fn bad_checksum_on_last_frame_is_torn() {
        let backend = InMemoryBackend::new();
        let mut journal = journal_over(&backend);
        journal.append(b"first").unwrap();
        journal.append(b"second").unwrap();
        let last = backend.data().len() - 1;
        backend.corrupt_byte(last, 0xFF ^ backend.data()[last]);

        let scan = journal.scan().unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert!(scan.torn_bytes > 0);
    }

    #[test]
    fn bad_checksum_mid_journal_is_corruption() {
        let backend = InMemoryBackend::new();
        let mut journal = journal_over(&backend);
        journal.append(b"first").unwrap();
        journal.append(b"second").unwrap();
        // Flip a payload byte of the first frame.
        backend.corrupt_byte(FRAME_HEADER_SIZE, b'F');

        assert!(matches!(
            journal.scan(),
            Err(StorageError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let backend = InMemoryBackend::with_data(b"XXXX\0\0\0\0\0\0\0\0".to_vec());
        let journal = journal_over(&backend);
        assert!(matches!(
            journal.scan(),
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn unsealed_batch_is_dropped_whole() {
        let backend = InMemoryBackend::new();
        let mut journal = journal_over(&backend);
        journal.append(b"sealed").unwrap();
        let sealed_len = backend.data().len();
        journal
            .append_batch(&[b"first half".to_vec(), b"second half".to_vec()])
            .unwrap();

        // Lose the commit marker; both frames of the batch are still intact.
        let mut raw = backend.clone();
        raw.truncate((backend.data().len() - COMMIT_MARKER_SIZE) as u64)
            .unwrap();

        let scan = journal.scan().unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert_eq!(scan.batches, 1);
        assert_eq!(scan.unsealed_frames, 2);
        assert_eq!(scan.valid_len, sealed_len as u64);

        let frames = journal.recover().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(backend.data().len(), sealed_len);
    }

    #[test]
    fn commit_marker_must_match_its_batch() {
        let backend = InMemoryBackend::new();
        let mut raw = backend.clone();
        raw.append(&encode_frame(b"only one").unwrap()).unwrap();
        raw.append(&encode_commit(2)).unwrap();
        raw.append(&encode_frame(b"after").unwrap()).unwrap();

        assert!(matches!(
            journal_over(&backend).scan(),
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let backend = InMemoryBackend::new();
        let mut journal = journal_over(&backend);
        assert!(matches!(
            journal.append_batch(&[]),
            Err(StorageError::EmptyBatch)
        ));
        assert!(backend.data().is_empty());
    }

    #[test]
    fn failed_sync_rolls_the_batch_back() {
        let backend = InMemoryBackend::new();
        let mut journal = Journal::new(Box::new(FaultyBackend::over(&backend)), true);
        journal.append(b"kept").unwrap();
        let kept_len = backend.data().len();

        let mut failing = FaultyBackend::over(&backend);
        failing.failing_syncs = 1;
        let mut journal = Journal::new(Box::new(failing), true);
        assert!(matches!(journal.append(b"lost"), Err(StorageError::Io(_))));
        assert!(!journal.is_poisoned());
        assert_eq!(backend.data().len(), kept_len);

        journal.append(b"next").unwrap();
        let scan = journal_over(&backend).scan().unwrap();
        let payloads: Vec<_> = scan.frames.into_iter().map(|f| f.payload).collect();
        assert_eq!(payloads, vec![b"kept".to_vec(), b"next".to_vec()]);
    }

    #[test]
    fn unconfirmed_rollback_poisons() {
        let backend = InMemoryBackend::new();
        let mut failing = FaultyBackend::over(&backend);
        failing.failing_syncs = 2;
        let mut journal = Journal::new(Box::new(failing), true);

        assert!(journal.append(b"lost").is_err());
        assert!(journal.is_poisoned());
        assert!(matches!(journal.append(b"more"), Err(StorageError::Poisoned)));
        assert!(backend.data().is_empty());
    }

    #[test]
    fn failed_truncate_poisons() {
        let backend = InMemoryBackend::new();
        let mut failing = FaultyBackend::over(&backend);
        failing.failing_syncs = 1;
        failing.fail_truncate = true;
        let mut journal = Journal::new(Box::new(failing), true);

        assert!(journal.append(b"lost").is_err());
        assert!(journal.is_poisoned());
        // The batch is still sealed on disk; reopening replays it.
        assert_eq!(journal_over(&backend).scan().unwrap().frames.len(), 1);
    }

    proptest! {
        #[test]
        fn any_payloads_survive_a_scan(payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)) {
            let backend = InMemoryBackend::new();
            let mut journal = journal_over(&backend);
            for payload in &payloads {
                journal.append(payload).unwrap();
            }
            let scan = journal.scan().unwrap();
            let read: Vec<Vec<u8>> = scan.frames.into_iter().map(|f| f.payload).collect();
            prop_assert_eq!(read, payloads);
        }
    }
}
