//! The reader: read-only access over either a quiescent on-disk index file
//! or a writer's live in-memory buffer.
//!
//! Unlike [`crate::Writer`], a `Reader` keeps no acceleration map of its
//! own — every lookup is a plain linear scan returning the first matching
//! record, since a reader instance is typically short-lived (one
//! diagnostic query, or one startup replay) and not worth the bookkeeping
//! a long-lived writer benefits from.

use anyhow::{Context, Result};
use seqidx_config::SeqIndexConfig;
use seqidx_format::{
    BufferView, SessionRecord, EMPTY_SESSION_ID, MESSAGE_HEADER_SIZE, RECORD_SEQUENCE_NUMBER_OFFSET,
    RECORD_SESSION_ID_OFFSET, RECORD_SIZE,
};
use seqidx_positiontable::PositionTable;
use seqidx_sector::{OutOfSpace, SectorFramer};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::IndexBuffer;

enum Source {
    /// A snapshot read off disk: no concurrent writer can be mutating
    /// these bytes, so plain (non-atomic) reads are sound.
    File {
        bytes: Vec<u8>,
        record_region_len: usize,
        sector_size: u32,
    },
    /// The writer's own buffer, possibly being mutated concurrently.
    /// Record-table reads go through `BufferView`'s acquire loads; see the
    /// module doc on why the position table has no equivalent live path.
    Live { buffer: Arc<IndexBuffer>, sector_size: u32 },
}

/// Read-only view over a Sequence Number Index.
pub struct Reader {
    source: Source,
}

impl Reader {
    /// Opens `index_path` fresh, independent of any writer that may also
    /// have it open. Intended for a quiescent on-disk file; the caller is
    /// responsible for ensuring no writer is concurrently renaming or
    /// truncating the same path.
    pub fn open(index_path: impl AsRef<Path>, config: &SeqIndexConfig) -> Result<Self> {
        let (record_region_len, _position_region_len) = config
            .validate()
            .context("index configuration failed validation")?;

        let bytes = fs::read(index_path.as_ref())
            .with_context(|| format!("reading index file {}", index_path.as_ref().display()))?;
        anyhow::ensure!(
            bytes.len() as u64 == config.file_capacity,
            "index file size {} does not match configured capacity {}",
            bytes.len(),
            config.file_capacity
        );

        Ok(Reader {
            source: Source::File {
                bytes,
                record_region_len: record_region_len as usize,
                sector_size: config.sector_size,
            },
        })
    }

    /// Wraps a writer's live buffer for concurrent read access. Obtain
    /// `buffer` via [`crate::Writer::buffer_handle`].
    #[must_use]
    pub fn from_live_buffer(buffer: Arc<IndexBuffer>, sector_size: u32) -> Self {
        Reader {
            source: Source::Live { buffer, sector_size },
        }
    }

    fn record_framer(&self) -> SectorFramer {
        match &self.source {
            Source::File {
                record_region_len,
                sector_size,
                ..
            } => SectorFramer::new(0, *record_region_len, *sector_size as usize),
            Source::Live { buffer, sector_size } => {
                SectorFramer::new(0, buffer.record_region_len(), *sector_size as usize)
            }
        }
    }

    /// Point lookup: linear scan to the end of the claimable region,
    /// returns the first matching record's sequence number.
    ///
    /// An empty slot is skipped rather than treated as "end of table": a
    /// checksum repair can blank a sector in place without compacting what
    /// follows it, so a gap may have live records beyond it.
    #[must_use]
    pub fn lookup(&self, session_id: u64) -> Option<u32> {
        let framer = self.record_framer();
        let mut cursor = MESSAGE_HEADER_SIZE;
        loop {
            let offset = match framer.claim(cursor, RECORD_SIZE) {
                Ok(offset) => offset,
                Err(OutOfSpace) => return None,
            };

            let (candidate_session, candidate_seq) = self.read_record_at(offset);
            let is_empty = candidate_session == EMPTY_SESSION_ID && candidate_seq == 0;
            if !is_empty && candidate_session == session_id {
                return Some(candidate_seq);
            }
            cursor = offset + RECORD_SIZE;
        }
    }

    /// Finite snapshot of every live record: finite and not restartable
    /// during concurrent mutation, since snapshot semantics require a
    /// prior flush. Collected eagerly into a `Vec` rather than exposed as
    /// a lazy cursor, since a lazy cursor over a buffer the writer may still
    /// be mutating cannot uphold that snapshot guarantee.
    ///
    /// Scans to the end of the claimable region rather than stopping at the
    /// first empty slot, for the same reason as [`Reader::lookup`].
    #[must_use]
    pub fn iter(&self) -> Vec<(u64, u32)> {
        let framer = self.record_framer();
        let mut out = Vec::new();
        let mut cursor = MESSAGE_HEADER_SIZE;
        loop {
            let offset = match framer.claim(cursor, RECORD_SIZE) {
                Ok(offset) => offset,
                Err(OutOfSpace) => break,
            };
            let (session_id, sequence_number) = self.read_record_at(offset);
            if session_id != EMPTY_SESSION_ID || sequence_number != 0 {
                out.push((session_id, sequence_number));
            }
            cursor = offset + RECORD_SIZE;
        }
        out
    }

    fn read_record_at(&self, offset: usize) -> (u64, u32) {
        match &self.source {
            Source::File { bytes, .. } => {
                let record = SessionRecord::read_from(&bytes[offset..offset + RECORD_SIZE]);
                (record.session_id, record.sequence_number)
            }
            Source::Live { buffer, .. } => {
                let view: BufferView = buffer.record_view();
                let session_id = view.load_u64_acquire(offset + RECORD_SESSION_ID_OFFSET);
                let sequence_number = view.load_u32_acquire(offset + RECORD_SEQUENCE_NUMBER_OFFSET);
                (session_id, sequence_number)
            }
        }
    }

    /// Replays the last known archival-log position. Over a live buffer
    /// this is sound only when the writer is quiescent — only the record
    /// table carries a documented concurrent-reader contract — so this
    /// path is intended for startup replay, not steady-state polling.
    pub fn read_last_position(&self, consumer: impl FnMut(i32, i64, i64)) {
        match &self.source {
            Source::File {
                bytes,
                record_region_len,
                sector_size,
            } => {
                let position_region_len = bytes.len() - record_region_len;
                let table = PositionTable::with_sector_size(
                    *record_region_len,
                    position_region_len,
                    *sector_size as usize,
                );
                table.read_last_position(&bytes[*record_region_len..], consumer);
            }
            Source::Live { buffer, sector_size } => {
                let table = PositionTable::with_sector_size(
                    buffer.record_region_len(),
                    buffer.position_region_len(),
                    *sector_size as usize,
                );
                table.read_last_position(buffer.position_region(), consumer);
            }
        }
    }
}
