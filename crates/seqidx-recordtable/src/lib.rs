//! # seqidx-recordtable — the Record Table (`session_id -> sequence_number`)
//!
//! Owned and mutated exclusively by the single writer thread. Provides
//! amortised O(1) `set`/`get` via a volatile acceleration map, falling back
//! to a linear scan of the framed record region on a cache miss.
//!
//! Concurrent readers on other threads never touch this struct. They read
//! the same underlying bytes through a `BufferView` directly (see
//! `seqidx-engine::Reader`), relying on the release/acquire discipline
//! this module upholds when it writes `session_id` and `sequence_number`.

use seqidx_format::{
    BufferView, ErrorSink, IndexError, SessionRecord, MESSAGE_HEADER_SIZE,
    RECORD_SEQUENCE_NUMBER_OFFSET, RECORD_SESSION_ID_OFFSET, RECORD_SIZE,
};
use seqidx_sector::{OutOfSpace, SectorFramer};
use std::collections::HashMap;

/// The record table. Holds no bytes itself — every operation takes the
/// `BufferView` over the record region for the call, so the table can be
/// rebuilt around a freshly recovered buffer without re-allocating its
/// acceleration map's backing storage unnecessarily.
pub struct RecordTable {
    framer: SectorFramer,
    /// `session_id -> slot offset`, relative to the record region's start.
    /// Empty after construction; populated lazily as lookups and sets fall
    /// through to a linear scan, rather than rebuilt eagerly on load.
    accel: HashMap<u64, usize>,
}

impl RecordTable {
    #[must_use]
    pub fn new(region_len: usize) -> Self {
        RecordTable {
            framer: SectorFramer::with_default_sector_size(0, region_len),
            accel: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_sector_size(region_len: usize, sector_size: usize) -> Self {
        RecordTable {
            framer: SectorFramer::new(0, region_len, sector_size),
            accel: HashMap::new(),
        }
    }

    /// Sets `session_id`'s sequence number, updating in place if a record
    /// already exists (whether known to the acceleration map or found by
    /// scan) and installing a new record otherwise. Reports
    /// [`IndexError::IndexFull`] and drops the update if the table has no
    /// room left.
    pub fn set(&mut self, view: BufferView, session_id: u64, sequence_number: u32, sink: &dyn ErrorSink) {
        if let Some(&offset) = self.accel.get(&session_id) {
            view.store_u32_release(offset + RECORD_SEQUENCE_NUMBER_OFFSET, sequence_number);
            self.framer.mark_dirty(offset);
            return;
        }

        let mut cursor = MESSAGE_HEADER_SIZE;
        loop {
            let offset = match self.framer.claim(cursor, RECORD_SIZE) {
                Ok(offset) => offset,
                Err(OutOfSpace) => {
                    sink.on_error(IndexError::IndexFull { session_id });
                    return;
                }
            };

            let existing = SessionRecord::read_from(&view.as_slice()[offset..offset + RECORD_SIZE]);
            if existing.is_empty_slot() {
                // New record: publish session_id first, then the sequence
                // number, both with release semantics.
                view.store_u64_release(offset + RECORD_SESSION_ID_OFFSET, session_id);
                view.store_u32_release(offset + RECORD_SEQUENCE_NUMBER_OFFSET, sequence_number);
                self.framer.mark_dirty(offset);
                self.accel.insert(session_id, offset);
                return;
            }
            if existing.session_id == session_id {
                view.store_u32_release(offset + RECORD_SEQUENCE_NUMBER_OFFSET, sequence_number);
                self.framer.mark_dirty(offset);
                self.accel.insert(session_id, offset);
                return;
            }
            cursor = offset + RECORD_SIZE;
        }
    }

    /// Point lookup. Consults the acceleration map first; on a miss, scans
    /// linearly to the end of the claimable region and populates the map
    /// once the record is found.
    ///
    /// An empty slot is skipped rather than treated as "end of table": a
    /// checksum repair (`validate_and_repair`) can blank a sector in place
    /// without compacting what follows it, leaving a gap with live records
    /// beyond it.
    #[must_use]
    pub fn get(&mut self, view: BufferView, session_id: u64) -> Option<u32> {
        if let Some(&offset) = self.accel.get(&session_id) {
            return Some(view.load_u32_acquire(offset + RECORD_SEQUENCE_NUMBER_OFFSET));
        }

        let mut cursor = MESSAGE_HEADER_SIZE;
        loop {
            let offset = match self.framer.claim(cursor, RECORD_SIZE) {
                Ok(offset) => offset,
                Err(OutOfSpace) => return None,
            };
            let record = SessionRecord::read_from(&view.as_slice()[offset..offset + RECORD_SIZE]);
            if !record.is_empty_slot() && record.session_id == session_id {
                self.accel.insert(session_id, offset);
                return Some(record.sequence_number);
            }
            cursor = offset + RECORD_SIZE;
        }
    }

    /// Zeroes the entire record region and clears the acceleration map.
    /// Checksums are re-established on the next `update_checksums` call.
    pub fn reset_all(&mut self, view: BufferView) {
        view.as_mut_slice()[MESSAGE_HEADER_SIZE..].fill(0);
        self.accel.clear();
        let sector_size = self.framer.sector_size();
        for sector_start in (0..view.len()).step_by(sector_size) {
            self.framer.mark_dirty(sector_start);
        }
    }

    /// Per-session reset: equivalent to `set(session_id, 0)`, preserving
    /// invariant 4 because `session_id` stays non-zero.
    pub fn reset_one(&mut self, view: BufferView, session_id: u64, sink: &dyn ErrorSink) {
        self.set(view, session_id, 0, sink);
    }

    /// Recomputes checksums for every sector touched since the last call.
    pub fn update_checksums(&mut self, view: BufferView) {
        self.framer.update_checksums(view.as_mut_slice());
    }

    /// Validates every sector's checksum, blanking (zeroing) any sector
    /// that fails so subsequent scans see well-formed empty slots rather
    /// than corrupted bytes. Returns the number of sectors blanked.
    pub fn validate_and_repair(&mut self, view: BufferView, sink: &dyn ErrorSink) -> usize {
        let failed = self.framer.validate_checksums(view.as_slice(), sink);
        for sector_idx in &failed {
            self.framer.blank_sector(view.as_mut_slice(), *sector_idx);
        }
        if !failed.is_empty() {
            self.framer.update_checksums(view.as_mut_slice());
            self.accel.clear();
        }
        failed.len()
    }
}

#[cfg(test)]
mod tests;
