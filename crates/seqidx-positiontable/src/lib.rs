//! # seqidx-positiontable — the Position Table
//!
//! Tracks, per upstream transport session, the last archival-log position
//! consumed. Structurally this mirrors `seqidx-recordtable::RecordTable` —
//! same framed-sector discipline, same "acceleration map, fall back to
//! linear scan" shape — but keyed by `transport_session_id: i32` and with
//! no concurrent-reader visibility requirement, since only the record
//! table's `sequence_number` field needs release/acquire semantics, so
//! plain little-endian byte writes are sufficient here.
//!
//! `indexed_up_to` is called once per fragment, so without an
//! acceleration map every fragment would pay for a linear scan of however
//! many transport sessions are live; see `DESIGN.md`.

use seqidx_format::PositionRecord;
use seqidx_sector::{OutOfSpace, SectorFramer};
use std::collections::HashMap;

pub struct PositionTable {
    framer: SectorFramer,
    accel: HashMap<i32, usize>,
}

impl PositionTable {
    #[must_use]
    pub fn new(base_offset: usize, region_len: usize) -> Self {
        PositionTable {
            framer: SectorFramer::with_default_sector_size(base_offset, region_len),
            accel: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_sector_size(base_offset: usize, region_len: usize, sector_size: usize) -> Self {
        PositionTable {
            framer: SectorFramer::new(base_offset, region_len, sector_size),
            accel: HashMap::new(),
        }
    }

    /// Records that `transport_session_id`'s archival-log consumption has
    /// reached `position` within `recording_id`. Drops the update silently
    /// (no error sink call for this path) if the position region is full;
    /// in practice this should not happen since
    /// the number of live transport sessions is bounded by the number of
    /// configured gateway connections, far below the region's capacity.
    pub fn indexed_up_to(
        &mut self,
        region: &mut [u8],
        transport_session_id: i32,
        recording_id: i64,
        position: i64,
    ) {
        let record = PositionRecord {
            transport_session_id,
            recording_id,
            position,
        };

        if let Some(&offset) = self.accel.get(&transport_session_id) {
            record.write_to(&mut region[offset..offset + seqidx_format::POSITION_RECORD_SIZE]);
            self.framer.mark_dirty(offset);
            return;
        }

        let mut cursor = 0;
        loop {
            let offset = match self.framer.claim(cursor, seqidx_format::POSITION_RECORD_SIZE) {
                Ok(offset) => offset,
                Err(OutOfSpace) => return,
            };
            let existing = PositionRecord::read_from(
                &region[offset..offset + seqidx_format::POSITION_RECORD_SIZE],
            );
            if existing.is_empty_slot() || existing.transport_session_id == transport_session_id {
                record.write_to(&mut region[offset..offset + seqidx_format::POSITION_RECORD_SIZE]);
                self.framer.mark_dirty(offset);
                self.accel.insert(transport_session_id, offset);
                return;
            }
            cursor = offset + seqidx_format::POSITION_RECORD_SIZE;
        }
    }

    /// Iterates every live position record, in slot order.
    pub fn iter(&self, region: &[u8]) -> Vec<PositionRecord> {
        let mut out = Vec::new();
        let mut cursor = 0;
        loop {
            let offset = match self.framer.claim(cursor, seqidx_format::POSITION_RECORD_SIZE) {
                Ok(offset) => offset,
                Err(OutOfSpace) => break,
            };
            let record = PositionRecord::read_from(
                &region[offset..offset + seqidx_format::POSITION_RECORD_SIZE],
            );
            if record.is_empty_slot() {
                break;
            }
            out.push(record);
            cursor = offset + seqidx_format::POSITION_RECORD_SIZE;
        }
        out
    }

    /// Calls `consumer` with the single record whose `position` is
    /// highest — the replay starting point a writer restores on open.
    pub fn read_last_position(&self, region: &[u8], mut consumer: impl FnMut(i32, i64, i64)) {
        if let Some(record) = self
            .iter(region)
            .into_iter()
            .max_by_key(|record| record.position)
        {
            consumer(
                record.transport_session_id,
                record.recording_id,
                record.position,
            );
        }
    }

    pub fn update_checksums(&mut self, region: &mut [u8]) {
        self.framer.update_checksums(region);
    }

    pub fn validate_and_repair(&mut self, region: &mut [u8], sink: &dyn seqidx_format::ErrorSink) -> usize {
        let failed = self.framer.validate_checksums(region, sink);
        for sector_idx in &failed {
            self.framer.blank_sector(region, *sector_idx);
        }
        if !failed.is_empty() {
            self.framer.update_checksums(region);
            self.accel.clear();
        }
        failed.len()
    }
}

#[cfg(test)]
mod tests;
