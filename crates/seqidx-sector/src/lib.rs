//! # seqidx-sector — the Sector Framer
//!
//! Carves a flat byte region into fixed-size, checksum-framed sectors. A
//! record is never split across a sector boundary: [`SectorFramer::claim`]
//! wastes the remaining bytes of a sector rather than letting a record
//! straddle the trailing checksum.
//!
//! Checksums use `crc32fast`, with the trailer value stored little-endian.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use seqidx_format::{ErrorSink, IndexError, CHECKSUM_SIZE, SECTOR_SIZE};

/// A region exhausted of claimable space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfSpace;

/// Frames a contiguous byte region (the record table's span, or the
/// position table's span — never the whole buffer) into fixed-size
/// checksummed sectors.
///
/// `base_offset` is this region's absolute byte offset within the whole
/// index buffer, used only so that reported sector offsets (to the error
/// sink) are meaningful across the whole file, not just within the region.
pub struct SectorFramer {
    sector_size: usize,
    base_offset: usize,
    region_len: usize,
    dirty: Vec<bool>,
}

impl SectorFramer {
    /// `region_len` must be a positive multiple of `sector_size` (enforced
    /// by `SeqIndexConfig::validate` upstream; this constructor trusts its
    /// caller and does not re-validate).
    #[must_use]
    pub fn new(base_offset: usize, region_len: usize, sector_size: usize) -> Self {
        debug_assert!(sector_size > CHECKSUM_SIZE);
        debug_assert_eq!(region_len % sector_size, 0);
        let sector_count = region_len / sector_size;
        SectorFramer {
            sector_size,
            base_offset,
            region_len,
            dirty: vec![false; sector_count],
        }
    }

    #[must_use]
    pub fn with_default_sector_size(base_offset: usize, region_len: usize) -> Self {
        Self::new(base_offset, region_len, SECTOR_SIZE)
    }

    #[must_use]
    pub fn region_len(&self) -> usize {
        self.region_len
    }

    #[must_use]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    #[must_use]
    pub fn sector_payload_len(&self) -> usize {
        self.sector_size - CHECKSUM_SIZE
    }

    fn sector_index(&self, local_offset: usize) -> usize {
        local_offset / self.sector_size
    }

    /// Returns the next offset, at or after `start_offset` (both relative
    /// to this region's start), at which a record of `record_size` bytes
    /// fits entirely within one sector's payload. Advances past wasted
    /// end-of-sector bytes automatically.
    pub fn claim(&self, start_offset: usize, record_size: usize) -> Result<usize, OutOfSpace> {
        debug_assert!(record_size <= self.sector_payload_len());
        let mut offset = start_offset;
        loop {
            if offset >= self.region_len {
                return Err(OutOfSpace);
            }
            let sector_idx = self.sector_index(offset);
            let sector_start = sector_idx * self.sector_size;
            let payload_end = sector_start + self.sector_payload_len();
            if offset + record_size <= payload_end {
                return Ok(offset);
            }
            // Record would straddle the checksum trailer: skip to the next
            // sector's payload start, wasting the remainder of this one.
            offset = sector_start + self.sector_size;
        }
    }

    /// Marks the sector containing `local_offset` dirty, so the next
    /// `update_checksums` call recomputes its trailer.
    pub fn mark_dirty(&mut self, local_offset: usize) {
        let idx = self.sector_index(local_offset);
        if idx < self.dirty.len() {
            self.dirty[idx] = true;
        }
    }

    /// Recomputes and stores the checksum trailer of every sector marked
    /// dirty since the last call. `buf` must be exactly this region's
    /// `region_len` bytes (the record or position region slice).
    pub fn update_checksums(&mut self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.region_len);
        for (idx, dirty) in self.dirty.iter_mut().enumerate() {
            if !*dirty {
                continue;
            }
            let sector_start = idx * self.sector_size;
            let payload_end = sector_start + self.sector_payload_len();
            let checksum = Self::checksum(&buf[sector_start..payload_end]);
            LittleEndian::write_u32(&mut buf[payload_end..sector_start + self.sector_size], checksum);
            *dirty = false;
        }
    }

    /// Verifies every sector's stored checksum against its payload.
    /// Mismatches are reported via `sink` at their absolute buffer offset
    /// and collected into the returned vector (of local sector indices) so
    /// the caller can decide how to treat the corrupted content — the
    /// framer itself leaves `buf` untouched either way.
    pub fn validate_checksums(&self, buf: &[u8], sink: &dyn ErrorSink) -> Vec<usize> {
        debug_assert_eq!(buf.len(), self.region_len);
        let mut failed = Vec::new();
        for idx in 0..self.dirty.len() {
            let sector_start = idx * self.sector_size;
            let payload_end = sector_start + self.sector_payload_len();
            let stored = LittleEndian::read_u32(&buf[payload_end..sector_start + self.sector_size]);
            let computed = Self::checksum(&buf[sector_start..payload_end]);
            if stored != computed {
                sink.on_error(IndexError::ChecksumFailed {
                    sector_offset: self.base_offset + sector_start,
                });
                failed.push(idx);
            }
        }
        failed
    }

    /// Zeroes the payload of `sector_idx` (a local sector index, as
    /// returned by [`validate_checksums`]) and marks it dirty so the next
    /// `update_checksums` re-establishes a valid (all-zero) checksum.
    pub fn blank_sector(&mut self, buf: &mut [u8], sector_idx: usize) {
        let sector_start = sector_idx * self.sector_size;
        let payload_end = sector_start + self.sector_payload_len();
        buf[sector_start..payload_end].fill(0);
        self.mark_dirty(sector_start);
    }

    fn checksum(payload: &[u8]) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(payload);
        hasher.finalize()
    }
}
