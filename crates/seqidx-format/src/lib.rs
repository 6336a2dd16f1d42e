//! # seqidx-format — on-disk layout constants and record types
//!
//! Shared vocabulary for the Sequence Number Index: the fixed-size record
//! structs, the sector framing constants, the message header, and the
//! [`IndexError`] values routed through the injected error sink (see
//! `seqidx-engine::ErrorSink`).
//!
//! Nothing in this crate touches a filesystem or a mutable buffer — it only
//! describes byte layouts, leaving all I/O to the crates built on top of it.

use byteorder::{ByteOrder, LittleEndian};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// Physical span of one checksum-framed sector, in bytes.
pub const SECTOR_SIZE: usize = 4096;
/// Size of the trailing CRC32 checksum appended to every sector.
pub const CHECKSUM_SIZE: usize = 4;
/// Usable payload bytes per sector, before the checksum trailer.
pub const SECTOR_PAYLOAD_SIZE: usize = SECTOR_SIZE - CHECKSUM_SIZE;

/// Size in bytes of one [`SessionRecord`] slot in the record table.
///
/// The logical payload is 12 bytes (`session_id: u64` + `sequence_number:
/// u32`); 4 bytes of padding are added so every slot is 16 bytes, keeping
/// both fields naturally aligned no matter how many slots precede a given
/// slot within a sector (sector starts are always page-aligned). See
/// `DESIGN.md` for the Open Question this resolves.
pub const RECORD_SIZE: usize = 16;

/// Byte offset of `session_id` within a [`SessionRecord`] slot.
pub const RECORD_SESSION_ID_OFFSET: usize = 0;
/// Byte offset of `sequence_number` within a [`SessionRecord`] slot.
pub const RECORD_SEQUENCE_NUMBER_OFFSET: usize = 8;

/// Size in bytes of one [`PositionRecord`] slot in the position table.
pub const POSITION_RECORD_SIZE: usize = 24;
/// Byte offset of `transport_session_id` within a [`PositionRecord`] slot.
pub const POSITION_TRANSPORT_SESSION_ID_OFFSET: usize = 0;
/// Byte offset of `recording_id` within a [`PositionRecord`] slot.
pub const POSITION_RECORDING_ID_OFFSET: usize = 8;
/// Byte offset of `position` within a [`PositionRecord`] slot.
pub const POSITION_POSITION_OFFSET: usize = 16;

/// Size in bytes of the [`MessageHeader`] embedded at the start of sector 0.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Fraction of `file_capacity` allotted to the record region; the remainder
/// goes to the position region. Fixed by spec, kept as a named constant
/// rather than a magic number sprinkled through the config crate.
pub const SEQUENCE_NUMBER_RATIO: f64 = 0.9;

/// Schema identifiers stored in the [`MessageHeader`]. Any value other than
/// `CURRENT_SCHEMA_ID`/`CURRENT_TEMPLATE_ID`/`CURRENT_VERSION` on open is a
/// [`IndexError::SchemaMismatch`].
pub const CURRENT_SCHEMA_ID: u16 = 1;
pub const CURRENT_TEMPLATE_ID: u16 = 1;
pub const CURRENT_VERSION: u16 = 1;

/// `SessionId` zero is the reserved empty-slot sentinel.
pub const EMPTY_SESSION_ID: u64 = 0;

/// A live or empty slot in the record table: `session_id -> sequence_number`.
///
/// A slot reading `session_id == 0 && sequence_number == 0` is empty; any
/// other combination, including `sequence_number == 0` with a non-zero
/// `session_id` (immediately after a per-session reset), is a live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: u64,
    pub sequence_number: u32,
}

impl SessionRecord {
    /// Returns `true` if this is the reserved empty-slot pattern.
    #[must_use]
    pub fn is_empty_slot(&self) -> bool {
        self.session_id == EMPTY_SESSION_ID && self.sequence_number == 0
    }

    /// Reads a record out of a raw 16-byte slot, little-endian.
    #[must_use]
    pub fn read_from(slot: &[u8]) -> Self {
        debug_assert!(slot.len() >= RECORD_SIZE);
        SessionRecord {
            session_id: LittleEndian::read_u64(&slot[RECORD_SESSION_ID_OFFSET..]),
            sequence_number: LittleEndian::read_u32(&slot[RECORD_SEQUENCE_NUMBER_OFFSET..]),
        }
    }
}

/// One entry in the position table: the last archival-log position
/// consumed for a given upstream transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRecord {
    pub transport_session_id: i32,
    pub recording_id: i64,
    pub position: i64,
}

impl PositionRecord {
    /// A slot is empty when `transport_session_id == 0` and both 64-bit
    /// fields are zero — the same "all zero" sentinel convention as the
    /// record table, since `transport_session_id == 0` is never assigned
    /// by a real transport layer (session ids start at 1).
    #[must_use]
    pub fn is_empty_slot(&self) -> bool {
        self.transport_session_id == 0 && self.recording_id == 0 && self.position == 0
    }

    #[must_use]
    pub fn read_from(slot: &[u8]) -> Self {
        debug_assert!(slot.len() >= POSITION_RECORD_SIZE);
        PositionRecord {
            transport_session_id: LittleEndian::read_i32(
                &slot[POSITION_TRANSPORT_SESSION_ID_OFFSET..],
            ),
            recording_id: LittleEndian::read_i64(&slot[POSITION_RECORDING_ID_OFFSET..]),
            position: LittleEndian::read_i64(&slot[POSITION_POSITION_OFFSET..]),
        }
    }

    pub fn write_to(&self, slot: &mut [u8]) {
        debug_assert!(slot.len() >= POSITION_RECORD_SIZE);
        LittleEndian::write_i32(
            &mut slot[POSITION_TRANSPORT_SESSION_ID_OFFSET..],
            self.transport_session_id,
        );
        LittleEndian::write_i64(&mut slot[POSITION_RECORDING_ID_OFFSET..], self.recording_id);
        LittleEndian::write_i64(&mut slot[POSITION_POSITION_OFFSET..], self.position);
    }
}

/// The 8-byte schema descriptor stored at offset 0 of the whole buffer.
///
/// An SBE-style `schema_id`/`template_id`/`block_length`/`version` quartet;
/// `block_length` here is `RECORD_SIZE`, recorded so a future reader can
/// detect a record-layout change even if the schema and template ids are
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub schema_id: u16,
    pub template_id: u16,
    pub block_length: u16,
    pub version: u16,
}

impl MessageHeader {
    #[must_use]
    pub fn current() -> Self {
        MessageHeader {
            schema_id: CURRENT_SCHEMA_ID,
            template_id: CURRENT_TEMPLATE_ID,
            block_length: RECORD_SIZE as u16,
            version: CURRENT_VERSION,
        }
    }

    /// `true` if every field is zero — the signature of a never-initialized
    /// (blank) buffer, distinct from a schema mismatch.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.schema_id == 0 && self.template_id == 0 && self.block_length == 0 && self.version == 0
    }

    #[must_use]
    pub fn matches_current(&self) -> bool {
        *self == Self::current()
    }

    #[must_use]
    pub fn read_from(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= MESSAGE_HEADER_SIZE);
        MessageHeader {
            schema_id: LittleEndian::read_u16(&buf[0..]),
            template_id: LittleEndian::read_u16(&buf[2..]),
            block_length: LittleEndian::read_u16(&buf[4..]),
            version: LittleEndian::read_u16(&buf[6..]),
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= MESSAGE_HEADER_SIZE);
        LittleEndian::write_u16(&mut buf[0..], self.schema_id);
        LittleEndian::write_u16(&mut buf[2..], self.template_id);
        LittleEndian::write_u16(&mut buf[4..], self.block_length);
        LittleEndian::write_u16(&mut buf[6..], self.version);
    }
}

/// Errors routed through the injected `ErrorSink`. None of these are thrown
/// to the ingest path — they are local, recoverable conditions reported for
/// observability while the writer continues operating.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// A sector's stored checksum did not match its payload on load.
    /// The sector's content is treated as lost; the writer continues with
    /// blank content in that sector.
    #[error("checksum failed at sector offset {sector_offset}")]
    ChecksumFailed { sector_offset: usize },

    /// `claim` returned `OUT_OF_SPACE` for this session id; the update was
    /// dropped.
    #[error("index full, dropping update for session {session_id}")]
    IndexFull { session_id: u64 },

    /// A rename in the flip sequence failed; the flip was aborted and the
    /// mapped-file handles were not swapped.
    #[error("rename failed: {src} -> {dst}")]
    RenameFailed { src: String, dst: String },

    /// The on-disk message header did not match the schema this build
    /// expects; treated as blank-on-open.
    #[error("schema mismatch: found {found:?}, expected {expected:?}")]
    SchemaMismatch {
        found: MessageHeader,
        expected: MessageHeader,
    },
}

/// Fatal construction-time error, surfaced directly to the caller opening
/// the index. Unlike [`IndexError`], this is never routed through the error
/// sink — it prevents the index from opening at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("disk file capacity {disk} does not match configured capacity {memory}")]
    SizeMismatch { disk: u64, memory: u64 },

    #[error("file capacity {file_capacity} is smaller than one sector ({sector_size})")]
    SubSectorCapacity {
        file_capacity: u64,
        sector_size: u32,
    },

    #[error("file capacity {file_capacity} is not a multiple of sector size {sector_size}")]
    NotSectorAligned {
        file_capacity: u64,
        sector_size: u32,
    },
}

/// A raw view over a span of the shared index buffer.
///
/// This is the seam where the release/acquire visibility discipline lives:
/// most bytes in the buffer are touched only by the single writer thread and read only
/// through plain loads, but the two fields of a live [`SessionRecord`]
/// (`session_id`, `sequence_number`) may be read concurrently by another
/// thread while the writer is installing or updating a record, so those
/// two fields are always accessed through [`BufferView::store_u64_release`]
/// / [`BufferView::store_u32_release`] on the write side and
/// [`BufferView::load_u32_acquire`] on the read side.
///
/// `BufferView` is `Copy` and carries no lifetime: it is handed out freely
/// to the record table, position table, and sector framer, all of which
/// run on the single writer thread or, for reads, on threads that only
/// ever call the read-only accessors. The owner of the backing allocation
/// (`seqidx-engine::IndexBuffer`) is responsible for keeping it alive for
/// as long as any `BufferView` derived from it is in use.
#[derive(Clone, Copy)]
pub struct BufferView {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: `BufferView` is a bare pointer + length with no implied aliasing
// rules of its own; the single-writer / atomic-field discipline that makes
// sharing it across threads sound is documented on the type and upheld by
// its callers (`RecordTable`, `PositionTable`, `SectorFramer`), not by the
// compiler.
unsafe impl Send for BufferView {}
unsafe impl Sync for BufferView {}

impl BufferView {
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for as long
    /// as any `BufferView` derived from it is reachable, and all concurrent
    /// access to it must follow the single-writer-thread / atomic-field
    /// discipline documented on the type.
    #[must_use]
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        BufferView { ptr, len }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a sub-view over `[offset, offset + len)` of this view.
    ///
    /// # Panics
    ///
    /// Panics if the requested span is out of bounds.
    #[must_use]
    pub fn sub(&self, offset: usize, len: usize) -> BufferView {
        assert!(offset + len <= self.len, "sub-view out of bounds");
        // SAFETY: the new pointer stays within the bounds validated above,
        // which are themselves within the bounds of `self`.
        unsafe { BufferView::new(self.ptr.add(offset), len) }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: see the struct-level safety contract.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Exclusive byte access. Callers outside the single writer thread must
    /// not call this.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub fn as_mut_slice(&self) -> &mut [u8] {
        // SAFETY: see the struct-level safety contract; exclusivity here is
        // a discipline upheld by the single-writer callers, not the borrow
        // checker.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    fn atomic_u32_at(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset + 4 <= self.len);
        debug_assert_eq!(offset % 4, 0, "u32 atomic access must be 4-byte aligned");
        // SAFETY: bounds and alignment checked above; the struct-level
        // contract covers lifetime and aliasing.
        unsafe { AtomicU32::from_ptr(self.ptr.add(offset).cast()) }
    }

    fn atomic_u64_at(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(offset + 8 <= self.len);
        debug_assert_eq!(offset % 8, 0, "u64 atomic access must be 8-byte aligned");
        // SAFETY: bounds and alignment checked above; the struct-level
        // contract covers lifetime and aliasing.
        unsafe { AtomicU64::from_ptr(self.ptr.add(offset).cast()) }
    }

    pub fn store_u32_release(&self, offset: usize, value: u32) {
        self.atomic_u32_at(offset).store(value, Ordering::Release);
    }

    #[must_use]
    pub fn load_u32_acquire(&self, offset: usize) -> u32 {
        self.atomic_u32_at(offset).load(Ordering::Acquire)
    }

    pub fn store_u64_release(&self, offset: usize, value: u64) {
        self.atomic_u64_at(offset).store(value, Ordering::Release);
    }

    #[must_use]
    pub fn load_u64_acquire(&self, offset: usize) -> u64 {
        self.atomic_u64_at(offset).load(Ordering::Acquire)
    }
}

/// Sink for [`IndexError`] values, injected into every component that can
/// detect a local, recoverable fault. Accepts a single error value and never
/// throws. Implementors must not panic or unwind — a misbehaving sink must
/// never take down the ingest path.
pub trait ErrorSink: Send + Sync {
    fn on_error(&self, error: IndexError);
}

impl<F: Fn(IndexError) + Send + Sync> ErrorSink for F {
    fn on_error(&self, error: IndexError) {
        self(error)
    }
}

/// An `ErrorSink` that discards everything. Useful in tests that only care
/// about the resulting state, not which errors were reported along the way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullErrorSink;

impl ErrorSink for NullErrorSink {
    fn on_error(&self, _error: IndexError) {}
}

/// An `ErrorSink` that records every error it receives, for assertions in
/// tests.
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    errors: std::sync::Mutex<Vec<IndexError>>,
}

impl RecordingErrorSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn take(&self) -> Vec<IndexError> {
        std::mem::take(&mut self.errors.lock().expect("error sink mutex poisoned"))
    }
}

impl ErrorSink for RecordingErrorSink {
    fn on_error(&self, error: IndexError) {
        self.errors.lock().expect("error sink mutex poisoned").push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_requires_both_fields_zero() {
        let empty = SessionRecord {
            session_id: 0,
            sequence_number: 0,
        };
        assert!(empty.is_empty_slot());

        let reset = SessionRecord {
            session_id: 42,
            sequence_number: 0,
        };
        assert!(!reset.is_empty_slot(), "a reset record is still live");
    }

    #[test]
    fn record_round_trips_through_bytes() {
        let mut slot = [0u8; RECORD_SIZE];
        LittleEndian::write_u64(&mut slot[RECORD_SESSION_ID_OFFSET..], 9_001);
        LittleEndian::write_u32(&mut slot[RECORD_SEQUENCE_NUMBER_OFFSET..], 7);
        let record = SessionRecord::read_from(&slot);
        assert_eq!(record.session_id, 9_001);
        assert_eq!(record.sequence_number, 7);
    }

    #[test]
    fn position_record_round_trips() {
        let mut slot = [0u8; POSITION_RECORD_SIZE];
        let rec = PositionRecord {
            transport_session_id: 3,
            recording_id: 55,
            position: 123_456,
        };
        rec.write_to(&mut slot);
        assert_eq!(PositionRecord::read_from(&slot), rec);
    }

    #[test]
    fn header_current_is_not_zero_and_matches_itself() {
        let header = MessageHeader::current();
        assert!(!header.is_zero());
        assert!(header.matches_current());
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let header = MessageHeader::current();
        let mut buf = [0u8; MESSAGE_HEADER_SIZE];
        header.write_to(&mut buf);
        assert_eq!(MessageHeader::read_from(&buf), header);
    }
}
