//! # seqidx-engine — the Writer Engine and Reader
//!
//! Ties [`seqidx-format`], [`seqidx-sector`], [`seqidx-recordtable`],
//! [`seqidx-positiontable`], and [`seqidx-filemanager`] into the two
//! components a host gateway actually talks to: [`Writer`], the
//! single-threaded ingest-path consumer, and [`Reader`], a read-only view
//! over either a quiescent on-disk file or a writer's live buffer.
//!
//! ## Module responsibilities
//!
//! | Module      | Purpose                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`events`]  | The injected collaborator traits and the decoded-event shapes a host gateway hands to the writer |
//! | [`writer`]  | `Writer`: `on_fragment`, `do_work`, `reset_sequence_numbers`, `close` |
//! | [`reader`]  | `Reader`: `lookup`, `iter`, `read_last_position`          |
//!
//! `lib.rs` owns the shared buffer type and constructor; the writer-specific
//! operations live in `writer.rs` and the read path in `reader.rs`. There is
//! no separate compaction or manifest concern here — the file manager and
//! record/position tables already absorb that role.

mod events;
mod reader;
mod writer;

pub use events::{Clock, DecodedEvent, FragmentClassifier, FragmentHeader, MessageStatus, RecordingIdLookup};
pub use reader::Reader;
pub use writer::Writer;

use seqidx_format::BufferView;

/// Owns the single contiguous span of bytes backing both the record region
/// and the position region.
///
/// Shared between the writer thread and any number of reader threads via
/// `Arc<IndexBuffer>`. Only the writer thread ever calls
/// [`IndexBuffer::position_region_mut`]; concurrent access to the record
/// region goes through [`IndexBuffer::record_view`]'s `BufferView`, which
/// documents its own release/acquire discipline. Holding the bytes behind a
/// shared reference rather than a `Mutex` mirrors `BufferView` itself: the
/// safety argument is "single writer thread, documented field-level
/// visibility", not "the compiler enforces exclusivity".
pub struct IndexBuffer {
    bytes: Box<[u8]>,
    record_region_len: usize,
}

impl IndexBuffer {
    #[must_use]
    pub fn new(bytes: Vec<u8>, record_region_len: usize) -> Self {
        debug_assert!(record_region_len <= bytes.len());
        IndexBuffer {
            bytes: bytes.into_boxed_slice(),
            record_region_len,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn record_region_len(&self) -> usize {
        self.record_region_len
    }

    #[must_use]
    pub fn position_region_len(&self) -> usize {
        self.bytes.len() - self.record_region_len
    }

    /// The whole buffer, as last mutated by the writer thread. Used by the
    /// file manager's flush path and by construction-time checksum
    /// validation.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Read-only view over the position region. Safe to call from any
    /// thread only when the writer is quiescent — there is no release/
    /// acquire visibility contract for the position table's fields, only
    /// for the record table's — in practice this means "before the writer
    /// starts" or "from the writer's own thread", for replaying the last
    /// known position on startup.
    #[must_use]
    pub fn position_region(&self) -> &[u8] {
        &self.bytes[self.record_region_len..]
    }

    /// A [`BufferView`] over the record region, used for both writer-side
    /// mutation and reader-side acquire loads.
    ///
    /// # Safety discipline
    ///
    /// The returned view exposes write access through a shared `&self`
    /// reference. Soundness relies on the same rule `BufferView` itself
    /// documents: only the single writer thread ever calls a `store_*`
    /// method on it.
    #[must_use]
    pub fn record_view(&self) -> BufferView {
        // SAFETY: `self.bytes` is valid for `record_region_len` bytes for
        // as long as this `IndexBuffer` is alive; callers uphold the
        // single-writer-thread discipline documented on `BufferView`.
        unsafe { BufferView::new(self.bytes.as_ptr() as *mut u8, self.record_region_len) }
    }

    /// Mutable access to the position region. Only ever called from the
    /// writer thread — unlike [`record_view`](Self::record_view), the
    /// position table has no documented concurrent-reader contract, so
    /// there is no need for an atomic-capable `BufferView` here, only for
    /// a bypass of the borrow checker's single-owner assumption.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub fn position_region_mut(&self) -> &mut [u8] {
        // SAFETY: only the writer thread calls this, and it never aliases
        // the mutation with a concurrent reader of the same bytes (the
        // position region carries no visibility contract to violate).
        let ptr = self.bytes.as_ptr() as *mut u8;
        let len = self.position_region_len();
        unsafe { std::slice::from_raw_parts_mut(ptr.add(self.record_region_len), len) }
    }
}

#[cfg(test)]
mod tests;
