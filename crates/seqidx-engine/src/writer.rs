//! The writer engine: the single-threaded consumer of decoded archival-log
//! fragments. Owns the file manager and both tables, decides when to flush,
//! and reports local faults through the injected error sink rather than
//! propagating them, keeping a flush failure from unwinding the write path —
//! even the flush itself degrades to "report and retry next tick" instead of
//! returning an error.

use anyhow::{Context, Result};
use seqidx_config::SeqIndexConfig;
use seqidx_filemanager::FileManager;
use seqidx_positiontable::PositionTable;
use seqidx_recordtable::RecordTable;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::events::{Clock, DecodedEvent, ErrorSink, FragmentClassifier, FragmentHeader, MessageStatus, RecordingIdLookup};
use crate::IndexBuffer;

/// The single-threaded writer: receives fragments, mutates the record and
/// position tables, and drives the flush cycle.
///
/// # Write path
///
/// 1. Filter by `stream_id` and the fragment's BEGIN flag.
/// 2. Dispatch the classified event against the record table.
/// 3. Record the archival-log position reached into the position table.
/// 4. Detect a term roll and flush if one occurred.
///
/// # Time-based flush
///
/// An external duty-cycle scheduler calls [`Writer::do_work`] periodically;
/// if a record has been saved since the last flush and the configured
/// timeout has elapsed, the writer flushes.
pub struct Writer {
    file_manager: FileManager,
    buffer: Arc<IndexBuffer>,
    record_table: RecordTable,
    position_table: PositionTable,
    sector_size: u32,
    stream_id: i32,
    flush_timeout_ms: u64,
    term_buffer_length: i64,
    next_roll_position: Option<i64>,
    unsaved: bool,
    last_flush_millis: u64,
    open: bool,
    clock: Arc<dyn Clock>,
    error_sink: Arc<dyn ErrorSink>,
    recording_id_lookup: Arc<dyn RecordingIdLookup>,
    classifier: Arc<dyn FragmentClassifier>,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("stream_id", &self.stream_id)
            .field("flush_timeout_ms", &self.flush_timeout_ms)
            .field("term_buffer_length", &self.term_buffer_length)
            .field("next_roll_position", &self.next_roll_position)
            .field("unsaved", &self.unsaved)
            .field("open", &self.open)
            .field("index_path", &self.file_manager.index_path())
            .finish()
    }
}

impl Writer {
    /// Opens (or creates) the index at `index_path`, recovering from
    /// whichever passing-place files are present and validating every
    /// sector's checksum before returning.
    ///
    /// `term_buffer_length` is the fixed size of one archival-log term,
    /// used only for term-roll detection; it is not a configuration option
    /// because it describes the archival log, not the index itself.
    pub fn open(
        index_path: impl Into<PathBuf>,
        config: &SeqIndexConfig,
        term_buffer_length: i64,
        clock: Arc<dyn Clock>,
        error_sink: Arc<dyn ErrorSink>,
        recording_id_lookup: Arc<dyn RecordingIdLookup>,
        classifier: Arc<dyn FragmentClassifier>,
    ) -> Result<Self> {
        let (record_region_len, position_region_len) = config
            .validate()
            .context("index configuration failed validation")?;

        let (file_manager, bytes, _outcome) = FileManager::open_or_recover(
            index_path.into(),
            config.file_capacity,
            record_region_len,
            position_region_len,
            error_sink.as_ref(),
        )
        .map_err(anyhow::Error::new)
        .context("opening index file")?;

        let sector_size = config.sector_size as usize;
        let buffer = Arc::new(IndexBuffer::new(bytes, record_region_len as usize));

        let mut record_table = RecordTable::with_sector_size(record_region_len as usize, sector_size);
        let mut position_table = PositionTable::with_sector_size(
            record_region_len as usize,
            position_region_len as usize,
            sector_size,
        );

        // Recovery at open: validate every sector's checksum now that the
        // raw bytes have been loaded, blanking any corrupted sector rather
        // than aborting the open.
        record_table.validate_and_repair(buffer.record_view(), error_sink.as_ref());
        position_table.validate_and_repair(buffer.position_region_mut(), error_sink.as_ref());

        let last_flush_millis = clock.now_millis();

        Ok(Writer {
            file_manager,
            buffer,
            record_table,
            position_table,
            sector_size: config.sector_size,
            stream_id: config.stream_id,
            flush_timeout_ms: config.index_file_state_flush_timeout_ms,
            term_buffer_length,
            next_roll_position: None,
            unsaved: false,
            last_flush_millis,
            open: true,
            clock,
            error_sink,
            recording_id_lookup,
            classifier,
        })
    }

    /// A second handle onto the live in-memory buffer, for building a
    /// [`crate::Reader`] that observes this writer's mutations as they
    /// happen, observing the writer's live in-memory buffer directly.
    #[must_use]
    pub fn buffer_handle(&self) -> Arc<IndexBuffer> {
        Arc::clone(&self.buffer)
    }

    #[must_use]
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Offers one decoded fragment to the writer.
    pub fn on_fragment(&mut self, buffer: &[u8], offset: usize, length: usize, header: &FragmentHeader) {
        if !self.open {
            return;
        }
        if header.stream_id != self.stream_id {
            return;
        }
        if !header.begin_flag {
            // Continuation fragments carry no header of interest.
            return;
        }

        let end_position = header.start_position + length as i64;
        self.track_term_roll(header.start_position, offset);

        if let Some(event) = self.classifier.classify(buffer, offset, length, header) {
            self.apply_event(event);
        }

        let recording_id = self.recording_id_lookup.recording_id(header.transport_session_id);
        self.position_table.indexed_up_to(
            self.buffer.position_region_mut(),
            header.transport_session_id,
            recording_id,
            end_position,
        );

        if self.roll_due(end_position) {
            self.flush();
        }
    }

    fn apply_event(&mut self, event: DecodedEvent) {
        match event {
            DecodedEvent::FixMessage {
                status: MessageStatus::Ok,
                session,
                msg_seq_num,
            } => {
                self.record_table
                    .set(self.buffer.record_view(), session, msg_seq_num, self.error_sink.as_ref());
                self.unsaved = true;
            }
            DecodedEvent::FixMessage {
                status: MessageStatus::Error,
                ..
            } => {
                // Decode failures are the classifier's own concern; the
                // writer takes no action.
            }
            DecodedEvent::ResetSessionIds => {
                self.record_table.reset_all(self.buffer.record_view());
                self.unsaved = true;
            }
            DecodedEvent::ResetSequenceNumber { session } => {
                self.record_table
                    .reset_one(self.buffer.record_view(), session, self.error_sink.as_ref());
                self.unsaved = true;
            }
        }
    }

    /// Establishes the pending roll boundary on the first fragment this
    /// writer ever processes.
    fn track_term_roll(&mut self, start_position: i64, offset: usize) {
        if self.next_roll_position.is_none() {
            self.next_roll_position = Some(start_position + self.term_buffer_length - offset as i64);
        }
    }

    /// `true` if `end_position` has crossed the pending roll boundary, in
    /// which case the boundary is advanced by one term length.
    fn roll_due(&mut self, end_position: i64) -> bool {
        match self.next_roll_position {
            Some(roll) if end_position > roll => {
                self.next_roll_position = Some(roll + self.term_buffer_length);
                true
            }
            _ => false,
        }
    }

    /// Cooperative duty-cycle tick driving the time-based flush. Returns
    /// `1` if a flush ran, `0` if idle.
    pub fn do_work(&mut self) -> u32 {
        if !self.open {
            return 0;
        }
        let elapsed = self.clock.now_millis().saturating_sub(self.last_flush_millis);
        if self.unsaved && elapsed >= self.flush_timeout_ms {
            self.flush();
            1
        } else {
            0
        }
    }

    /// Resets every session's sequence number (the external `resetSequenceNumbers()`
    /// surface, distinct from a `ResetSessionIds` fragment event but with
    /// identical effect).
    pub fn reset_sequence_numbers(&mut self) {
        self.record_table.reset_all(self.buffer.record_view());
        self.unsaved = true;
    }

    /// Replays the last known archival-log position recorded on startup.
    pub fn read_last_position(&self, consumer: impl FnMut(i32, i64, i64)) {
        self.position_table
            .read_last_position(self.buffer.position_region(), consumer);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Diagnostic accessor for the transient passing-place path.
    #[must_use]
    pub fn passing_place(&self) -> &Path {
        self.file_manager.passing_place()
    }

    /// Performs a final flush if any record is unsaved, then marks the
    /// writer closed. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        if self.unsaved {
            self.flush();
        }
        self.open = false;
        Ok(())
    }

    /// Recomputes checksums over both regions, then asks the file manager
    /// to flush the whole buffer and perform the atomic flip. A flip
    /// failure is reported via the error sink and otherwise swallowed —
    /// the next `do_work`/`on_fragment`-triggered flush retries, since a
    /// failed flush must not lose previously persisted state.
    fn flush(&mut self) {
        self.record_table.update_checksums(self.buffer.record_view());
        self.position_table.update_checksums(self.buffer.position_region_mut());

        if let Err(err) = self.file_manager.flush(self.buffer.as_slice()) {
            if let Some(index_error) = err.as_index_error() {
                self.error_sink.on_error(index_error);
            }
            return;
        }

        self.unsaved = false;
        self.last_flush_millis = self.clock.now_millis();
    }
}

/// Best-effort flush on drop.
impl Drop for Writer {
    fn drop(&mut self) {
        if self.open && self.unsaved {
            self.flush();
        }
    }
}
