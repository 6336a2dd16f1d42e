//! Injected collaborators and the decoded-event shapes the writer dispatches
//! on. Message framing/decoding is out of scope here: a host gateway is
//! expected to decode FIX/SBE wire bytes itself and hand the writer an
//! already-classified [`DecodedEvent`] through [`FragmentClassifier`], the
//! way a consumer hands already-validated keys/values to a storage engine
//! rather than parsing a wire protocol of its own.

pub use seqidx_format::ErrorSink;

/// Monotonic millisecond clock, used only for flush-timeout scheduling.
/// Kept as an injected trait rather than `std::time::Instant` directly so
/// tests can drive time deterministically.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Looks up the archival-log recording id for a transport session. May
/// block briefly on first call per id; the writer calls this synchronously
/// on its own thread once per fragment.
pub trait RecordingIdLookup: Send + Sync {
    fn recording_id(&self, transport_session_id: i32) -> i64;
}

/// Stands in for the out-of-scope `FixMessageDecoder` /
/// `ResetSessionIdsDecoder` / `ResetSequenceNumberDecoder` / FIX
/// `HeaderDecoder` quartet. A host gateway that owns real SBE/FIX decoding
/// implements this to turn a raw fragment into a [`DecodedEvent`];
/// fragments that don't carry a dispatchable template return `None` and are
/// ignored.
pub trait FragmentClassifier: Send + Sync {
    fn classify(
        &self,
        buffer: &[u8],
        offset: usize,
        length: usize,
        header: &FragmentHeader,
    ) -> Option<DecodedEvent>;
}

/// The subset of an archival-log fragment header the writer itself needs
/// for its filter and term-roll steps. Everything else in the real
/// fragment header belongs to the host transport and is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Only fragments whose stream matches the configured `stream_id` are
    /// processed; this is the writer's own filter, not the classifier's.
    pub stream_id: i32,
    /// `true` only for the first fragment of a logical message; the header
    /// of interest lives there, so continuation fragments are ignored.
    pub begin_flag: bool,
    /// Identifies the upstream transport session for the position table,
    /// a different identifier space from `SessionId`.
    pub transport_session_id: i32,
    /// Absolute archival-log offset at which this fragment begins.
    pub start_position: i64,
}

/// Outcome of decoding a FIX message body: if status is OK, the writer
/// extracts `msg_seq_num` and updates the record; otherwise the message is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Ok,
    Error,
}

/// An already-decoded logical message, handed to the writer by a host
/// gateway's [`FragmentClassifier`]. Covers the three dispatchable template
/// kinds exactly; "all other templates" are represented by `classify`
/// returning `None` rather than by a fourth variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A FIX message body. Only `status == Ok` messages update a record;
    /// `status == Error` is reported by the decoder's own channel and
    /// otherwise ignored by the writer.
    FixMessage {
        status: MessageStatus,
        session: u64,
        msg_seq_num: u32,
    },
    /// Resets the whole record region.
    ResetSessionIds,
    /// Resets a single session's sequence number to 0.
    ResetSequenceNumber { session: u64 },
}
