use crate::{Clock, DecodedEvent, FragmentClassifier, FragmentHeader, MessageStatus, RecordingIdLookup};
use seqidx_config::SeqIndexConfig;
use std::sync::atomic::{AtomicU64, Ordering};

pub const TEST_SECTOR_SIZE: u32 = 256;
pub const TEST_STREAM_ID: i32 = 7;

/// Sector size 256, 4 sectors total, split exactly 3/1 by a 0.75 ratio —
/// 0.75 is exactly representable in binary floating point, unlike the
/// production default of 0.9, so the fixture's region sizes need no fuzz
/// tolerance.
pub fn test_config() -> SeqIndexConfig {
    SeqIndexConfig {
        file_capacity: u64::from(TEST_SECTOR_SIZE) * 4,
        sector_size: TEST_SECTOR_SIZE,
        sequence_number_ratio: 0.75,
        stream_id: TEST_STREAM_ID,
        index_file_state_flush_timeout_ms: 1_000,
    }
}

/// A `Clock` a test can advance deterministically, standing in for the
/// injected monotonic millisecond source.
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: u64) -> Self {
        ManualClock {
            millis: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, by: u64) {
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Always resolves to the same recording id; tests don't exercise multiple
/// archival-log streams.
pub struct FixedRecordingId(pub i64);

impl RecordingIdLookup for FixedRecordingId {
    fn recording_id(&self, _transport_session_id: i32) -> i64 {
        self.0
    }
}

/// A minimal stand-in for the out-of-scope FIX/SBE decoders: reads a
/// one-byte tag from `buffer[offset]` and decodes the fixed-width payload
/// that follows it. Not a realistic wire format — it only needs to
/// exercise the writer's dispatch, not describe FIX itself.
pub struct TagClassifier;

pub const TAG_FIX_OK: u8 = 0;
pub const TAG_FIX_ERROR: u8 = 1;
pub const TAG_RESET_SESSION_IDS: u8 = 2;
pub const TAG_RESET_SEQUENCE_NUMBER: u8 = 3;

impl FragmentClassifier for TagClassifier {
    fn classify(
        &self,
        buffer: &[u8],
        offset: usize,
        _length: usize,
        _header: &FragmentHeader,
    ) -> Option<DecodedEvent> {
        match buffer[offset] {
            TAG_FIX_OK => {
                let session = u64::from_le_bytes(buffer[offset + 1..offset + 9].try_into().unwrap());
                let msg_seq_num = u32::from_le_bytes(buffer[offset + 9..offset + 13].try_into().unwrap());
                Some(DecodedEvent::FixMessage {
                    status: MessageStatus::Ok,
                    session,
                    msg_seq_num,
                })
            }
            TAG_FIX_ERROR => Some(DecodedEvent::FixMessage {
                status: MessageStatus::Error,
                session: 0,
                msg_seq_num: 0,
            }),
            TAG_RESET_SESSION_IDS => Some(DecodedEvent::ResetSessionIds),
            TAG_RESET_SEQUENCE_NUMBER => {
                let session = u64::from_le_bytes(buffer[offset + 1..offset + 9].try_into().unwrap());
                Some(DecodedEvent::ResetSequenceNumber { session })
            }
            _ => None,
        }
    }
}

pub fn fix_ok_fragment(session: u64, msg_seq_num: u32) -> Vec<u8> {
    let mut buf = vec![TAG_FIX_OK];
    buf.extend_from_slice(&session.to_le_bytes());
    buf.extend_from_slice(&msg_seq_num.to_le_bytes());
    buf
}

pub fn reset_session_ids_fragment() -> Vec<u8> {
    vec![TAG_RESET_SESSION_IDS]
}

pub fn reset_sequence_number_fragment(session: u64) -> Vec<u8> {
    let mut buf = vec![TAG_RESET_SEQUENCE_NUMBER];
    buf.extend_from_slice(&session.to_le_bytes());
    buf
}

pub fn header(transport_session_id: i32, start_position: i64) -> FragmentHeader {
    FragmentHeader {
        stream_id: TEST_STREAM_ID,
        begin_flag: true,
        transport_session_id,
        start_position,
    }
}
