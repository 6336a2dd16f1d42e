//! A minimal fragment encoding for the diagnostic shell. Spec §1 puts FIX
//! and SBE decoding out of scope for the index itself, so the shell
//! synthesizes its own one-byte-tagged fragments directly from typed
//! commands rather than pretending to speak either wire format.

use seqidx_engine::{DecodedEvent, FragmentClassifier, FragmentHeader, MessageStatus, RecordingIdLookup};

const TAG_FIX_OK: u8 = 0;
const TAG_RESET_SESSION_IDS: u8 = 1;
const TAG_RESET_SEQUENCE_NUMBER: u8 = 2;

pub fn encode_fix_ok(session: u64, msg_seq_num: u32) -> Vec<u8> {
    let mut buf = vec![TAG_FIX_OK];
    buf.extend_from_slice(&session.to_le_bytes());
    buf.extend_from_slice(&msg_seq_num.to_le_bytes());
    buf
}

pub fn encode_reset_session_ids() -> Vec<u8> {
    vec![TAG_RESET_SESSION_IDS]
}

pub fn encode_reset_sequence_number(session: u64) -> Vec<u8> {
    let mut buf = vec![TAG_RESET_SEQUENCE_NUMBER];
    buf.extend_from_slice(&session.to_le_bytes());
    buf
}

pub struct CliClassifier;

impl FragmentClassifier for CliClassifier {
    fn classify(
        &self,
        buffer: &[u8],
        offset: usize,
        _length: usize,
        _header: &FragmentHeader,
    ) -> Option<DecodedEvent> {
        match buffer[offset] {
            TAG_FIX_OK => {
                let session = u64::from_le_bytes(buffer[offset + 1..offset + 9].try_into().ok()?);
                let msg_seq_num = u32::from_le_bytes(buffer[offset + 9..offset + 13].try_into().ok()?);
                Some(DecodedEvent::FixMessage {
                    status: MessageStatus::Ok,
                    session,
                    msg_seq_num,
                })
            }
            TAG_RESET_SESSION_IDS => Some(DecodedEvent::ResetSessionIds),
            TAG_RESET_SEQUENCE_NUMBER => {
                let session = u64::from_le_bytes(buffer[offset + 1..offset + 9].try_into().ok()?);
                Some(DecodedEvent::ResetSequenceNumber { session })
            }
            _ => None,
        }
    }
}

/// The shell drives one synthetic archival-log stream; every transport
/// session maps to the same recording id.
pub struct FixedRecordingId;

impl RecordingIdLookup for FixedRecordingId {
    fn recording_id(&self, _transport_session_id: i32) -> i64 {
        1
    }
}
