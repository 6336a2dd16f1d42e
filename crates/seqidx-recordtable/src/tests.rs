use super::*;
use seqidx_format::RecordingErrorSink;

/// Small record region: 2 sectors of 64 bytes (48 payload + 4 checksum) so
/// only a handful of 16-byte slots fit per sector, letting tests force an
/// `IndexFull` condition without allocating a real 4 KiB region.
const TEST_SECTOR_SIZE: usize = 64;
const TEST_REGION_SECTORS: usize = 2;

struct Fixture {
    buf: Box<[u8]>,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            buf: vec![0u8; TEST_SECTOR_SIZE * TEST_REGION_SECTORS].into_boxed_slice(),
        }
    }

    fn view(&mut self) -> BufferView {
        let len = self.buf.len();
        unsafe { BufferView::new(self.buf.as_mut_ptr(), len) }
    }

    fn table(&self) -> RecordTable {
        RecordTable::with_sector_size(self.buf.len(), TEST_SECTOR_SIZE)
    }
}

#[test]
fn set_then_get_returns_last_written_value() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 42, 1, &sink);
    table.set(view, 42, 2, &sink);

    assert_eq!(table.get(view, 42), Some(2));
    assert!(sink.take().is_empty());
}

#[test]
fn unknown_session_is_not_present() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 1, 10, &sink);
    assert_eq!(table.get(view, 999), None);
}

#[test]
fn distinct_sessions_coexist() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 7, 5, &sink);
    table.set(view, 8, 9, &sink);

    assert_eq!(table.get(view, 7), Some(5));
    assert_eq!(table.get(view, 8), Some(9));
}

#[test]
fn reset_all_clears_every_session() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 7, 5, &sink);
    table.set(view, 8, 9, &sink);
    table.reset_all(view);

    assert_eq!(table.get(view, 7), None);
    assert_eq!(table.get(view, 8), None);
}

#[test]
fn reset_all_is_idempotent() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 7, 5, &sink);
    table.reset_all(view);
    table.reset_all(view);

    assert_eq!(table.get(view, 7), None);
}

#[test]
fn reset_one_zeroes_sequence_but_keeps_session_present() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 100, 17, &sink);
    table.reset_one(view, 100, &sink);

    assert_eq!(table.get(view, 100), Some(0));
}

#[test]
fn overflow_reports_index_full_and_preserves_earlier_placements() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    // 48-byte payload per sector / 16-byte records = 3 slots per sector,
    // 2 sectors = 6 slots total.
    for k in 1..=6u64 {
        table.set(view, k, k as u32, &sink);
    }
    assert!(sink.take().is_empty(), "first 6 placements should all fit");

    table.set(view, 7, 7, &sink);
    let errors = sink.take();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], IndexError::IndexFull { session_id: 7 }));

    for k in 1..=6u64 {
        assert_eq!(table.get(view, k), Some(k as u32));
    }
}

#[test]
fn checksum_corruption_in_one_sector_does_not_affect_others() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    table.set(view, 1, 11, &sink);
    table.set(view, 2, 22, &sink);
    table.update_checksums(view);

    // Flip a byte inside sector 0's payload (where session 1 and 2 live,
    // since both fit in one 48-byte payload of 16-byte slots x3).
    view.as_mut_slice()[0] ^= 0xFF;

    let blanked = table.validate_and_repair(view, &sink);
    assert_eq!(blanked, 1);
    assert_eq!(table.get(view, 1), None);
    assert_eq!(table.get(view, 2), None);
}

#[test]
fn get_finds_a_live_record_past_a_blanked_leading_sector() {
    let mut fx = Fixture::new();
    let mut table = fx.table();
    let sink = RecordingErrorSink::new();
    let view = fx.view();

    // Sessions 1-3 fill sector 0 (3 slots of 16 bytes in its 48-byte
    // payload); sessions 4-6 fill sector 1.
    for k in 1..=6u64 {
        table.set(view, k, k as u32, &sink);
    }
    table.update_checksums(view);

    // Corrupt a byte inside sector 0's payload only.
    view.as_mut_slice()[0] ^= 0xFF;

    let blanked = table.validate_and_repair(view, &sink);
    assert_eq!(blanked, 1);

    // Sector 0's records are lost...
    for k in 1..=3u64 {
        assert_eq!(table.get(view, k), None);
    }
    // ...but the blanked sector leaves a gap, not an end-of-table marker:
    // sector 1's untouched records past it must still be found.
    for k in 4..=6u64 {
        assert_eq!(table.get(view, k), Some(k as u32));
    }
}
