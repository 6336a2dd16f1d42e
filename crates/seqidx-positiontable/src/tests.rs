use super::*;
use seqidx_format::NullErrorSink;

const TEST_SECTOR_SIZE: usize = 64;

fn region(sectors: usize) -> Vec<u8> {
    vec![0u8; TEST_SECTOR_SIZE * sectors]
}

#[test]
fn indexed_up_to_then_read_last_position_returns_latest() {
    let mut buf = region(2);
    let mut table = PositionTable::with_sector_size(0, buf.len(), TEST_SECTOR_SIZE);

    table.indexed_up_to(&mut buf, 1, 100, 500);
    table.indexed_up_to(&mut buf, 1, 100, 900);

    let mut seen = None;
    table.read_last_position(&buf, |tsid, rid, pos| seen = Some((tsid, rid, pos)));
    assert_eq!(seen, Some((1, 100, 900)));
}

#[test]
fn distinct_transport_sessions_are_tracked_independently() {
    let mut buf = region(2);
    let mut table = PositionTable::with_sector_size(0, buf.len(), TEST_SECTOR_SIZE);

    table.indexed_up_to(&mut buf, 1, 10, 50);
    table.indexed_up_to(&mut buf, 2, 20, 999);

    let records = table.iter(&buf);
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.transport_session_id == 1 && r.position == 50));
    assert!(records.iter().any(|r| r.transport_session_id == 2 && r.position == 999));
}

#[test]
fn checksum_corruption_is_isolated_to_its_sector() {
    let mut buf = region(2);
    let mut table = PositionTable::with_sector_size(0, buf.len(), TEST_SECTOR_SIZE);
    let sink = NullErrorSink;

    table.indexed_up_to(&mut buf, 1, 10, 50);
    table.update_checksums(&mut buf);
    buf[0] ^= 0xFF;

    let blanked = table.validate_and_repair(&mut buf, &sink);
    assert_eq!(blanked, 1);
    assert!(table.iter(&buf).is_empty());
}
