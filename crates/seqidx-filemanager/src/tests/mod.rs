use super::*;
use seqidx_format::NullErrorSink;
use tempfile::tempdir;

const TEST_SECTOR_SIZE_SECTORS: u64 = 10;
const FILE_CAPACITY: u64 = seqidx_format::SECTOR_SIZE as u64 * TEST_SECTOR_SIZE_SECTORS;
const RECORD_REGION_LEN: u64 = seqidx_format::SECTOR_SIZE as u64 * 9;
const POSITION_REGION_LEN: u64 = seqidx_format::SECTOR_SIZE as u64 * 1;

#[test]
fn opening_a_fresh_directory_creates_a_blank_index_and_writable_file() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("seqidx.dat");
    let sink = NullErrorSink;

    let (manager, bytes, outcome) = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.source, RecoverySource::Blank);
    assert!(!outcome.schema_mismatch);
    assert_eq!(bytes.len() as u64, FILE_CAPACITY);
    assert!(manager.index_path().exists());
    assert!(manager.writable_path().exists());

    let header = MessageHeader::read_from(&bytes);
    assert!(header.matches_current());
}

#[test]
fn reopening_an_existing_index_recovers_its_content() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("seqidx.dat");
    let sink = NullErrorSink;

    let (mut manager, mut bytes, _) = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    )
    .unwrap();

    LittleEndian::write_u64(&mut bytes[seqidx_format::MESSAGE_HEADER_SIZE..], 0xDEAD_BEEF);
    manager.flush(&bytes).unwrap();
    drop(manager);

    let (_, recovered, outcome) = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.source, RecoverySource::Index);
    assert_eq!(
        LittleEndian::read_u64(&recovered[seqidx_format::MESSAGE_HEADER_SIZE..]),
        0xDEAD_BEEF
    );
}

#[test]
fn a_passing_place_left_over_from_a_crashed_flip_is_promoted_on_recovery() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("seqidx.dat");
    let sink = NullErrorSink;

    let (manager, mut bytes, _) = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    )
    .unwrap();
    LittleEndian::write_u64(&mut bytes[seqidx_format::MESSAGE_HEADER_SIZE..], 777);
    drop(manager);

    // Simulate a crash between rename 1 and rename 2: P_index has been
    // renamed away to P_passing, and nothing has taken its place yet.
    let passing_path = {
        let mut name = index_path.clone().into_os_string();
        name.push(".passing");
        PathBuf::from(name)
    };
    fs::rename(&index_path, &passing_path).unwrap();

    let (_, recovered, outcome) = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.source, RecoverySource::PassingPlace);
    assert_eq!(
        LittleEndian::read_u64(&recovered[seqidx_format::MESSAGE_HEADER_SIZE..]),
        777
    );
}

#[test]
fn flush_performs_three_renames_and_swaps_index_and_writable_roles() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("seqidx.dat");
    let sink = NullErrorSink;

    let (mut manager, mut bytes, _) = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    )
    .unwrap();

    LittleEndian::write_u64(&mut bytes[seqidx_format::MESSAGE_HEADER_SIZE..], 1);
    manager.flush(&bytes).unwrap();

    LittleEndian::write_u64(&mut bytes[seqidx_format::MESSAGE_HEADER_SIZE..], 2);
    manager.flush(&bytes).unwrap();

    assert!(manager.index_path().exists());
    assert!(manager.writable_path().exists());
    assert!(!manager.passing_place().exists());

    let on_disk = fs::read(manager.index_path()).unwrap();
    assert_eq!(
        LittleEndian::read_u64(&on_disk[seqidx_format::MESSAGE_HEADER_SIZE..]),
        2
    );
}

#[test]
fn a_size_mismatch_against_the_configured_capacity_is_a_construction_error() {
    let dir = tempdir().unwrap();
    let index_path = dir.path().join("seqidx.dat");
    fs::write(&index_path, vec![0u8; 16]).unwrap();
    let sink = NullErrorSink;

    let result = FileManager::open_or_recover(
        &index_path,
        FILE_CAPACITY,
        RECORD_REGION_LEN,
        POSITION_REGION_LEN,
        &sink,
    );

    assert!(matches!(
        result,
        Err(ConstructionError::SizeMismatch { .. })
    ));
}

#[test]
fn blank_buffer_has_valid_checksums_in_both_regions() {
    let buf = FileManager::blank_buffer(FILE_CAPACITY, RECORD_REGION_LEN, POSITION_REGION_LEN);
    let sink = NullErrorSink;

    let record_framer = SectorFramer::with_default_sector_size(0, RECORD_REGION_LEN as usize);
    let failed = record_framer.validate_checksums(&buf[0..RECORD_REGION_LEN as usize], &sink);
    assert!(failed.is_empty());

    let position_framer = SectorFramer::with_default_sector_size(
        RECORD_REGION_LEN as usize,
        POSITION_REGION_LEN as usize,
    );
    let failed = position_framer.validate_checksums(&buf[RECORD_REGION_LEN as usize..], &sink);
    assert!(failed.is_empty());
}
