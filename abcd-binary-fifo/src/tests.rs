// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;

fn at(seconds: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seconds)
}

fn at_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(1_700_000_000_000 + millis)
}

#[test]
fn get_data_is_a_half_open_window_in_insertion_order() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_at(b"a".to_vec(), at_millis(0));
    fifo.push_at(b"b".to_vec(), at_millis(1_000));
    fifo.push_at(b"c".to_vec(), at_millis(2_000));

    let window = fifo.get_data(at_millis(500), at_millis(1_500));
    assert_eq!(window, vec![b"b".to_vec()]);

    // The upper bound is exclusive, the lower bound inclusive.
    let window = fifo.get_data(at_millis(1_000), at_millis(2_000));
    assert_eq!(window, vec![b"b".to_vec()]);

    let all = fifo.get_data(UNIX_EPOCH, at_millis(10_000));
    assert_eq!(all, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn update_pops_only_expired_entries_from_the_front() {
    let mut fifo = BinaryFifo::new(Duration::from_secs(3600));
    let now = SystemTime::now();
    fifo.push_at(b"old".to_vec(), now - Duration::from_secs(7200));
    fifo.push_at(b"fresh".to_vec(), now - Duration::from_secs(10));
    fifo.push_at(b"new".to_vec(), now);

    fifo.update();
    assert_eq!(fifo.count(), 2);
    assert_eq!(fifo.size(), b"fresh".len() + b"new".len());

    // Idempotent.
    fifo.update();
    assert_eq!(fifo.count(), 2);
}

#[test]
fn zero_expiration_retains_everything() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    let now = SystemTime::now();
    fifo.push_at(b"ancient".to_vec(), now - Duration::from_secs(1_000_000));
    fifo.update();
    assert_eq!(fifo.count(), 1);
}

#[test]
fn push_vector_stamps_every_payload() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_vector(vec![b"x".to_vec(), b"y".to_vec()]);
    assert_eq!(fifo.count(), 2);
    let stamps = fifo.get_timestamps(UNIX_EPOCH, SystemTime::now() + Duration::from_secs(1));
    assert_eq!(stamps.len(), 2);
    assert_eq!(stamps[0], stamps[1]);
}

#[test]
fn save_and_load_round_trip() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_at(b"first".to_vec(), at(0));
    fifo.push_at(b"second".to_vec(), at(1));
    fifo.push_at(vec![0u8, 255, 32, 10], at(2));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.bin");
    fifo.save_to_file(&path, at(0), at(10)).unwrap();

    let mut reloaded = BinaryFifo::new(Duration::ZERO);
    reloaded.load_from_file(&path).unwrap();
    assert_eq!(reloaded.count(), 3);
    assert_eq!(
        reloaded.get_data(UNIX_EPOCH, at(10)),
        fifo.get_data(UNIX_EPOCH, at(10))
    );
    assert_eq!(
        reloaded.get_timestamps(UNIX_EPOCH, at(10)),
        fifo.get_timestamps(UNIX_EPOCH, at(10))
    );
}

#[test]
fn save_respects_the_window() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_at(b"outside".to_vec(), at(0));
    fifo.push_at(b"inside".to_vec(), at(5));
    fifo.push_at(b"beyond".to_vec(), at(9));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("window.bin");
    fifo.save_to_file(&path, at(1), at(9)).unwrap();

    let mut reloaded = BinaryFifo::new(Duration::ZERO);
    reloaded.load_from_file(&path).unwrap();
    assert_eq!(reloaded.get_data(UNIX_EPOCH, at(10)), vec![b"inside".to_vec()]);
}

#[test]
fn concatenated_files_load_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let early = dir.path().join("early.bin");
    let late = dir.path().join("late.bin");

    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_at(b"t0".to_vec(), at(0));
    fifo.push_at(b"t2".to_vec(), at(2));
    fifo.save_to_file(&early, at(0), at(10)).unwrap();

    let mut other = BinaryFifo::new(Duration::ZERO);
    other.push_at(b"t1".to_vec(), at(1));
    other.save_to_file(&late, at(0), at(10)).unwrap();

    // Loading the two dumps out of order must still yield a sorted buffer.
    let mut merged = BinaryFifo::new(Duration::ZERO);
    merged.load_from_file(&late).unwrap();
    merged.load_from_file(&early).unwrap();
    assert_eq!(
        merged.get_data(UNIX_EPOCH, at(10)),
        vec![b"t0".to_vec(), b"t1".to_vec(), b"t2".to_vec()]
    );
}

#[test]
fn truncated_trailing_record_is_discarded() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_at(b"whole".to_vec(), at(0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.bin");
    fifo.save_to_file(&path, at(0), at(10)).unwrap();

    // Append a record header that claims more bytes than follow.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(&nanos_since_epoch(at(1)).to_le_bytes());
    bytes.extend_from_slice(&1000u64.to_le_bytes());
    bytes.extend_from_slice(b"short");
    std::fs::write(&path, &bytes).unwrap();

    let mut reloaded = BinaryFifo::new(Duration::ZERO);
    reloaded.load_from_file(&path).unwrap();
    assert_eq!(reloaded.get_data(UNIX_EPOCH, at(10)), vec![b"whole".to_vec()]);
}

#[test]
fn record_layout_is_stamp_length_payload() {
    let mut fifo = BinaryFifo::new(Duration::ZERO);
    fifo.push_at(b"ab".to_vec(), at(0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.bin");
    fifo.save_to_file(&path, at(0), at(10)).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 8 + 8 + 2);
    assert_eq!(
        i64::from_le_bytes(bytes[0..8].try_into().unwrap()),
        nanos_since_epoch(at(0))
    );
    assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 2);
    assert_eq!(&bytes[16..], b"ab");
}
