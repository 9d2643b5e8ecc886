//! End-to-end tests of the engine through its public API.

use slotcache::{Cache, CacheError, ErrorKind, MatchSpec, Options, ScanOptions, Writeback};
use tempfile::TempDir;

fn cache_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("cache.slc")
}

fn base_options() -> Options {
    Options::new(8, 4, 64)
}

fn key(n: u8) -> [u8; 8] {
    [0, 0, 0, 0, 0, 0, 0, n]
}

fn put_one(cache: &Cache, k: &[u8], revision: i64, index: &[u8]) {
    let mut writer = cache.writer().expect("writer");
    writer.put(k, revision, index).expect("put");
    writer.commit().expect("commit");
}

#[test]
fn basic_roundtrip() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();

    let k = [1, 2, 3, 4, 5, 6, 7, 8];
    put_one(&cache, &k, 1, &[0xAA, 0xBB, 0xCC, 0xDD]);

    let entry = cache.get(&k).unwrap().expect("present");
    assert_eq!(entry.key.as_ref(), &k);
    assert_eq!(entry.revision, 1);
    assert_eq!(entry.index.as_ref(), &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(cache.len().unwrap(), 1);

    let all = cache.scan(ScanOptions::new()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0], entry);
}

#[test]
fn update_in_place_reuses_the_slot() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    let k = [1, 2, 3, 4, 5, 6, 7, 8];

    put_one(&cache, &k, 1, &[0xAA, 0xBB, 0xCC, 0xDD]);
    put_one(&cache, &k, 2, &[1, 2, 3, 4]);

    let entry = cache.get(&k).unwrap().expect("present");
    assert_eq!(entry.revision, 2);
    assert_eq!(entry.index.as_ref(), &[1, 2, 3, 4]);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.slot_highwater, 1);
    assert_eq!(stats.live_count, 1);
}

#[test]
fn delete_then_reinsert_appends_a_new_slot() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    let k = [1, 2, 3, 4, 5, 6, 7, 8];

    put_one(&cache, &k, 1, &[0xAA, 0xBB, 0xCC, 0xDD]);

    let mut writer = cache.writer().unwrap();
    assert!(writer.delete(&k).unwrap());
    writer.commit().unwrap();
    assert_eq!(cache.len().unwrap(), 0);

    put_one(&cache, &k, 3, &[0, 0, 0, 0]);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.slot_highwater, 2);
    assert_eq!(stats.live_count, 1);

    let all = cache.scan(ScanOptions::new()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].revision, 3);
}

#[test]
fn capacity_boundary_fails_full_and_discards() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), Options::new(8, 4, 2)).unwrap();

    put_one(&cache, &key(1), 1, &[0; 4]);
    put_one(&cache, &key(2), 2, &[0; 4]);

    let mut writer = cache.writer().unwrap();
    writer.put(&key(3), 3, &[0; 4]).unwrap();
    let err = writer.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Full);
    assert_eq!(cache.len().unwrap(), 2);

    // Updating an existing key still works at full capacity.
    put_one(&cache, &key(1), 9, &[1; 4]);
    assert_eq!(cache.get(&key(1)).unwrap().unwrap().revision, 9);
}

#[test]
fn ordered_mode_rejects_out_of_order_insert() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options().ordered(true)).unwrap();

    put_one(&cache, &key(1), 1, &[0; 4]);
    put_one(&cache, &key(2), 2, &[0; 4]);

    let mut writer = cache.writer().unwrap();
    writer.put(&key(0), 3, &[0; 4]).unwrap();
    let err = writer.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfOrderInsert);
    assert_eq!(cache.len().unwrap(), 2);

    let entries = cache
        .scan_range(None, None, ScanOptions::new())
        .unwrap();
    let keys: Vec<&[u8]> = entries.iter().map(|e| e.key.as_ref()).collect();
    assert_eq!(keys, vec![&key(1)[..], &key(2)[..]]);
}

#[test]
fn ordered_mode_allows_tail_equal_and_updates() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options().ordered(true)).unwrap();

    put_one(&cache, &key(5), 1, &[0; 4]);
    // Updating a smaller existing key is not an insert and is always fine.
    put_one(&cache, &key(5), 2, &[1; 4]);

    // Deleting the tail then re-inserting the same key appends key(5) at
    // the tail again, which satisfies the nondecreasing rule.
    let mut writer = cache.writer().unwrap();
    writer.delete(&key(5)).unwrap();
    writer.commit().unwrap();
    put_one(&cache, &key(5), 3, &[2; 4]);
    assert_eq!(cache.get(&key(5)).unwrap().unwrap().revision, 3);
}

#[test]
fn ordered_mode_multi_insert_commit_applies_sorted() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options().ordered(true)).unwrap();

    let mut writer = cache.writer().unwrap();
    // Buffered out of order; the commit must append them sorted.
    writer.put(&key(4), 1, &[0; 4]).unwrap();
    writer.put(&key(2), 2, &[0; 4]).unwrap();
    writer.put(&key(9), 3, &[0; 4]).unwrap();
    writer.commit().unwrap();

    let entries = cache.scan(ScanOptions::new()).unwrap();
    let keys: Vec<&[u8]> = entries.iter().map(|e| e.key.as_ref()).collect();
    assert_eq!(keys, vec![&key(2)[..], &key(4)[..], &key(9)[..]]);
}

#[test]
fn invalidate_is_terminal_and_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    let cache = Cache::open(&path, base_options()).unwrap();
    let k = [1, 2, 3, 4, 5, 6, 7, 8];
    put_one(&cache, &k, 1, &[0xAA, 0xBB, 0xCC, 0xDD]);

    cache.invalidate().unwrap();

    assert_eq!(cache.get(&k).unwrap_err().kind(), ErrorKind::Invalidated);
    assert_eq!(cache.len().unwrap_err().kind(), ErrorKind::Invalidated);
    assert_eq!(
        cache.scan(ScanOptions::new()).unwrap_err().kind(),
        ErrorKind::Invalidated
    );
    assert_eq!(cache.writer().unwrap_err().kind(), ErrorKind::Invalidated);
    assert_eq!(cache.invalidate().unwrap_err().kind(), ErrorKind::Invalidated);

    let reopened = Cache::open(&path, base_options()).unwrap();
    assert_eq!(reopened.len().unwrap_err().kind(), ErrorKind::Invalidated);
}

#[test]
fn reopen_is_observationally_equivalent() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);

    let cache = Cache::open(&path, base_options()).unwrap();
    put_one(&cache, &key(1), 1, &[1; 4]);
    put_one(&cache, &key(2), 2, &[2; 4]);
    let mut writer = cache.writer().unwrap();
    writer.set_user_header_flags(0x77).unwrap();
    writer.commit().unwrap();

    let before = cache.scan(ScanOptions::new()).unwrap();
    let len_before = cache.len().unwrap();
    let user_before = cache.user_header().unwrap();
    cache.close().unwrap();

    let reopened = Cache::open(&path, base_options()).unwrap();
    assert_eq!(reopened.len().unwrap(), len_before);
    assert_eq!(reopened.scan(ScanOptions::new()).unwrap(), before);
    assert_eq!(reopened.user_header().unwrap(), user_before);
}

#[test]
fn last_write_wins_within_a_session() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    let k = key(1);

    let mut writer = cache.writer().unwrap();
    writer.put(&k, 1, &[1; 4]).unwrap();
    writer.put(&k, 2, &[2; 4]).unwrap();
    writer.commit().unwrap();

    let entry = cache.get(&k).unwrap().unwrap();
    assert_eq!(entry.revision, 2);
    assert_eq!(entry.index.as_ref(), &[2; 4]);
    assert_eq!(cache.stats().unwrap().slot_highwater, 1);
}

#[test]
fn delete_reports_existence_across_the_buffer() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    put_one(&cache, &key(1), 1, &[0; 4]);

    let mut writer = cache.writer().unwrap();
    assert!(writer.delete(&key(1)).unwrap(), "committed key");
    assert!(!writer.delete(&key(1)).unwrap(), "already deleted in buffer");
    writer.put(&key(1), 2, &[0; 4]).unwrap();
    assert!(writer.delete(&key(1)).unwrap(), "buffered put");
    assert!(!writer.delete(&key(2)).unwrap(), "never existed");
    writer.close();

    // The session was discarded, so the committed key is still there.
    assert_eq!(cache.len().unwrap(), 1);
}

#[test]
fn writer_close_discards_everything() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();

    let mut writer = cache.writer().unwrap();
    writer.put(&key(1), 1, &[0; 4]).unwrap();
    writer.set_user_header_flags(5).unwrap();
    writer.close();

    assert_eq!(cache.len().unwrap(), 0);
    assert_eq!(cache.user_header().unwrap().0, 0);
    assert_eq!(cache.stats().unwrap().generation, 0);
}

#[test]
fn writer_exclusion_and_busy_close() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();

    let writer = cache.writer().unwrap();
    assert_eq!(cache.writer().unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(cache.close().unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(cache.invalidate().unwrap_err().kind(), ErrorKind::Busy);
    writer.close();

    // Released: all three work again.
    let writer = cache.writer().unwrap();
    writer.close();
    cache.close().unwrap();
}

#[test]
fn closed_handle_fails_deterministically() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    cache.close().unwrap();
    cache.close().unwrap();

    assert_eq!(cache.len().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(cache.get(&key(1)).unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(cache.writer().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(cache.invalidate().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn incompatible_options_are_rejected_per_field() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    Cache::open(&path, base_options().user_version(3))
        .unwrap()
        .close()
        .unwrap();

    let cases: Vec<Options> = vec![
        Options::new(16, 4, 64).user_version(3),
        Options::new(8, 8, 64).user_version(3),
        Options::new(8, 4, 65).user_version(3),
        base_options().user_version(3).ordered(true),
        base_options().user_version(4),
    ];
    for options in cases {
        let err = Cache::open(&path, options.clone()).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Incompatible,
            "options {options:?} should be incompatible"
        );
    }

    // Matching options still open fine.
    Cache::open(&path, base_options().user_version(3)).unwrap();
}

#[test]
fn scan_pagination_reverse_and_filter() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    for n in 1..=6 {
        put_one(&cache, &key(n), i64::from(n), &[n; 4]);
    }

    let page = cache
        .scan(ScanOptions::new().offset(1).limit(2))
        .unwrap();
    let revs: Vec<i64> = page.iter().map(|e| e.revision).collect();
    assert_eq!(revs, vec![2, 3]);

    let reversed = cache.scan(ScanOptions::new().reverse(true)).unwrap();
    let revs: Vec<i64> = reversed.iter().map(|e| e.revision).collect();
    assert_eq!(revs, vec![6, 5, 4, 3, 2, 1]);

    // Filter runs before pagination: offset skips *matching* entries.
    let odd_page = cache
        .scan(
            ScanOptions::new()
                .filter(|e| e.revision % 2 == 1)
                .offset(1)
                .limit(2),
        )
        .unwrap();
    let revs: Vec<i64> = odd_page.iter().map(|e| e.revision).collect();
    assert_eq!(revs, vec![3, 5]);

    // Offset past the live count is an empty page, not an error.
    assert!(cache.scan(ScanOptions::new().offset(100)).unwrap().is_empty());
}

#[test]
fn scan_prefix_matches_by_leading_bytes() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    put_one(&cache, b"aa-one-x", 1, &[0; 4]);
    put_one(&cache, b"aa-two-x", 2, &[0; 4]);
    put_one(&cache, b"bb-one-x", 3, &[0; 4]);

    let hits = cache.scan_prefix(b"aa-", ScanOptions::new()).unwrap();
    assert_eq!(hits.len(), 2);

    // A prefix of the full key width matches exactly one key.
    let exact = cache.scan_prefix(b"bb-one-x", ScanOptions::new()).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].revision, 3);

    assert_eq!(
        cache
            .scan_prefix(b"", ScanOptions::new())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        cache
            .scan_prefix(b"aaaaaaaaa", ScanOptions::new())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
fn scan_match_compares_partial_bits() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    put_one(&cache, &[0xAB, 0xC0, 0, 0, 0, 0, 0, 1], 1, &[0; 4]);
    put_one(&cache, &[0xAB, 0xFF, 0, 0, 0, 0, 0, 2], 2, &[0; 4]);
    put_one(&cache, &[0xAB, 0x40, 0, 0, 0, 0, 0, 3], 3, &[0; 4]);

    // First 10 bits: 0xAB then the top two bits `11`.
    let spec = MatchSpec {
        offset: 0,
        bits: 10,
        bytes: vec![0xAB, 0b1100_0000],
    };
    let hits = cache.scan_match(&spec, ScanOptions::new()).unwrap();
    let revs: Vec<i64> = hits.iter().map(|e| e.revision).collect();
    assert_eq!(revs, vec![1, 2]);

    // Byte-aligned match at an interior offset.
    let spec = MatchSpec {
        offset: 7,
        bits: 0,
        bytes: vec![3],
    };
    let hits = cache.scan_match(&spec, ScanOptions::new()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].revision, 3);
}

#[test]
fn scan_range_padding_and_validation() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options().ordered(true)).unwrap();
    for n in [1u8, 3, 5] {
        put_one(&cache, &[n, 9, 9, 9, 9, 9, 9, 9], i64::from(n), &[0; 4]);
    }

    // Bounds shorter than the key are right-padded with zeros: [03..05)
    // keeps key 3 (03 09 ... >= 03 00 ...) and drops key 5.
    let hits = cache
        .scan_range(Some(&[3]), Some(&[5]), ScanOptions::new())
        .unwrap();
    let revs: Vec<i64> = hits.iter().map(|e| e.revision).collect();
    assert_eq!(revs, vec![3]);

    // Unbounded on both sides equals a plain scan.
    let all = cache.scan_range(None, None, ScanOptions::new()).unwrap();
    assert_eq!(all, cache.scan(ScanOptions::new()).unwrap());

    assert_eq!(
        cache
            .scan_range(Some(&[5]), Some(&[3]), ScanOptions::new())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        cache
            .scan_range(Some(&[0; 9]), None, ScanOptions::new())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
fn scan_range_requires_ordered_keys() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    assert_eq!(
        cache
            .scan_range(None, None, ScanOptions::new())
            .unwrap_err()
            .kind(),
        ErrorKind::Unordered
    );
}

#[test]
fn user_header_is_staged_and_persisted() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    let cache = Cache::open(&path, base_options()).unwrap();

    let mut data = [0u8; 64];
    data[..5].copy_from_slice(b"hello");
    let mut writer = cache.writer().unwrap();
    writer.set_user_header_flags(0xF00D).unwrap();
    writer.set_user_header_data(&data).unwrap();
    writer.commit().unwrap();

    assert_eq!(cache.user_header().unwrap(), (0xF00D, data));
    cache.close().unwrap();

    let reopened = Cache::open(&path, base_options()).unwrap();
    assert_eq!(reopened.user_header().unwrap(), (0xF00D, data));
}

#[test]
fn wrong_key_length_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();

    assert_eq!(
        cache.get(b"short").unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    let mut writer = cache.writer().unwrap();
    assert_eq!(
        writer.put(b"short", 1, &[0; 4]).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        writer.put(&key(1), 1, &[0; 3]).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        writer.delete(b"short").unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
fn zero_width_index_is_supported() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), Options::new(8, 0, 8)).unwrap();
    put_one(&cache, &key(1), 7, &[]);
    let entry = cache.get(&key(1)).unwrap().unwrap();
    assert_eq!(entry.revision, 7);
    assert!(entry.index.is_empty());
}

#[test]
fn corrupted_header_is_rejected_on_open() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    let cache = Cache::open(&path, base_options()).unwrap();
    put_one(&cache, &key(1), 1, &[0; 4]);
    cache.close().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0x28] ^= 0xFF; // live_count field
    std::fs::write(&path, &bytes).unwrap();

    let err = Cache::open(&path, base_options()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn odd_generation_is_rejected_as_interrupted_commit() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    Cache::open(&path, base_options()).unwrap().close().unwrap();

    // The CRC deliberately excludes the generation, so an odd generation is
    // the only signal of a crash mid-commit.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0x40] = 1;
    std::fs::write(&path, &bytes).unwrap();

    let err = Cache::open(&path, base_options()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
    assert!(matches!(err, CacheError::Corrupt { ref reason } if reason.contains("generation")));
}

#[test]
fn truncated_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    Cache::open(&path, base_options()).unwrap().close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = Cache::open(&path, base_options()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn empty_commit_still_advances_the_generation() {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(cache_path(&dir), base_options()).unwrap();
    assert_eq!(cache.stats().unwrap().generation, 0);

    let writer = cache.writer().unwrap();
    writer.commit().unwrap();
    assert_eq!(cache.stats().unwrap().generation, 2);
}

#[test]
fn writeback_policies_commit_identically() {
    for policy in [Writeback::None, Writeback::Metadata, Writeback::Data] {
        let dir = TempDir::new().unwrap();
        let path = cache_path(&dir);
        let cache = Cache::open(&path, base_options().writeback(policy)).unwrap();
        put_one(&cache, &key(1), 1, &[9; 4]);
        put_one(&cache, &key(2), 2, &[8; 4]);
        let mut writer = cache.writer().unwrap();
        writer.delete(&key(1)).unwrap();
        writer.commit().unwrap();
        cache.close().unwrap();

        let reopened = Cache::open(&path, base_options().writeback(policy)).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert_eq!(reopened.get(&key(2)).unwrap().unwrap().revision, 2);
    }
}

#[test]
fn inspect_reads_configuration_without_a_handle() {
    let dir = TempDir::new().unwrap();
    let path = cache_path(&dir);
    Cache::open(&path, base_options().ordered(true).user_version(42))
        .unwrap()
        .close()
        .unwrap();

    let header = Cache::inspect(&path).unwrap();
    assert_eq!(header.key_size, 8);
    assert_eq!(header.index_size, 4);
    assert_eq!(header.slot_capacity, 64);
    assert!(header.ordered_keys);
    assert_eq!(header.user_version, 42);
}
