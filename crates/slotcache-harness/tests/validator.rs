//! The validator must accept engine-produced files and flag hand-made
//! corruption, including damage in regions the header CRC cannot see.

use slotcache::{Cache, Options};
use slotcache_harness::validator::{validate_bytes, validate_file};
use tempfile::TempDir;

fn build_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("v.slc");
    let cache = Cache::open(&path, Options::new(8, 4, 16)).expect("create");
    let mut writer = cache.writer().expect("writer");
    for n in 1u8..=5 {
        writer
            .put(&[0, 0, 0, 0, 0, 0, 0, n], i64::from(n), &[n; 4])
            .expect("put");
    }
    writer.commit().expect("commit");

    let mut writer = cache.writer().expect("writer");
    writer.delete(&[0, 0, 0, 0, 0, 0, 0, 2]).expect("delete");
    writer.commit().expect("commit");
    cache.close().expect("close");
    path
}

#[test]
fn engine_output_is_valid() {
    let dir = TempDir::new().unwrap();
    let path = build_file(&dir);
    let violations = validate_file(&path).unwrap();
    assert!(violations.is_empty(), "{violations:?}");
}

#[test]
fn empty_and_invalidated_files_are_valid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("e.slc");
    let cache = Cache::open(&path, Options::new(4, 0, 4)).unwrap();
    assert!(validate_file(&path).unwrap().is_empty());

    cache.invalidate().unwrap();
    assert!(validate_file(&path).unwrap().is_empty());
}

#[test]
fn short_file_is_flagged() {
    assert!(!validate_bytes(&[0u8; 64]).is_empty());
}

#[test]
fn header_damage_breaks_the_crc() {
    let dir = TempDir::new().unwrap();
    let path = build_file(&dir);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0x28] ^= 1; // live_count
    let violations = validate_bytes(&bytes);
    assert!(violations.iter().any(|v| v.contains("CRC")), "{violations:?}");
}

#[test]
fn odd_generation_is_flagged() {
    let dir = TempDir::new().unwrap();
    let path = build_file(&dir);
    let mut bytes = std::fs::read(&path).unwrap();
    // Generation is outside the CRC, so this is the only finding.
    bytes[0x40] ^= 1;
    let violations = validate_bytes(&bytes);
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert!(violations[0].contains("odd"));
}

#[test]
fn slot_damage_is_found_without_crc_help() {
    let dir = TempDir::new().unwrap();
    let path = build_file(&dir);
    let mut bytes = std::fs::read(&path).unwrap();

    // Clear the live bit of slot 0 behind the directory's back.
    let slot0_meta = 256;
    bytes[slot0_meta] &= !1;
    let violations = validate_bytes(&bytes);
    assert!(
        violations
            .iter()
            .any(|v| v.contains("tombstoned slot") || v.contains("live slots")),
        "{violations:?}"
    );
}

#[test]
fn bucket_hash_mismatch_is_found() {
    let dir = TempDir::new().unwrap();
    let path = build_file(&dir);
    let mut bytes = std::fs::read(&path).unwrap();

    // slot_size = 32, capacity = 16: buckets start at 256 + 512.
    let buckets_offset = 256 + 16 * 32;
    // Find the first FULL bucket and damage its stored hash.
    for bucket in 0..32usize {
        let off = buckets_offset + bucket * 16;
        let slot_plus_one = u64::from_le_bytes(bytes[off + 8..off + 16].try_into().unwrap());
        if slot_plus_one != 0 && slot_plus_one != u64::MAX {
            bytes[off] ^= 0xFF;
            break;
        }
    }
    let violations = validate_bytes(&bytes);
    assert!(
        violations.iter().any(|v| v.contains("hash mismatch")),
        "{violations:?}"
    );
}

#[test]
fn dirt_past_the_highwater_mark_is_found() {
    let dir = TempDir::new().unwrap();
    let path = build_file(&dir);
    let mut bytes = std::fs::read(&path).unwrap();

    // 5 slots allocated; slot 10 must be all zero.
    let slot10 = 256 + 10 * 32;
    bytes[slot10 + 12] = 0xAA;
    let violations = validate_bytes(&bytes);
    assert!(
        violations.iter().any(|v| v.contains("unallocated slot")),
        "{violations:?}"
    );
}

#[test]
fn ordered_file_with_descending_keys_is_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("o.slc");
    let cache = Cache::open(&path, Options::new(8, 0, 8).ordered(true)).unwrap();
    let mut writer = cache.writer().unwrap();
    writer.put(&[0, 0, 0, 0, 0, 0, 0, 1], 1, &[]).unwrap();
    writer.put(&[0, 0, 0, 0, 0, 0, 0, 2], 2, &[]).unwrap();
    writer.commit().unwrap();
    cache.close().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    // Swap the two keys' last bytes so slot order is descending.
    let (slot0_key_end, slot1_key_end) = (256 + 8 + 7, 256 + 24 + 8 + 7);
    bytes[slot0_key_end] = 2;
    bytes[slot1_key_end] = 1;
    let violations = validate_bytes(&bytes);
    assert!(
        violations.iter().any(|v| v.contains("below predecessor")),
        "{violations:?}"
    );
}
