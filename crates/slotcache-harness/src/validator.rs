//! Raw file-format validation.
//!
//! Reads a cache file with plain `std::fs` and checks every on-disk
//! invariant from first principles: its own offset constants, its own FNV
//! and CRC computation, no engine parsing code. Returns the full list of
//! violations so a single run reports everything that is wrong with a file.

use std::collections::HashSet;
use std::path::Path;

const HEADER_LEN: usize = 256;
const BUCKET_LEN: usize = 16;
const MAGIC: &[u8; 4] = b"SLC1";

const OFF_VERSION: usize = 0x04;
const OFF_HEADER_SIZE: usize = 0x06;
const OFF_KEY_SIZE: usize = 0x08;
const OFF_INDEX_SIZE: usize = 0x0C;
const OFF_SLOT_SIZE: usize = 0x10;
const OFF_HASH_ALGO: usize = 0x14;
const OFF_FLAGS: usize = 0x15;
const OFF_SLOT_CAPACITY: usize = 0x18;
const OFF_SLOT_HIGHWATER: usize = 0x20;
const OFF_LIVE_COUNT: usize = 0x28;
const OFF_BUCKET_COUNT: usize = 0x38;
const OFF_GENERATION: usize = 0x40;
const OFF_BUCKET_USED: usize = 0x48;
const OFF_BUCKET_TOMBSTONES: usize = 0x50;
const OFF_SLOTS_OFFSET: usize = 0x58;
const OFF_BUCKETS_OFFSET: usize = 0x60;
const OFF_STATE: usize = 0x68;
const OFF_CRC: usize = 0x70;

fn u16_at(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(bytes[off..off + 2].try_into().expect("2 bytes"))
}

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(bytes[off..off + 4].try_into().expect("4 bytes"))
}

fn u64_at(bytes: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(bytes[off..off + 8].try_into().expect("8 bytes"))
}

fn fnv1a64(key: &[u8]) -> u64 {
    let mut hash = 0xCBF2_9CE4_8422_2325u64;
    for &byte in key {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100_0000_01B3);
    }
    hash
}

/// Validates the file at `path`, returning every violated invariant as a
/// human-readable message. An empty list means the file is well formed.
pub fn validate_file(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(validate_bytes(&std::fs::read(path)?))
}

/// Validates raw file contents. See [`validate_file`].
pub fn validate_bytes(bytes: &[u8]) -> Vec<String> {
    let mut violations = Vec::new();

    if bytes.len() < HEADER_LEN {
        return vec![format!("file is {} bytes, header needs 256", bytes.len())];
    }
    if &bytes[0..4] != MAGIC {
        violations.push("magic is not SLC1".to_string());
        return violations;
    }
    if u16_at(bytes, OFF_VERSION) != 1 {
        violations.push(format!("format version {}", u16_at(bytes, OFF_VERSION)));
    }
    if u16_at(bytes, OFF_HEADER_SIZE) != 256 {
        violations.push(format!("header size {}", u16_at(bytes, OFF_HEADER_SIZE)));
    }
    if bytes[OFF_HASH_ALGO] != 1 {
        violations.push(format!("hash algorithm {}", bytes[OFF_HASH_ALGO]));
    }
    let flags = bytes[OFF_FLAGS];
    if flags & !1 != 0 {
        violations.push(format!("unknown flag bits {flags:#04x}"));
    }
    let state = bytes[OFF_STATE];
    if state > 1 {
        violations.push(format!("state byte {state}"));
    }
    if bytes[0x16..0x18].iter().any(|&b| b != 0)
        || bytes[OFF_STATE + 1..OFF_STATE + 8].iter().any(|&b| b != 0)
        || bytes[OFF_CRC + 4..OFF_CRC + 8].iter().any(|&b| b != 0)
        || bytes[0xC0..HEADER_LEN].iter().any(|&b| b != 0)
    {
        violations.push("reserved header bytes are not zero".to_string());
    }

    // CRC32-C over the header with generation and CRC zeroed.
    let mut copy = [0u8; HEADER_LEN];
    copy.copy_from_slice(&bytes[..HEADER_LEN]);
    copy[OFF_GENERATION..OFF_GENERATION + 8].fill(0);
    copy[OFF_CRC..OFF_CRC + 4].fill(0);
    if crc32c::crc32c(&copy) != u32_at(bytes, OFF_CRC) {
        violations.push("header CRC mismatch".to_string());
    }

    let generation = u64_at(bytes, OFF_GENERATION);
    if generation % 2 != 0 {
        violations.push(format!("generation {generation} is odd"));
    }

    let key_size = u32_at(bytes, OFF_KEY_SIZE) as usize;
    let index_size = u32_at(bytes, OFF_INDEX_SIZE) as usize;
    let slot_size = u32_at(bytes, OFF_SLOT_SIZE) as usize;
    if key_size == 0 || key_size > 512 {
        violations.push(format!("key_size {key_size}"));
        return violations;
    }
    let key_pad = (8 - key_size % 8) % 8;
    let derived_slot_size = (8 + key_size + key_pad + 8 + index_size + 7) & !7;
    if slot_size != derived_slot_size {
        violations.push(format!(
            "slot_size {slot_size}, derived {derived_slot_size}"
        ));
        return violations;
    }

    let slot_capacity = u64_at(bytes, OFF_SLOT_CAPACITY);
    let slot_highwater = u64_at(bytes, OFF_SLOT_HIGHWATER);
    let live_count = u64_at(bytes, OFF_LIVE_COUNT);
    let bucket_count = u64_at(bytes, OFF_BUCKET_COUNT);
    let bucket_used = u64_at(bytes, OFF_BUCKET_USED);
    let bucket_tombstones = u64_at(bytes, OFF_BUCKET_TOMBSTONES);

    if !(live_count <= slot_highwater && slot_highwater <= slot_capacity) {
        violations.push(format!(
            "counter order violated: live {live_count}, highwater {slot_highwater}, capacity {slot_capacity}"
        ));
        return violations;
    }
    if !bucket_count.is_power_of_two() || bucket_count < 2 || bucket_count <= slot_capacity {
        violations.push(format!(
            "bucket_count {bucket_count} for capacity {slot_capacity}"
        ));
        return violations;
    }
    if bucket_used != live_count {
        violations.push(format!(
            "bucket_used {bucket_used} != live_count {live_count}"
        ));
    }
    if bucket_used + bucket_tombstones >= bucket_count {
        violations.push(format!(
            "no EMPTY bucket: used {bucket_used} + tombstones {bucket_tombstones} >= {bucket_count}"
        ));
    }

    if u64_at(bytes, OFF_SLOTS_OFFSET) != 256 {
        violations.push("slots_offset is not 256".to_string());
    }
    let buckets_offset = u64_at(bytes, OFF_BUCKETS_OFFSET);
    let derived_buckets_offset = slot_capacity
        .checked_mul(slot_size as u64)
        .and_then(|n| n.checked_add(256));
    if Some(buckets_offset) != derived_buckets_offset {
        violations.push(format!(
            "buckets_offset {buckets_offset}, derived {derived_buckets_offset:?}"
        ));
        return violations;
    }
    let needed = bucket_count
        .checked_mul(BUCKET_LEN as u64)
        .and_then(|n| n.checked_add(buckets_offset))
        .unwrap_or(u64::MAX);
    if (bytes.len() as u64) < needed {
        violations.push(format!("file is {} bytes, layout needs {needed}", bytes.len()));
        return violations;
    }

    let slot_at = |slot_id: u64| -> &[u8] {
        let off = 256 + slot_id as usize * slot_size;
        &bytes[off..off + slot_size]
    };

    // Slot region: meta reserved bits, zero pads, ordered keys, and the
    // all-zero tail past the highwater mark.
    let mut live_slots = HashSet::new();
    let mut previous_key: Option<&[u8]> = None;
    let ordered = flags & 1 == 1;
    for slot_id in 0..slot_highwater {
        let slot = slot_at(slot_id);
        let meta = u64::from_le_bytes(slot[..8].try_into().expect("8 bytes"));
        if meta & !1 != 0 {
            violations.push(format!("slot {slot_id}: reserved meta bits {meta:#x}"));
        }
        if meta & 1 == 1 {
            live_slots.insert(slot_id);
        }
        if slot[8 + key_size..8 + key_size + key_pad]
            .iter()
            .any(|&b| b != 0)
        {
            violations.push(format!("slot {slot_id}: key padding not zero"));
        }
        let payload_end = 8 + key_size + key_pad + 8 + index_size;
        if slot[payload_end..].iter().any(|&b| b != 0) {
            violations.push(format!("slot {slot_id}: trailing padding not zero"));
        }
        let key = &slot[8..8 + key_size];
        if ordered {
            if let Some(prev) = previous_key {
                if key < prev {
                    violations.push(format!("slot {slot_id}: key below predecessor"));
                }
            }
            previous_key = Some(key);
        }
    }
    if live_slots.len() as u64 != live_count {
        violations.push(format!(
            "{} live slots, header says {live_count}",
            live_slots.len()
        ));
    }
    for slot_id in slot_highwater..slot_capacity {
        if slot_at(slot_id).iter().any(|&b| b != 0) {
            violations.push(format!("unallocated slot {slot_id} is not zero"));
            break;
        }
    }

    // Directory: state counts, hash integrity, and the live-slot bijection.
    let mut full = 0u64;
    let mut tombstones = 0u64;
    let mut referenced = HashSet::new();
    for bucket in 0..bucket_count {
        let off = buckets_offset as usize + bucket as usize * BUCKET_LEN;
        let hash = u64_at(bytes, off);
        let slot_plus_one = u64_at(bytes, off + 8);
        match slot_plus_one {
            0 => {}
            u64::MAX => tombstones += 1,
            n => {
                full += 1;
                let slot_id = n - 1;
                if slot_id >= slot_highwater {
                    violations.push(format!(
                        "bucket {bucket} references unallocated slot {slot_id}"
                    ));
                    continue;
                }
                if !live_slots.contains(&slot_id) {
                    violations.push(format!(
                        "bucket {bucket} references tombstoned slot {slot_id}"
                    ));
                    continue;
                }
                if !referenced.insert(slot_id) {
                    violations.push(format!("slot {slot_id} referenced by multiple buckets"));
                }
                let key = &slot_at(slot_id)[8..8 + key_size];
                if fnv1a64(key) != hash {
                    violations.push(format!("bucket {bucket}: stored hash mismatch"));
                }
            }
        }
    }
    if full != bucket_used {
        violations.push(format!("{full} FULL buckets, header says {bucket_used}"));
    }
    if tombstones != bucket_tombstones {
        violations.push(format!(
            "{tombstones} TOMBSTONE buckets, header says {bucket_tombstones}"
        ));
    }
    if referenced.len() != live_slots.len() {
        violations.push(format!(
            "{} live slots but {} referenced by buckets",
            live_slots.len(),
            referenced.len()
        ));
    }

    violations
}
