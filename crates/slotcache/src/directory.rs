//! The hash-bucket directory: an open-addressed, linearly probed table
//! mapping key hashes to slot ids.
//!
//! Each bucket is 16 bytes: the full FNV-1a 64-bit hash of the key and a
//! `slot_plus_one` reference. `0` marks an EMPTY bucket, all-ones a
//! TOMBSTONE, anything else references slot `slot_plus_one - 1`.
//!
//! Probes start at `hash mod bucket_count` and walk forward one bucket at a
//! time. A probe terminates at a matching FULL bucket (hit), at an EMPTY
//! bucket (miss), or after `bucket_count` steps, which can only happen on a
//! corrupt file since every committed file keeps at least one EMPTY bucket.

use crate::error::{CacheError, Result};
use crate::slots::{Layout, read_slot, slot_key};

const EMPTY: u64 = 0;
const TOMBSTONE: u64 = u64::MAX;

/// Decoded state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bucket {
    Empty,
    Tombstone,
    Full { hash: u64, slot_id: u64 },
}

pub(crate) fn read_bucket(map: &[u8], layout: &Layout, bucket: u64) -> Bucket {
    let off = layout.bucket_offset(bucket);
    let hash = u64::from_le_bytes(map[off..off + 8].try_into().expect("8-byte slice"));
    let slot_plus_one = u64::from_le_bytes(map[off + 8..off + 16].try_into().expect("8-byte slice"));
    match slot_plus_one {
        EMPTY => Bucket::Empty,
        TOMBSTONE => Bucket::Tombstone,
        n => Bucket::Full {
            hash,
            slot_id: n - 1,
        },
    }
}

pub(crate) fn write_full(map: &mut [u8], layout: &Layout, bucket: u64, hash: u64, slot_id: u64) {
    let off = layout.bucket_offset(bucket);
    map[off..off + 8].copy_from_slice(&hash.to_le_bytes());
    map[off + 8..off + 16].copy_from_slice(&(slot_id + 1).to_le_bytes());
}

/// Converts a FULL bucket to a TOMBSTONE. The stale hash bytes are kept;
/// only the reference word distinguishes the states.
pub(crate) fn write_tombstone(map: &mut [u8], layout: &Layout, bucket: u64) {
    let off = layout.bucket_offset(bucket);
    map[off + 8..off + 16].copy_from_slice(&TOMBSTONE.to_le_bytes());
}

/// Outcome of probing for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// The key is present: `bucket` is FULL and references live slot
    /// `slot_id`.
    Hit { bucket: u64, slot_id: u64 },
    /// The key is absent. `insert_at` is where an insert would place it:
    /// the first tombstone seen on the way, or the terminating EMPTY bucket.
    Miss {
        insert_at: u64,
        reusing_tombstone: bool,
    },
}

/// Follows the probe sequence for `key` (whose hash is `hash`).
///
/// `slot_highwater` bounds the slot references a well-formed directory may
/// contain; anything at or above it is corruption, as is a FULL bucket
/// referencing a tombstoned slot or a probe that exhausts the table.
pub(crate) fn probe(
    map: &[u8],
    layout: &Layout,
    slot_highwater: u64,
    key: &[u8],
    hash: u64,
) -> Result<Probe> {
    let mask = layout.bucket_count - 1;
    let mut pos = hash & mask;
    let mut first_tombstone = None;

    for _ in 0..layout.bucket_count {
        match read_bucket(map, layout, pos) {
            Bucket::Empty => {
                return Ok(match first_tombstone {
                    Some(bucket) => Probe::Miss {
                        insert_at: bucket,
                        reusing_tombstone: true,
                    },
                    None => Probe::Miss {
                        insert_at: pos,
                        reusing_tombstone: false,
                    },
                });
            }
            Bucket::Tombstone => {
                first_tombstone.get_or_insert(pos);
            }
            Bucket::Full {
                hash: stored,
                slot_id,
            } => {
                if stored == hash {
                    if slot_id >= slot_highwater {
                        return Err(CacheError::corrupt(format!(
                            "bucket {pos} references unallocated slot {slot_id}"
                        )));
                    }
                    if slot_key(map, layout, slot_id) == key {
                        if !read_slot(map, layout, slot_id).live() {
                            return Err(CacheError::corrupt(format!(
                                "bucket {pos} references tombstoned slot {slot_id}"
                            )));
                        }
                        return Ok(Probe::Hit {
                            bucket: pos,
                            slot_id,
                        });
                    }
                }
            }
        }
        pos = (pos + 1) & mask;
    }

    Err(CacheError::corrupt("probe exhausted without an EMPTY bucket"))
}
