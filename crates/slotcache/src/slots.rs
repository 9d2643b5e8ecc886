//! Slot records: the append-only array of fixed-width entries between the
//! header and the bucket directory.
//!
//! A slot is `meta (u64) | key | key_pad | revision (i64) | index | pad`,
//! sized to a multiple of eight bytes. Slots are written once on append;
//! afterwards only the live bit and the payload (revision + index) may
//! change. Key bytes are never rewritten and slots are never reclaimed.

use std::ops::Range;

use crate::header::{BUCKET_LEN, HEADER_LEN, Header, key_pad};

/// Bit 0 of a slot's meta word: 1 = live, 0 = tombstoned.
pub(crate) const META_LIVE: u64 = 1;

/// Precomputed byte geometry of one open file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub key_size: usize,
    pub index_size: usize,
    pub slot_size: usize,
    pub slot_capacity: u64,
    pub bucket_count: u64,
    pub buckets_offset: usize,
}

impl Layout {
    pub fn from_header(header: &Header) -> Layout {
        Layout {
            key_size: header.key_size as usize,
            index_size: header.index_size as usize,
            slot_size: header.slot_size as usize,
            slot_capacity: header.slot_capacity,
            bucket_count: header.bucket_count,
            buckets_offset: header.buckets_offset as usize,
        }
    }

    pub fn slot_offset(&self, slot_id: u64) -> usize {
        debug_assert!(slot_id < self.slot_capacity);
        HEADER_LEN + slot_id as usize * self.slot_size
    }

    fn key_range(&self, slot_id: u64) -> Range<usize> {
        let base = self.slot_offset(slot_id) + 8;
        base..base + self.key_size
    }

    fn revision_offset(&self, slot_id: u64) -> usize {
        self.slot_offset(slot_id) + 8 + self.key_size + key_pad(self.key_size as u32) as usize
    }

    fn index_range(&self, slot_id: u64) -> Range<usize> {
        let base = self.revision_offset(slot_id) + 8;
        base..base + self.index_size
    }

    pub fn bucket_offset(&self, bucket: u64) -> usize {
        debug_assert!(bucket < self.bucket_count);
        self.buckets_offset + bucket as usize * BUCKET_LEN
    }
}

/// Borrowed view of one slot record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotView<'a> {
    pub meta: u64,
    pub key: &'a [u8],
    pub revision: i64,
    pub index: &'a [u8],
}

impl SlotView<'_> {
    pub fn live(&self) -> bool {
        self.meta & META_LIVE != 0
    }
}

pub(crate) fn read_slot<'a>(map: &'a [u8], layout: &Layout, slot_id: u64) -> SlotView<'a> {
    let off = layout.slot_offset(slot_id);
    let meta = u64::from_le_bytes(map[off..off + 8].try_into().expect("8-byte slice"));
    let rev_off = layout.revision_offset(slot_id);
    let revision = i64::from_le_bytes(map[rev_off..rev_off + 8].try_into().expect("8-byte slice"));
    SlotView {
        meta,
        key: &map[layout.key_range(slot_id)],
        revision,
        index: &map[layout.index_range(slot_id)],
    }
}

pub(crate) fn slot_key<'a>(map: &'a [u8], layout: &Layout, slot_id: u64) -> &'a [u8] {
    &map[layout.key_range(slot_id)]
}

/// Writes a complete new record at `slot_id` with the live bit set.
///
/// All pad bytes are written as zero, so the record is bit-exact regardless
/// of what the region held before.
pub(crate) fn write_new_slot(
    map: &mut [u8],
    layout: &Layout,
    slot_id: u64,
    key: &[u8],
    revision: i64,
    index: &[u8],
) {
    debug_assert_eq!(key.len(), layout.key_size);
    debug_assert_eq!(index.len(), layout.index_size);
    let off = layout.slot_offset(slot_id);
    map[off..off + layout.slot_size].fill(0);
    map[off..off + 8].copy_from_slice(&META_LIVE.to_le_bytes());
    map[layout.key_range(slot_id)].copy_from_slice(key);
    let rev_off = layout.revision_offset(slot_id);
    map[rev_off..rev_off + 8].copy_from_slice(&revision.to_le_bytes());
    map[layout.index_range(slot_id)].copy_from_slice(index);
}

/// Overwrites revision and index of an existing slot. Key bytes untouched.
pub(crate) fn update_payload(
    map: &mut [u8],
    layout: &Layout,
    slot_id: u64,
    revision: i64,
    index: &[u8],
) {
    debug_assert_eq!(index.len(), layout.index_size);
    let rev_off = layout.revision_offset(slot_id);
    map[rev_off..rev_off + 8].copy_from_slice(&revision.to_le_bytes());
    map[layout.index_range(slot_id)].copy_from_slice(index);
}

/// Sets or clears the live bit, leaving every other byte intact.
pub(crate) fn set_live(map: &mut [u8], layout: &Layout, slot_id: u64, live: bool) {
    let off = layout.slot_offset(slot_id);
    let mut meta = u64::from_le_bytes(map[off..off + 8].try_into().expect("8-byte slice"));
    if live {
        meta |= META_LIVE;
    } else {
        meta &= !META_LIVE;
    }
    map[off..off + 8].copy_from_slice(&meta.to_le_bytes());
}
