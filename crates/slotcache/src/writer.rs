//! The single-writer session: buffered mutations and the atomic commit.
//!
//! A [`Writer`] buffers puts and deletes (last operation per key wins) plus
//! staged user-header fields. `commit` validates the whole batch up front,
//! then publishes it under the crash protocol: flip the header generation
//! odd, mutate slot and bucket bytes, then write the finished header with
//! the next even generation and a fresh CRC. A crash in between leaves an
//! odd generation on disk, which later opens reject as corrupt.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use crate::cache::{Cache, HandleState, OpenCache};
use crate::directory::{self, Probe};
use crate::error::{CacheError, Result};
use crate::hash::fnv1a64;
use crate::header::{HEADER_LEN, OFF_GENERATION};
use crate::mapfile::Writeback;
use crate::slots;

#[derive(Debug)]
enum BufferedOp {
    Put {
        key: Vec<u8>,
        revision: i64,
        index: Vec<u8>,
    },
    Delete {
        key: Vec<u8>,
    },
}

/// Exclusive buffered write session over a [`Cache`].
///
/// Obtained from [`Cache::writer`]. Dropping the writer (or calling
/// [`close`](Writer::close)) discards every buffered operation and staged
/// header field; only [`commit`](Writer::commit) applies them.
pub struct Writer<'a> {
    cache: &'a Cache,
    key_size: usize,
    index_size: usize,
    ordered_keys: bool,
    /// Buffered ops in call order; superseded entries are tombstoned so the
    /// surviving op per key keeps the position of its last occurrence.
    ops: Vec<Option<BufferedOp>>,
    last_for_key: HashMap<Vec<u8>, usize>,
    staged_flags: Option<u64>,
    staged_data: Option<[u8; 64]>,
}

impl std::fmt::Debug for Writer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("key_size", &self.key_size)
            .field("index_size", &self.index_size)
            .field("ordered_keys", &self.ordered_keys)
            .field("ops", &self.ops)
            .field("last_for_key", &self.last_for_key)
            .field("staged_flags", &self.staged_flags)
            .field("staged_data", &self.staged_data)
            .finish_non_exhaustive()
    }
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        cache: &'a Cache,
        key_size: usize,
        index_size: usize,
        ordered_keys: bool,
    ) -> Writer<'a> {
        Writer {
            cache,
            key_size,
            index_size,
            ordered_keys,
            ops: Vec::new(),
            last_for_key: HashMap::new(),
            staged_flags: None,
            staged_data: None,
        }
    }

    fn check_key_len(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(CacheError::invalid_input(format!(
                "key length {} does not match key_size {}",
                key.len(),
                self.key_size
            )));
        }
        Ok(())
    }

    fn record(&mut self, key: &[u8], op: BufferedOp) {
        if let Some(&superseded) = self.last_for_key.get(key) {
            self.ops[superseded] = None;
        }
        self.last_for_key.insert(key.to_vec(), self.ops.len());
        self.ops.push(Some(op));
    }

    /// Buffers an insert or update of `key`.
    pub fn put(&mut self, key: &[u8], revision: i64, index: &[u8]) -> Result<()> {
        self.check_key_len(key)?;
        if index.len() != self.index_size {
            return Err(CacheError::invalid_input(format!(
                "index length {} does not match index_size {}",
                index.len(),
                self.index_size
            )));
        }
        self.record(
            key,
            BufferedOp::Put {
                key: key.to_vec(),
                revision,
                index: index.to_vec(),
            },
        );
        Ok(())
    }

    /// Buffers a delete of `key`.
    ///
    /// The returned flag says whether the key exists from this session's
    /// point of view: prior buffered operations are consulted first, then
    /// the committed state.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key_len(key)?;
        let existed = match self.last_for_key.get(key).map(|&i| &self.ops[i]) {
            Some(Some(BufferedOp::Put { .. })) => true,
            Some(Some(BufferedOp::Delete { .. })) => false,
            _ => self
                .cache
                .with_open(|open| Ok(matches!(open.probe_key(key)?, Probe::Hit { .. })))?,
        };
        self.record(key, BufferedOp::Delete { key: key.to_vec() });
        Ok(existed)
    }

    /// Stages a new value for the caller-owned `user_flags` header field.
    pub fn set_user_header_flags(&mut self, flags: u64) -> Result<()> {
        self.staged_flags = Some(flags);
        Ok(())
    }

    /// Stages new caller-owned `user_data` header bytes.
    pub fn set_user_header_data(&mut self, data: &[u8; 64]) -> Result<()> {
        self.staged_data = Some(*data);
        Ok(())
    }

    /// Validates and applies the buffered batch, publishing it atomically.
    ///
    /// On a validation failure (`Full`, `OutOfOrderInsert`) the file is
    /// untouched; in every case the session ends and the buffer is gone.
    /// [`CacheError::Writeback`] reports a failed flush *after* the logical
    /// state was applied.
    pub fn commit(mut self) -> Result<()> {
        let ops = std::mem::take(&mut self.ops);
        let staged_flags = self.staged_flags.take();
        let staged_data = self.staged_data.take();

        let mut guard = self.cache.state.write().expect("lock poisoned");
        let open = match &mut *guard {
            HandleState::Open(open) => open,
            HandleState::Closed => return Err(CacheError::Closed),
            HandleState::Invalidated => return Err(CacheError::Invalidated),
        };
        apply_commit(
            open,
            ops.into_iter().flatten().collect(),
            self.ordered_keys,
            staged_flags,
            staged_data,
        )
    }

    /// Discards the session without applying anything. Idempotent by
    /// construction: the writer is consumed.
    pub fn close(self) {}
}

impl Drop for Writer<'_> {
    fn drop(&mut self) {
        self.cache.writer_live.store(false, Ordering::Release);
    }
}

/// One buffered op resolved against the committed state.
enum Planned {
    Update {
        slot_id: u64,
        revision: i64,
        index: Vec<u8>,
    },
    Insert {
        key: Vec<u8>,
        revision: i64,
        index: Vec<u8>,
    },
    Remove {
        bucket: u64,
        slot_id: u64,
    },
    Noop,
}

fn apply_commit(
    open: &mut OpenCache,
    final_ops: Vec<BufferedOp>,
    ordered_keys: bool,
    staged_flags: Option<u64>,
    staged_data: Option<[u8; 64]>,
) -> Result<()> {
    // Resolve every op against the committed state. Keys are unique in the
    // final list, so hit/miss classifications stay valid while the batch is
    // applied.
    let mut planned = Vec::with_capacity(final_ops.len());
    for op in final_ops {
        planned.push(match op {
            BufferedOp::Put {
                key,
                revision,
                index,
            } => match open.probe_key(&key)? {
                Probe::Hit { slot_id, .. } => Planned::Update {
                    slot_id,
                    revision,
                    index,
                },
                Probe::Miss { .. } => Planned::Insert {
                    key,
                    revision,
                    index,
                },
            },
            BufferedOp::Delete { key } => match open.probe_key(&key)? {
                Probe::Hit { bucket, slot_id } => Planned::Remove { bucket, slot_id },
                Probe::Miss { .. } => Planned::Noop,
            },
        });
    }

    let mut new_keys: Vec<&[u8]> = planned
        .iter()
        .filter_map(|op| match op {
            Planned::Insert { key, .. } => Some(key.as_slice()),
            _ => None,
        })
        .collect();

    let header = &open.header;
    if header.slot_highwater + new_keys.len() as u64 > header.slot_capacity {
        return Err(CacheError::Full);
    }
    if header.bucket_used + header.bucket_tombstones + new_keys.len() as u64 >= header.bucket_count
    {
        return Err(CacheError::Full);
    }
    if ordered_keys && !new_keys.is_empty() {
        new_keys.sort_unstable();
        if header.slot_highwater > 0 {
            let tail = slots::slot_key(open.map.bytes(), &open.layout, header.slot_highwater - 1);
            if new_keys[0] < tail {
                return Err(CacheError::OutOfOrderInsert);
            }
        }
    }

    // Ordered mode applies new inserts in sorted key order: reorder the
    // insert subsequence in place, leaving other ops where they are.
    if ordered_keys {
        let positions: Vec<usize> = planned
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, Planned::Insert { .. }))
            .map(|(i, _)| i)
            .collect();
        let mut inserts: Vec<Planned> = positions
            .iter()
            .map(|&i| std::mem::replace(&mut planned[i], Planned::Noop))
            .collect();
        inserts.sort_by(|a, b| match (a, b) {
            (Planned::Insert { key: ka, .. }, Planned::Insert { key: kb, .. }) => ka.cmp(kb),
            _ => std::cmp::Ordering::Equal,
        });
        for (&i, op) in positions.iter().zip(inserts) {
            planned[i] = op;
        }
    }

    let mut staged = open.header.clone();
    let mut flush_error: Option<std::io::Error> = None;
    let mut record_flush = |result: std::io::Result<()>| {
        if let Err(e) = result {
            if flush_error.is_none() {
                flush_error = Some(e);
            }
        }
    };

    // Publish "writing in progress" before the first byte of data changes.
    let odd_generation = open.header.generation + 1;
    open.map.bytes_mut()[OFF_GENERATION..OFF_GENERATION + 8]
        .copy_from_slice(&odd_generation.to_le_bytes());
    if open.writeback != Writeback::None {
        record_flush(open.map.flush_range(0, HEADER_LEN));
    }

    let puts = planned
        .iter()
        .filter(|op| matches!(op, Planned::Update { .. } | Planned::Insert { .. }))
        .count();
    let removes = planned
        .iter()
        .filter(|op| matches!(op, Planned::Remove { .. }))
        .count();

    for op in planned {
        match op {
            Planned::Update {
                slot_id,
                revision,
                index,
            } => {
                slots::update_payload(open.map.bytes_mut(), &open.layout, slot_id, revision, &index);
            }
            Planned::Insert {
                key,
                revision,
                index,
            } => {
                let slot_id = staged.slot_highwater;
                let hash = fnv1a64(&key);
                // Write the slot before its bucket so no reader can follow
                // a FULL bucket to a record that is not live yet.
                slots::write_new_slot(
                    open.map.bytes_mut(),
                    &open.layout,
                    slot_id,
                    &key,
                    revision,
                    &index,
                );
                let probe = directory::probe(
                    open.map.bytes(),
                    &open.layout,
                    staged.slot_highwater,
                    &key,
                    hash,
                )?;
                match probe {
                    Probe::Miss {
                        insert_at,
                        reusing_tombstone,
                    } => {
                        directory::write_full(
                            open.map.bytes_mut(),
                            &open.layout,
                            insert_at,
                            hash,
                            slot_id,
                        );
                        staged.bucket_used += 1;
                        if reusing_tombstone {
                            staged.bucket_tombstones -= 1;
                        }
                    }
                    Probe::Hit { .. } => {
                        return Err(CacheError::corrupt(
                            "insert probe hit a key classified as absent",
                        ));
                    }
                }
                staged.slot_highwater += 1;
                staged.live_count += 1;
            }
            Planned::Remove { bucket, slot_id } => {
                // Tombstone the bucket first, then clear the live bit, so a
                // concurrent probe never follows FULL to a dead slot.
                directory::write_tombstone(open.map.bytes_mut(), &open.layout, bucket);
                slots::set_live(open.map.bytes_mut(), &open.layout, slot_id, false);
                staged.bucket_used -= 1;
                staged.bucket_tombstones += 1;
                staged.live_count -= 1;
            }
            Planned::Noop => {}
        }
    }

    if open.writeback == Writeback::Data {
        let data_len = open.map.len() - HEADER_LEN;
        record_flush(open.map.flush_range(HEADER_LEN, data_len));
    }

    if let Some(flags) = staged_flags {
        staged.user_flags = flags;
    }
    if let Some(data) = staged_data {
        staged.user_data = data;
    }

    // Publish: next even generation, fresh CRC, counters all at once.
    staged.generation = odd_generation + 1;
    open.map.bytes_mut()[..HEADER_LEN].copy_from_slice(&staged.encode());
    if open.writeback != Writeback::None {
        record_flush(open.map.flush_range(0, HEADER_LEN));
    }
    open.header = staged;

    tracing::debug!(
        puts,
        removes,
        generation = open.header.generation,
        live_count = open.header.live_count,
        "committed"
    );

    match flush_error {
        Some(source) => {
            tracing::warn!(error = %source, "commit flush failed; logical state applied");
            Err(CacheError::Writeback { source })
        }
        None => Ok(()),
    }
}
