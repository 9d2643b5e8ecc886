//! # slotcache-oracle
//!
//! An in-memory model of the slotcache engine, used as the reference side
//! of differential tests. The model mirrors the engine's observable
//! behavior - values, iteration order, and error kinds - without touching
//! a single byte of file format: slots are a plain vector, the directory is
//! a hash map, and "commit" is a batch application with the same
//! validation order as the real engine.
//!
//! The model deliberately reimplements matching, range, and ordering rules
//! rather than calling into the engine, so a bug in either side shows up as
//! a divergence.

use std::collections::HashMap;

use bytes::Bytes;
use slotcache::{CacheError, Entry, MatchSpec, Options, Result, ScanOptions};

/// One slot in the model: a record that, like the real slot store, is never
/// removed or reordered once appended.
#[derive(Debug, Clone)]
struct ModelSlot {
    key: Vec<u8>,
    revision: i64,
    index: Vec<u8>,
    live: bool,
}

/// In-memory mirror of one cache file.
#[derive(Debug, Clone)]
pub struct Model {
    key_size: usize,
    index_size: usize,
    slot_capacity: u64,
    ordered_keys: bool,
    slots: Vec<ModelSlot>,
    live: HashMap<Vec<u8>, usize>,
    user_flags: u64,
    user_data: [u8; 64],
    invalidated: bool,
}

impl Model {
    pub fn new(options: &Options) -> Model {
        Model {
            key_size: options.key_size as usize,
            index_size: options.index_size as usize,
            slot_capacity: options.slot_capacity,
            ordered_keys: options.ordered_keys,
            slots: Vec::new(),
            live: HashMap::new(),
            user_flags: 0,
            user_data: [0u8; 64],
            invalidated: false,
        }
    }

    fn check_state(&self) -> Result<()> {
        if self.invalidated {
            return Err(CacheError::Invalidated);
        }
        Ok(())
    }

    fn check_key_len(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(CacheError::InvalidInput {
                reason: format!(
                    "key length {} does not match key_size {}",
                    key.len(),
                    self.key_size
                ),
            });
        }
        Ok(())
    }

    fn entry(&self, slot: &ModelSlot) -> Entry {
        Entry {
            key: Bytes::copy_from_slice(&slot.key),
            revision: slot.revision,
            index: Bytes::copy_from_slice(&slot.index),
        }
    }

    pub fn len(&self) -> Result<u64> {
        self.check_state()?;
        Ok(self.live.len() as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn user_header(&self) -> Result<(u64, [u8; 64])> {
        self.check_state()?;
        Ok((self.user_flags, self.user_data))
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.check_state()?;
        self.check_key_len(key)?;
        Ok(self
            .live
            .get(key)
            .map(|&slot_id| self.entry(&self.slots[slot_id])))
    }

    fn collect(&self, raw: Option<&dyn Fn(&[u8]) -> bool>, opts: &ScanOptions) -> Vec<Entry> {
        let ids: Box<dyn Iterator<Item = usize>> = if opts.reverse {
            Box::new((0..self.slots.len()).rev())
        } else {
            Box::new(0..self.slots.len())
        };
        let filtered = ids
            .filter_map(|slot_id| {
                let slot = &self.slots[slot_id];
                if !slot.live {
                    return None;
                }
                if let Some(pred) = raw {
                    if !pred(&slot.key) {
                        return None;
                    }
                }
                Some(self.entry(slot))
            })
            .filter(|entry| match &opts.filter {
                Some(filter) => filter(entry),
                None => true,
            });
        let skipped = filtered.skip(opts.offset);
        if opts.limit == 0 {
            skipped.collect()
        } else {
            skipped.take(opts.limit).collect()
        }
    }

    pub fn scan(&self, opts: ScanOptions) -> Result<Vec<Entry>> {
        self.check_state()?;
        Ok(self.collect(None, &opts))
    }

    pub fn scan_prefix(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<Entry>> {
        self.check_state()?;
        if prefix.is_empty() || prefix.len() > self.key_size {
            return Err(CacheError::InvalidInput {
                reason: "bad prefix length".into(),
            });
        }
        let pred: &dyn Fn(&[u8]) -> bool = &|key| key.starts_with(prefix);
        Ok(self.collect(Some(pred), &opts))
    }

    pub fn scan_match(&self, spec: &MatchSpec, opts: ScanOptions) -> Result<Vec<Entry>> {
        self.check_state()?;
        if spec.offset >= self.key_size {
            return Err(CacheError::InvalidInput {
                reason: "match offset past key".into(),
            });
        }
        let width = if spec.bits == 0 {
            if spec.bytes.is_empty() {
                return Err(CacheError::InvalidInput {
                    reason: "empty match bytes".into(),
                });
            }
            spec.bytes.len()
        } else {
            let want = (spec.bits as usize).div_ceil(8);
            if spec.bytes.len() != want {
                return Err(CacheError::InvalidInput {
                    reason: "match byte count does not fit bit width".into(),
                });
            }
            want
        };
        if spec.offset + width > self.key_size {
            return Err(CacheError::InvalidInput {
                reason: "match pattern past key end".into(),
            });
        }

        let matches: &dyn Fn(&[u8]) -> bool = &|key| {
            let region = &key[spec.offset..spec.offset + width];
            if spec.bits == 0 || spec.bits % 8 == 0 {
                return region == &spec.bytes[..];
            }
            let full = width - 1;
            if region[..full] != spec.bytes[..full] {
                return false;
            }
            let mask = 0xFFu8 << (8 - spec.bits % 8);
            (region[full] ^ spec.bytes[full]) & mask == 0
        };
        Ok(self.collect(Some(matches), &opts))
    }

    pub fn scan_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        opts: ScanOptions,
    ) -> Result<Vec<Entry>> {
        self.check_state()?;
        if !self.ordered_keys {
            return Err(CacheError::Unordered);
        }
        let pad = |bound: Option<&[u8]>| -> Result<Option<Vec<u8>>> {
            match bound {
                None => Ok(None),
                Some(bytes) => {
                    if bytes.is_empty() || bytes.len() > self.key_size {
                        return Err(CacheError::InvalidInput {
                            reason: "bad range bound length".into(),
                        });
                    }
                    let mut padded = bytes.to_vec();
                    padded.resize(self.key_size, 0);
                    Ok(Some(padded))
                }
            }
        };
        let start = pad(start)?;
        let end = pad(end)?;
        if let (Some(lo), Some(hi)) = (&start, &end) {
            if lo > hi {
                return Err(CacheError::InvalidInput {
                    reason: "range start exceeds range end".into(),
                });
            }
        }
        let in_range: &dyn Fn(&[u8]) -> bool = &|key| {
            start.as_deref().is_none_or(|lo| key >= lo)
                && end.as_deref().is_none_or(|hi| key < hi)
        };
        Ok(self.collect(Some(in_range), &opts))
    }

    /// Begins a buffered write session against the model.
    pub fn writer(&mut self) -> Result<ModelWriter<'_>> {
        self.check_state()?;
        Ok(ModelWriter {
            key_size: self.key_size,
            index_size: self.index_size,
            model: self,
            ops: Vec::new(),
            last_for_key: HashMap::new(),
            staged_flags: None,
            staged_data: None,
        })
    }

    pub fn invalidate(&mut self) -> Result<()> {
        self.check_state()?;
        self.invalidated = true;
        Ok(())
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Counters mirroring [`slotcache::Stats`] where the model has an
    /// equivalent notion.
    pub fn slot_highwater(&self) -> u64 {
        self.slots.len() as u64
    }
}

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

/// Buffered write session over a [`Model`], mirroring
/// [`slotcache::Writer`].
pub struct ModelWriter<'a> {
    model: &'a mut Model,
    key_size: usize,
    index_size: usize,
    ops: Vec<Option<BufferedOp>>,
    last_for_key: HashMap<Vec<u8>, usize>,
    staged_flags: Option<u64>,
    staged_data: Option<[u8; 64]>,
}

impl ModelWriter<'_> {
    fn check_key_len(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(CacheError::InvalidInput {
                reason: "bad key length".into(),
            });
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

    pub fn put(&mut self, key: &[u8], revision: i64, index: &[u8]) -> Result<()> {
        self.check_key_len(key)?;
        if index.len() != self.index_size {
            return Err(CacheError::InvalidInput {
                reason: "bad index length".into(),
            });
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

    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key_len(key)?;
        let existed = match self.last_for_key.get(key).map(|&i| &self.ops[i]) {
            Some(Some(BufferedOp::Put { .. })) => true,
            Some(Some(BufferedOp::Delete { .. })) => false,
            _ => self.model.live.contains_key(key),
        };
        self.record(key, BufferedOp::Delete { key: key.to_vec() });
        Ok(existed)
    }

    pub fn set_user_header_flags(&mut self, flags: u64) -> Result<()> {
        self.staged_flags = Some(flags);
        Ok(())
    }

    pub fn set_user_header_data(&mut self, data: &[u8; 64]) -> Result<()> {
        self.staged_data = Some(*data);
        Ok(())
    }

    /// Validates and applies the batch with the engine's rules: capacity
    /// first, then the ordered-insert check, then application with new
    /// inserts appended (in sorted key order when ordered).
    pub fn commit(self) -> Result<()> {
        let model = self.model;
        let final_ops: Vec<BufferedOp> = self.ops.into_iter().flatten().collect();

        enum Planned {
            Update {
                slot_id: usize,
                revision: i64,
                index: Vec<u8>,
            },
            Insert {
                key: Vec<u8>,
                revision: i64,
                index: Vec<u8>,
            },
            Remove {
                slot_id: usize,
            },
            Noop,
        }

        let mut planned = Vec::with_capacity(final_ops.len());
        for op in final_ops {
            planned.push(match op {
                BufferedOp::Put {
                    key,
                    revision,
                    index,
                } => match model.live.get(&key) {
                    Some(&slot_id) => Planned::Update {
                        slot_id,
                        revision,
                        index,
                    },
                    None => Planned::Insert {
                        key,
                        revision,
                        index,
                    },
                },
                BufferedOp::Delete { key } => match model.live.get(&key) {
                    Some(&slot_id) => Planned::Remove { slot_id },
                    None => Planned::Noop,
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
        if model.slots.len() as u64 + new_keys.len() as u64 > model.slot_capacity {
            return Err(CacheError::Full);
        }
        if model.ordered_keys && !new_keys.is_empty() {
            new_keys.sort_unstable();
            if let Some(tail) = model.slots.last() {
                if new_keys[0] < tail.key.as_slice() {
                    return Err(CacheError::OutOfOrderInsert);
                }
            }
        }

        if model.ordered_keys {
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

        for op in planned {
            match op {
                Planned::Update {
                    slot_id,
                    revision,
                    index,
                } => {
                    let slot = &mut model.slots[slot_id];
                    slot.revision = revision;
                    slot.index = index;
                }
                Planned::Insert {
                    key,
                    revision,
                    index,
                } => {
                    let slot_id = model.slots.len();
                    model.live.insert(key.clone(), slot_id);
                    model.slots.push(ModelSlot {
                        key,
                        revision,
                        index,
                        live: true,
                    });
                }
                Planned::Remove { slot_id } => {
                    let slot = &mut model.slots[slot_id];
                    slot.live = false;
                    model.live.remove(&slot.key);
                }
                Planned::Noop => {}
            }
        }

        if let Some(flags) = self.staged_flags {
            model.user_flags = flags;
        }
        if let Some(data) = self.staged_data {
            model.user_data = data;
        }
        Ok(())
    }

    /// Discards the session.
    pub fn close(self) {}
}
