//! The cache handle: open and validate, the reader API, writer acquisition,
//! invalidation, and close.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use crate::directory::{self, Probe};
use crate::error::{CacheError, Result};
use crate::hash::fnv1a64;
use crate::header::{self, FileState, HEADER_LEN, Header, MAX_KEY_SIZE};
use crate::mapfile::{MapFile, Writeback};
use crate::scan::{Entry, KeyMatcher, MatchSpec, ScanOptions, paginate};
use crate::slots::{self, Layout};
use crate::writer::Writer;

/// Open options.
///
/// `key_size`, `index_size`, `slot_capacity`, `ordered_keys` and
/// `user_version` are fixed at creation and must match byte-for-byte when
/// opening an existing file. `writeback` is a per-handle runtime policy and
/// is not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub key_size: u32,
    pub index_size: u32,
    pub slot_capacity: u64,
    pub ordered_keys: bool,
    pub user_version: u64,
    pub writeback: Writeback,
}

impl Options {
    pub fn new(key_size: u32, index_size: u32, slot_capacity: u64) -> Self {
        Options {
            key_size,
            index_size,
            slot_capacity,
            ordered_keys: false,
            user_version: 0,
            writeback: Writeback::None,
        }
    }

    pub fn ordered(mut self, ordered_keys: bool) -> Self {
        self.ordered_keys = ordered_keys;
        self
    }

    pub fn user_version(mut self, user_version: u64) -> Self {
        self.user_version = user_version;
        self
    }

    pub fn writeback(mut self, writeback: Writeback) -> Self {
        self.writeback = writeback;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.key_size == 0 || self.key_size > MAX_KEY_SIZE {
            return Err(CacheError::invalid_input(format!(
                "key_size {} outside 1..={MAX_KEY_SIZE}",
                self.key_size
            )));
        }
        if self.slot_capacity == 0 || self.slot_capacity == u64::MAX {
            return Err(CacheError::invalid_input(format!(
                "slot_capacity {} out of range",
                self.slot_capacity
            )));
        }
        Ok(())
    }
}

/// Read-only snapshot of the file's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub slot_capacity: u64,
    pub slot_highwater: u64,
    pub live_count: u64,
    pub bucket_count: u64,
    pub bucket_used: u64,
    pub bucket_tombstones: u64,
    pub generation: u64,
}

/// State of one open file behind a handle.
pub(crate) struct OpenCache {
    pub(crate) map: MapFile,
    pub(crate) header: Header,
    pub(crate) layout: Layout,
    pub(crate) writeback: Writeback,
}

impl OpenCache {
    pub(crate) fn probe_key(&self, key: &[u8]) -> Result<Probe> {
        directory::probe(
            self.map.bytes(),
            &self.layout,
            self.header.slot_highwater,
            key,
            fnv1a64(key),
        )
    }

    fn entry_at(&self, slot_id: u64) -> Entry {
        let view = slots::read_slot(self.map.bytes(), &self.layout, slot_id);
        Entry {
            key: Bytes::copy_from_slice(view.key),
            revision: view.revision,
            index: Bytes::copy_from_slice(view.index),
        }
    }

    fn check_key_len(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.layout.key_size {
            return Err(CacheError::invalid_input(format!(
                "key length {} does not match key_size {}",
                key.len(),
                self.layout.key_size
            )));
        }
        Ok(())
    }

    /// Walks live slots in slot order (or reverse), applies the raw key
    /// predicate, materializes surviving entries, and paginates.
    fn collect(&self, raw: Option<&dyn Fn(&[u8]) -> bool>, opts: &ScanOptions) -> Vec<Entry> {
        let highwater = self.header.slot_highwater;
        let ids: Box<dyn Iterator<Item = u64>> = if opts.reverse {
            Box::new((0..highwater).rev())
        } else {
            Box::new(0..highwater)
        };
        let candidates = ids.filter_map(|slot_id| {
            let view = slots::read_slot(self.map.bytes(), &self.layout, slot_id);
            if !view.live() {
                return None;
            }
            if let Some(pred) = raw {
                if !pred(view.key) {
                    return None;
                }
            }
            Some(self.entry_at(slot_id))
        });
        paginate(candidates, opts)
    }
}

pub(crate) enum HandleState {
    Open(OpenCache),
    Closed,
    Invalidated,
}

/// Handle to a single-file slot cache.
///
/// Created by [`Cache::open`]. Readers may run concurrently; at most one
/// [`Writer`] session exists at a time, and commits are published
/// atomically under the handle's exclusive lock.
pub struct Cache {
    pub(crate) state: RwLock<HandleState>,
    pub(crate) writer_live: AtomicBool,
    path: PathBuf,
}

impl Cache {
    /// Opens the cache file at `path`, creating it if absent.
    ///
    /// On an existing file the header is validated (magic, version, CRC,
    /// derived layout, crash detection) and `options` must match the
    /// recorded configuration byte-for-byte.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Cache> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            Cache::load(path, &options)
        } else {
            Cache::create(path, &options)
        }
    }

    fn create(path: PathBuf, options: &Options) -> Result<Cache> {
        let header = Header::new(
            options.key_size,
            options.index_size,
            options.slot_capacity,
            options.ordered_keys,
            options.user_version,
        )?;
        let mut map = MapFile::create(&path, header.file_len())?;
        map.bytes_mut()[..HEADER_LEN].copy_from_slice(&header.encode());
        if options.writeback != Writeback::None {
            map.flush_range(0, HEADER_LEN)?;
        }
        tracing::info!(
            path = %path.display(),
            slot_capacity = options.slot_capacity,
            ordered_keys = options.ordered_keys,
            "created cache file"
        );
        let layout = Layout::from_header(&header);
        Ok(Cache {
            state: RwLock::new(HandleState::Open(OpenCache {
                map,
                header,
                layout,
                writeback: options.writeback,
            })),
            writer_live: AtomicBool::new(false),
            path,
        })
    }

    fn load(path: PathBuf, options: &Options) -> Result<Cache> {
        if std::fs::metadata(&path)?.len() < HEADER_LEN as u64 {
            return Err(CacheError::corrupt("file shorter than the 256-byte header"));
        }
        let map = MapFile::open(&path)?;
        let header = Header::decode(map.bytes())?;
        header::verify_crc(map.bytes())?;
        if header.generation % 2 != 0 {
            return Err(CacheError::corrupt(
                "generation is odd: commit was interrupted",
            ));
        }
        if header.key_size != options.key_size {
            return Err(CacheError::Incompatible { field: "key_size" });
        }
        if header.index_size != options.index_size {
            return Err(CacheError::Incompatible {
                field: "index_size",
            });
        }
        if header.slot_capacity != options.slot_capacity {
            return Err(CacheError::Incompatible {
                field: "slot_capacity",
            });
        }
        if header.ordered_keys != options.ordered_keys {
            return Err(CacheError::Incompatible {
                field: "ordered_keys",
            });
        }
        if header.user_version != options.user_version {
            return Err(CacheError::Incompatible {
                field: "user_version",
            });
        }
        if (map.len() as u64) < header.file_len() {
            return Err(CacheError::corrupt("file shorter than its own layout"));
        }

        let state = if header.state == FileState::Invalidated {
            tracing::warn!(path = %path.display(), "opened invalidated cache file");
            HandleState::Invalidated
        } else {
            tracing::debug!(
                path = %path.display(),
                generation = header.generation,
                live_count = header.live_count,
                "opened cache file"
            );
            let layout = Layout::from_header(&header);
            HandleState::Open(OpenCache {
                map,
                header,
                layout,
                writeback: options.writeback,
            })
        };
        Ok(Cache {
            state: RwLock::new(state),
            writer_live: AtomicBool::new(false),
            path,
        })
    }

    /// Reads and validates the header of an existing file without opening
    /// a handle. Useful for discovering a file's configuration.
    pub fn inspect(path: impl AsRef<Path>) -> Result<Header> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = [0u8; HEADER_LEN];
        file.read_exact(&mut buf)
            .map_err(|_| CacheError::corrupt("file shorter than the 256-byte header"))?;
        let header = Header::decode(&buf)?;
        header::verify_crc(&buf)?;
        Ok(header)
    }

    /// Path this handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn with_open<T>(&self, f: impl FnOnce(&OpenCache) -> Result<T>) -> Result<T> {
        let guard = self.state.read().expect("lock poisoned");
        match &*guard {
            HandleState::Open(open) => f(open),
            HandleState::Closed => Err(CacheError::Closed),
            HandleState::Invalidated => Err(CacheError::Invalidated),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<u64> {
        self.with_open(|open| Ok(open.header.live_count))
    }

    /// True if no entry is live.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The caller-owned header bytes: `(user_flags, user_data)`.
    pub fn user_header(&self) -> Result<(u64, [u8; 64])> {
        self.with_open(|open| Ok((open.header.user_flags, open.header.user_data)))
    }

    /// Counter snapshot for introspection tools.
    pub fn stats(&self) -> Result<Stats> {
        self.with_open(|open| {
            Ok(Stats {
                slot_capacity: open.header.slot_capacity,
                slot_highwater: open.header.slot_highwater,
                live_count: open.header.live_count,
                bucket_count: open.header.bucket_count,
                bucket_used: open.header.bucket_used,
                bucket_tombstones: open.header.bucket_tombstones,
                generation: open.header.generation,
            })
        })
    }

    /// Point lookup. Returns `None` when the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.with_open(|open| {
            open.check_key_len(key)?;
            match open.probe_key(key)? {
                Probe::Hit { slot_id, .. } => Ok(Some(open.entry_at(slot_id))),
                Probe::Miss { .. } => Ok(None),
            }
        })
    }

    /// Scans live entries in slot order (reverse with `opts.reverse`).
    pub fn scan(&self, opts: ScanOptions) -> Result<Vec<Entry>> {
        self.with_open(|open| Ok(open.collect(None, &opts)))
    }

    /// Scans live entries whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<Entry>> {
        self.with_open(|open| {
            let matcher = KeyMatcher::from_prefix(prefix, open.layout.key_size)?;
            let pred: &dyn Fn(&[u8]) -> bool = &|key| matcher.matches(key);
            Ok(open.collect(Some(pred), &opts))
        })
    }

    /// Scans live entries matching a bit-granular pattern.
    pub fn scan_match(&self, spec: &MatchSpec, opts: ScanOptions) -> Result<Vec<Entry>> {
        self.with_open(|open| {
            let matcher = KeyMatcher::from_match_spec(spec, open.layout.key_size)?;
            let pred: &dyn Fn(&[u8]) -> bool = &|key| matcher.matches(key);
            Ok(open.collect(Some(pred), &opts))
        })
    }

    /// Scans live entries whose key falls in `[start, end)`.
    ///
    /// Requires ordered keys. Bounds may be `None` (unbounded) or 1 to
    /// `key_size` bytes; shorter bounds are right-padded with zeros.
    pub fn scan_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        opts: ScanOptions,
    ) -> Result<Vec<Entry>> {
        self.with_open(|open| {
            if !open.header.ordered_keys {
                return Err(CacheError::Unordered);
            }
            let start = pad_bound(start, open.layout.key_size)?;
            let end = pad_bound(end, open.layout.key_size)?;
            if let (Some(lo), Some(hi)) = (&start, &end) {
                if lo > hi {
                    return Err(CacheError::invalid_input("range start exceeds range end"));
                }
            }
            let in_range: &dyn Fn(&[u8]) -> bool = &|key| {
                start.as_deref().is_none_or(|lo| key >= lo)
                    && end.as_deref().is_none_or(|hi| key < hi)
            };
            Ok(open.collect(Some(in_range), &opts))
        })
    }

    /// Acquires the exclusive writer session.
    ///
    /// Fails with [`CacheError::Busy`] while another writer is live.
    pub fn writer(&self) -> Result<Writer<'_>> {
        let (key_size, index_size, ordered_keys) = self.with_open(|open| {
            Ok((
                open.layout.key_size,
                open.layout.index_size,
                open.header.ordered_keys,
            ))
        })?;
        if self.writer_live.swap(true, Ordering::AcqRel) {
            return Err(CacheError::Busy);
        }
        Ok(Writer::new(self, key_size, index_size, ordered_keys))
    }

    /// Marks the file invalidated: a terminal state, published durably and
    /// surviving reopen. Every subsequent operation fails with
    /// [`CacheError::Invalidated`].
    pub fn invalidate(&self) -> Result<()> {
        if self.writer_live.load(Ordering::Acquire) {
            return Err(CacheError::Busy);
        }
        let mut guard = self.state.write().expect("lock poisoned");
        match &mut *guard {
            HandleState::Closed => Err(CacheError::Closed),
            HandleState::Invalidated => Err(CacheError::Invalidated),
            HandleState::Open(open) => {
                let mut new_header = open.header.clone();
                new_header.state = FileState::Invalidated;
                open.map.bytes_mut()[..HEADER_LEN].copy_from_slice(&new_header.encode());
                let flushed = if open.writeback == Writeback::None {
                    Ok(())
                } else {
                    open.map.flush_range(0, HEADER_LEN)
                };
                tracing::info!(path = %self.path.display(), "invalidated cache file");
                *guard = HandleState::Invalidated;
                flushed.map_err(|source| {
                    tracing::warn!(error = %source, "invalidate flush failed");
                    CacheError::Writeback { source }
                })
            }
        }
    }

    /// Closes the handle, unmapping the file. Idempotent; fails with
    /// [`CacheError::Busy`] while a writer is live.
    pub fn close(&self) -> Result<()> {
        if self.writer_live.load(Ordering::Acquire) {
            return Err(CacheError::Busy);
        }
        let mut guard = self.state.write().expect("lock poisoned");
        if !matches!(&*guard, HandleState::Closed) {
            tracing::debug!(path = %self.path.display(), "closed cache file");
            *guard = HandleState::Closed;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.read().expect("lock poisoned") {
            HandleState::Open(_) => "open",
            HandleState::Closed => "closed",
            HandleState::Invalidated => "invalidated",
        };
        f.debug_struct("Cache")
            .field("path", &self.path)
            .field("state", &state)
            .finish()
    }
}

/// Validates a range bound and right-pads it with zeros to the key width.
fn pad_bound(bound: Option<&[u8]>, key_size: usize) -> Result<Option<Vec<u8>>> {
    match bound {
        None => Ok(None),
        Some(bytes) => {
            if bytes.is_empty() || bytes.len() > key_size {
                return Err(CacheError::invalid_input(format!(
                    "range bound length {} outside 1..={key_size}",
                    bytes.len()
                )));
            }
            let mut padded = bytes.to_vec();
            padded.resize(key_size, 0);
            Ok(Some(padded))
        }
    }
}
