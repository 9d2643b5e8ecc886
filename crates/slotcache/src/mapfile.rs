//! File creation and memory mapping.
//!
//! Map construction is the only unsafe operation in the crate and is
//! confined to this module. The safety contract is the usual one for
//! file-backed maps: the file must not be truncated or remapped by another
//! process while the map is live. The engine assumes single-process
//! discipline and takes no cross-process lock.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::MmapMut;

/// Durability policy applied by commits and invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Writeback {
    /// Rely on OS writeback; no explicit flushes.
    #[default]
    None,
    /// Flush the header page after the generation flip.
    Metadata,
    /// Flush slot and bucket pages before the header flip, then the header.
    Data,
}

/// A read-write memory map over the whole cache file.
pub(crate) struct MapFile {
    map: MmapMut,
    _file: File,
}

impl MapFile {
    /// Creates a new file of exactly `len` bytes (zero-filled) and maps it.
    ///
    /// Fails if the path already exists.
    pub fn create(path: &Path, len: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(len)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(MapFile { map, _file: file })
    }

    /// Opens an existing file read-write and maps its current length.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(MapFile { map, _file: file })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Synchronously flushes `len` bytes starting at `offset` to disk.
    pub fn flush_range(&self, offset: usize, len: usize) -> io::Result<()> {
        self.map.flush_range(offset, len)
    }
}

impl std::fmt::Debug for MapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapFile").field("len", &self.len()).finish()
    }
}
