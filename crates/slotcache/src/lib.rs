//! # slotcache
//!
//! A single-file, fixed-capacity, embedded key → (revision, index) store
//! backed by one memory-mapped file.
//!
//! The file holds a CRC-protected 256-byte header, an append-only array of
//! fixed-width slot records, and an open-addressed hash-bucket directory.
//! Keys are fixed-width; each maps to a caller-supplied 64-bit `revision`
//! and a small opaque `index` payload. Capacity is fixed at creation: slots
//! are never reclaimed and the directory never grows.
//!
//! # Guarantees
//!
//! - **Crash consistency** - commits flip a generation counter odd before
//!   touching data and even (with a fresh header CRC) after; a file whose
//!   generation is odd is rejected as corrupt on open.
//! - **Single writer** - at most one [`Writer`] session per handle;
//!   readers observe only committed state.
//! - **Bit-exact format** - the same operations on the same configuration
//!   produce an identical file, modulo the generation counter.
//!
//! # Quick Start
//!
//! ```no_run
//! use slotcache::{Cache, Options, ScanOptions};
//!
//! # fn main() -> Result<(), slotcache::CacheError> {
//! let cache = Cache::open("index.slc", Options::new(8, 4, 1024))?;
//!
//! let mut writer = cache.writer()?;
//! writer.put(b"order-01", 1, &[0xAA, 0xBB, 0xCC, 0xDD])?;
//! writer.commit()?;
//!
//! if let Some(entry) = cache.get(b"order-01")? {
//!     println!("revision {}", entry.revision);
//! }
//! for entry in cache.scan(ScanOptions::new())? {
//!     println!("{:?}", entry);
//! }
//! cache.close()?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod directory;
mod error;
mod hash;
mod header;
mod mapfile;
mod scan;
mod slots;
mod writer;

pub use cache::{Cache, Options, Stats};
pub use error::{CacheError, ErrorKind, Result};
pub use hash::fnv1a64;
pub use header::{
    BUCKET_LEN, FLAG_ORDERED_KEYS, FORMAT_VERSION, FileState, HASH_FNV1A64, HEADER_LEN, Header,
    MAGIC, MAX_KEY_SIZE, bucket_count_for, derived_slot_size, key_pad, verify_crc,
};
pub use mapfile::Writeback;
pub use scan::{Entry, Filter, MatchSpec, ScanOptions};
pub use writer::Writer;
