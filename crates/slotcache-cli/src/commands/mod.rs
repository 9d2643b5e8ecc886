//! Command implementations and shared helpers.

pub mod check;
pub mod create;
pub mod info;
pub mod invalidate;
pub mod kv;
pub mod scan;
pub mod shell;

use anyhow::{Context, Result, bail};
use slotcache::{Cache, Entry, Options, Writeback};

/// Opens an existing file by inspection: the header supplies every
/// configuration field, so callers never re-state the geometry.
pub fn open_existing(path: &str) -> Result<Cache> {
    let header = Cache::inspect(path).with_context(|| format!("inspect {path}"))?;
    let options = Options::new(header.key_size, header.index_size, header.slot_capacity)
        .ordered(header.ordered_keys)
        .user_version(header.user_version)
        .writeback(Writeback::Metadata);
    Cache::open(path, options).with_context(|| format!("open {path}"))
}

/// Parses a hex string (an even number of digits) into bytes.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let input = input.trim();
    if input.len() % 2 != 0 {
        bail!("hex string {input:?} has an odd number of digits");
    }
    (0..input.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&input[i..i + 2], 16)
                .with_context(|| format!("bad hex byte {:?}", &input[i..i + 2]))
        })
        .collect()
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// One-line rendering used by `get`, `scan`, `range`, and the shell.
pub fn print_entry(entry: &Entry) {
    if entry.index.is_empty() {
        println!("{}  rev={}", to_hex(&entry.key), entry.revision);
    } else {
        println!(
            "{}  rev={}  index={}",
            to_hex(&entry.key),
            entry.revision,
            to_hex(&entry.index)
        );
    }
}
