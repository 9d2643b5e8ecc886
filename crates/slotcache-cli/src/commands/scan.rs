//! `slotcache scan` / `range` - listing commands.

use anyhow::{Context, Result};
use console::style;
use slotcache::ScanOptions;

use super::{open_existing, parse_hex, print_entry};

pub fn run(
    path: &str,
    reverse: bool,
    offset: usize,
    limit: usize,
    prefix: Option<&str>,
) -> Result<()> {
    let cache = open_existing(path)?;
    let opts = ScanOptions::new().reverse(reverse).offset(offset).limit(limit);
    let entries = match prefix {
        Some(prefix) => {
            let prefix = parse_hex(prefix)?;
            cache.scan_prefix(&prefix, opts).context("scan_prefix")?
        }
        None => cache.scan(opts).context("scan")?,
    };
    for entry in &entries {
        print_entry(entry);
    }
    println!("{}", style(format!("{} entries", entries.len())).dim());
    cache.close()?;
    Ok(())
}

pub fn range(path: &str, start: Option<&str>, end: Option<&str>) -> Result<()> {
    let cache = open_existing(path)?;
    let start = start.map(parse_hex).transpose()?;
    let end = end.map(parse_hex).transpose()?;
    let entries = cache
        .scan_range(start.as_deref(), end.as_deref(), ScanOptions::new())
        .context("scan_range")?;
    for entry in &entries {
        print_entry(entry);
    }
    println!("{}", style(format!("{} entries", entries.len())).dim());
    cache.close()?;
    Ok(())
}
