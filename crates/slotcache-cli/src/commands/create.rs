//! `slotcache create` - create a new cache file.

use anyhow::{Context, Result, bail};
use console::style;
use slotcache::{Cache, Options, Writeback};

pub fn run(
    path: &str,
    key_size: u32,
    index_size: u32,
    capacity: u64,
    ordered: bool,
    user_version: u64,
) -> Result<()> {
    if std::path::Path::new(path).exists() {
        bail!("{path} already exists");
    }
    let options = Options::new(key_size, index_size, capacity)
        .ordered(ordered)
        .user_version(user_version)
        .writeback(Writeback::Metadata);
    let cache = Cache::open(path, options).with_context(|| format!("create {path}"))?;
    let stats = cache.stats()?;
    cache.close()?;

    println!(
        "{} {path}: {key_size}-byte keys, {index_size}-byte indexes, {capacity} slots, {} buckets{}",
        style("created").green().bold(),
        stats.bucket_count,
        if ordered { ", ordered" } else { "" },
    );
    Ok(())
}
