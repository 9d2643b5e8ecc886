//! `slotcache info` - print a file's header and counters.

use anyhow::{Context, Result};
use console::style;
use slotcache::Cache;

pub fn run(path: &str, json: bool) -> Result<()> {
    let header = Cache::inspect(path).with_context(|| format!("inspect {path}"))?;

    if json {
        let value = serde_json::json!({
            "key_size": header.key_size,
            "index_size": header.index_size,
            "slot_size": header.slot_size,
            "ordered_keys": header.ordered_keys,
            "slot_capacity": header.slot_capacity,
            "slot_highwater": header.slot_highwater,
            "live_count": header.live_count,
            "user_version": header.user_version,
            "bucket_count": header.bucket_count,
            "bucket_used": header.bucket_used,
            "bucket_tombstones": header.bucket_tombstones,
            "generation": header.generation,
            "invalidated": header.state == slotcache::FileState::Invalidated,
            "user_flags": header.user_flags,
            "file_len": header.file_len(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", style(path).bold());
    if header.state == slotcache::FileState::Invalidated {
        println!("  state            {}", style("INVALIDATED").red().bold());
    }
    println!("  key_size         {}", header.key_size);
    println!("  index_size       {}", header.index_size);
    println!("  slot_size        {}", header.slot_size);
    println!("  ordered_keys     {}", header.ordered_keys);
    println!("  user_version     {}", header.user_version);
    println!(
        "  slots            {} live / {} allocated / {} capacity",
        header.live_count, header.slot_highwater, header.slot_capacity
    );
    println!(
        "  buckets          {} full + {} tombstones / {}",
        header.bucket_used, header.bucket_tombstones, header.bucket_count
    );
    println!("  generation       {}", header.generation);
    println!("  file length      {} bytes", header.file_len());
    Ok(())
}
