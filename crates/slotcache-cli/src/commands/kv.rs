//! `slotcache get` / `put` / `delete` - one-shot point operations.

use anyhow::{Context, Result};
use console::style;

use super::{open_existing, parse_hex, print_entry};

pub fn get(path: &str, key: &str) -> Result<()> {
    let cache = open_existing(path)?;
    let key = parse_hex(key)?;
    match cache.get(&key).context("get")? {
        Some(entry) => print_entry(&entry),
        None => println!("{}", style("not found").dim()),
    }
    cache.close()?;
    Ok(())
}

pub fn put(path: &str, key: &str, revision: i64, index: &str) -> Result<()> {
    let cache = open_existing(path)?;
    let key = parse_hex(key)?;
    let index = parse_hex(index)?;

    let mut writer = cache.writer().context("acquire writer")?;
    writer.put(&key, revision, &index).context("put")?;
    writer.commit().context("commit")?;
    println!("{}", style("ok").green());
    cache.close()?;
    Ok(())
}

pub fn delete(path: &str, key: &str) -> Result<()> {
    let cache = open_existing(path)?;
    let key = parse_hex(key)?;

    let mut writer = cache.writer().context("acquire writer")?;
    let existed = writer.delete(&key).context("delete")?;
    writer.commit().context("commit")?;
    if existed {
        println!("{}", style("deleted").green());
    } else {
        println!("{}", style("not found").dim());
    }
    cache.close()?;
    Ok(())
}
