//! `slotcache invalidate` - terminally invalidate a file.

use anyhow::{Context, Result, bail};
use console::style;

use super::open_existing;

pub fn run(path: &str, yes: bool) -> Result<()> {
    if !yes {
        bail!("invalidation is terminal; pass --yes to confirm");
    }
    let cache = open_existing(path)?;
    cache.invalidate().context("invalidate")?;
    println!("{} {path}", style("invalidated").red().bold());
    cache.close()?;
    Ok(())
}
