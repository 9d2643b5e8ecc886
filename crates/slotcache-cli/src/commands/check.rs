//! `slotcache check` - run the raw file-format validator.

use anyhow::{Context, Result, bail};
use console::style;
use slotcache_harness::validator::validate_file;

pub fn run(path: &str) -> Result<()> {
    let violations =
        validate_file(std::path::Path::new(path)).with_context(|| format!("read {path}"))?;
    if violations.is_empty() {
        println!("{} {path}", style("ok").green().bold());
        return Ok(());
    }
    for violation in &violations {
        println!("{} {violation}", style("violation").red().bold());
    }
    bail!("{path}: {} invariant violations", violations.len());
}
