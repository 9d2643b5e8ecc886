//! Interactive shell over one cache file, with history and line editing.

use anyhow::{Context, Result};
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use slotcache::{Cache, ScanOptions};

use super::{open_existing, parse_hex, print_entry, to_hex};

/// Help text for the shell.
const HELP_TEXT: &str = r"
Commands:
  get <key>                Look up a key (hex)
  put <key> <rev> <index>  Insert or update (key/index hex, rev integer)
  del <key>                Delete a key
  scan [limit]             List live entries in slot order
  prefix <hex> [limit]     List entries whose key starts with the prefix
  range <lo|-> <hi|->      List entries in [lo, hi)  (ordered files; - = unbounded)
  len                      Number of live entries
  info                     Header counters
  user                     Caller-owned header bytes
  help                     Show this help message
  exit                     Leave the shell

Tips:
  - Keys and indexes are hex strings, e.g. put 01ff 7 aabb
  - Every put/del is its own commit
  - Use Up/Down arrows to browse history, Ctrl+D to exit
";

pub fn run(path: &str) -> Result<()> {
    let cache = open_existing(path)?;
    let stats = cache.stats();
    println!(
        "{} {path} ({} live entries). Type 'help' for commands.",
        style("slotcache shell").bold(),
        stats.map(|s| s.live_count).unwrap_or_default(),
    );

    let mut editor = DefaultEditor::new().context("initialize line editor")?;
    loop {
        match editor.readline("slotcache> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                let words: Vec<&str> = line.split_whitespace().collect();
                match dispatch(&cache, &words) {
                    Ok(Outcome::Continue) => {}
                    Ok(Outcome::Exit) => break,
                    Err(err) => println!("{} {err:#}", style("error:").red().bold()),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("read line"),
        }
    }
    cache.close().context("close")?;
    Ok(())
}

enum Outcome {
    Continue,
    Exit,
}

fn dispatch(cache: &Cache, words: &[&str]) -> Result<Outcome> {
    match words {
        ["help" | "?"] => print!("{HELP_TEXT}"),
        ["exit" | "quit" | ".exit"] => return Ok(Outcome::Exit),
        ["len"] => println!("{}", cache.len().context("len")?),
        ["info"] => {
            let stats = cache.stats().context("stats")?;
            println!(
                "slots {} live / {} allocated / {} capacity; buckets {} full + {} tombstones / {}; generation {}",
                stats.live_count,
                stats.slot_highwater,
                stats.slot_capacity,
                stats.bucket_used,
                stats.bucket_tombstones,
                stats.bucket_count,
                stats.generation,
            );
        }
        ["user"] => {
            let (flags, data) = cache.user_header().context("user_header")?;
            println!("flags {flags:#018x}");
            println!("data  {}", to_hex(&data));
        }
        ["get", key] => match cache.get(&parse_hex(key)?).context("get")? {
            Some(entry) => print_entry(&entry),
            None => println!("{}", style("not found").dim()),
        },
        ["put", key, revision, index] => {
            let revision: i64 = revision.parse().context("parse revision")?;
            let mut writer = cache.writer().context("acquire writer")?;
            writer
                .put(&parse_hex(key)?, revision, &parse_hex(index)?)
                .context("put")?;
            writer.commit().context("commit")?;
            println!("{}", style("ok").green());
        }
        ["put", key, revision] => {
            // Zero-width index shorthand.
            let revision: i64 = revision.parse().context("parse revision")?;
            let mut writer = cache.writer().context("acquire writer")?;
            writer.put(&parse_hex(key)?, revision, &[]).context("put")?;
            writer.commit().context("commit")?;
            println!("{}", style("ok").green());
        }
        ["del", key] => {
            let mut writer = cache.writer().context("acquire writer")?;
            let existed = writer.delete(&parse_hex(key)?).context("delete")?;
            writer.commit().context("commit")?;
            println!(
                "{}",
                if existed {
                    style("deleted").green()
                } else {
                    style("not found").dim()
                }
            );
        }
        ["scan"] => print_entries(&cache.scan(ScanOptions::new()).context("scan")?),
        ["scan", limit] => {
            let limit: usize = limit.parse().context("parse limit")?;
            print_entries(&cache.scan(ScanOptions::new().limit(limit)).context("scan")?);
        }
        ["prefix", prefix] => print_entries(
            &cache
                .scan_prefix(&parse_hex(prefix)?, ScanOptions::new())
                .context("scan_prefix")?,
        ),
        ["prefix", prefix, limit] => {
            let limit: usize = limit.parse().context("parse limit")?;
            print_entries(
                &cache
                    .scan_prefix(&parse_hex(prefix)?, ScanOptions::new().limit(limit))
                    .context("scan_prefix")?,
            );
        }
        ["range", lo, hi] => {
            let lo = (*lo != "-").then(|| parse_hex(lo)).transpose()?;
            let hi = (*hi != "-").then(|| parse_hex(hi)).transpose()?;
            print_entries(
                &cache
                    .scan_range(lo.as_deref(), hi.as_deref(), ScanOptions::new())
                    .context("scan_range")?,
            );
        }
        _ => println!("unknown command; type 'help'"),
    }
    Ok(Outcome::Continue)
}

fn print_entries(entries: &[slotcache::Entry]) {
    for entry in entries {
        print_entry(entry);
    }
    println!("{}", style(format!("{} entries", entries.len())).dim());
}
