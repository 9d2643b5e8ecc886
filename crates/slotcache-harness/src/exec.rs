//! Differential execution: one op sequence, applied in lockstep to a real
//! cache file and to the in-memory oracle.
//!
//! Every operation's outcome is compared between the two sides: values and
//! iteration order for `Ok`, error kinds for `Err`. The raw-format
//! validator runs over the file after every writer session, invalidation,
//! and reopen, so a commit that leaves the file logically correct but
//! structurally wrong still fails the run.

use std::path::Path;

use slotcache::{Cache, Entry, MatchSpec, Options, Result, ScanOptions, Writeback};
use slotcache_oracle::Model;

use crate::ops::{Op, index_from_seed, key_from_seed};
use crate::validator;

/// Derives one of the supported cache configurations from a byte.
///
/// Spans key widths with and without padding, zero-width indexes, small
/// capacities (so `Full` is reachable), and both ordering modes.
pub fn config_from_byte(byte: u8) -> Options {
    let key_size = [2u32, 3, 8, 16][(byte & 3) as usize];
    let index_size = [0u32, 4][usize::from(byte >> 2 & 1)];
    let slot_capacity = [4u64, 16, 64][usize::from(byte >> 3) % 3];
    Options::new(key_size, index_size, slot_capacity)
        .ordered(byte >> 5 & 1 == 1)
        .user_version(7)
        .writeback(Writeback::None)
}

fn assert_same<T: PartialEq + std::fmt::Debug>(ctx: &str, engine: Result<T>, model: Result<T>) {
    match (engine, model) {
        (Ok(e), Ok(m)) => assert_eq!(e, m, "{ctx}: values diverge"),
        (Err(e), Err(m)) => {
            assert_eq!(e.kind(), m.kind(), "{ctx}: error kinds diverge ({e} vs {m})");
        }
        (engine, model) => panic!("{ctx}: engine {engine:?} vs model {model:?}"),
    }
}

fn build_scan_opts(reverse: bool, offset: u8, limit: u8, filter: u8) -> ScanOptions {
    let opts = ScanOptions::new()
        .reverse(reverse)
        .offset(usize::from(offset) % 20)
        .limit(usize::from(limit) % 10);
    // A small closed family of filters keeps both sides' behavior aligned
    // while still exercising filter-before-pagination.
    match filter {
        1 => opts.filter(|e: &Entry| e.revision % 2 == 0),
        2 => opts.filter(|e: &Entry| e.index.first().copied().unwrap_or(0) < 128),
        3 => opts.filter(|e: &Entry| e.key.last().is_some_and(|b| b & 1 == 1)),
        _ => opts,
    }
}

fn is_session_op(op: &Op) -> bool {
    matches!(
        op,
        Op::Put { .. }
            | Op::Delete { .. }
            | Op::SetUserFlags { .. }
            | Op::SetUserData { .. }
            | Op::Commit
            | Op::Discard
    )
}

/// Runs one writer session starting at `ops[start]`, returning the index of
/// the first unconsumed op.
fn run_session(
    cache: &Cache,
    model: &mut Model,
    options: &Options,
    ops: &[Op],
    start: usize,
) -> usize {
    let key_size = options.key_size as usize;
    let index_size = options.index_size as usize;
    let mut i = start;

    let (mut engine_writer, mut model_writer) = match (cache.writer(), model.writer()) {
        (Ok(engine), Ok(model)) => (engine, model),
        (Err(engine), Err(model)) => {
            assert_eq!(
                engine.kind(),
                model.kind(),
                "writer acquisition kinds diverge"
            );
            // No session: skip this write run so the walk advances.
            while i < ops.len() && is_session_op(&ops[i]) {
                let terminal = matches!(ops[i], Op::Commit | Op::Discard);
                i += 1;
                if terminal {
                    break;
                }
            }
            return i;
        }
        (engine, model) => panic!(
            "writer acquisition diverges: engine {:?} vs model {:?}",
            engine.err().map(|e| e.kind()),
            model.err().map(|e| e.kind())
        ),
    };

    while i < ops.len() {
        match ops[i] {
            Op::Put {
                key,
                revision,
                index,
            } => {
                let k = key_from_seed(key, key_size);
                let idx = index_from_seed(index, index_size);
                assert_same(
                    "put",
                    engine_writer.put(&k, i64::from(revision), &idx),
                    model_writer.put(&k, i64::from(revision), &idx),
                );
            }
            Op::Delete { key } => {
                let k = key_from_seed(key, key_size);
                assert_same("delete", engine_writer.delete(&k), model_writer.delete(&k));
            }
            Op::SetUserFlags { value } => {
                assert_same(
                    "set_user_header_flags",
                    engine_writer.set_user_header_flags(u64::from(value)),
                    model_writer.set_user_header_flags(u64::from(value)),
                );
            }
            Op::SetUserData { fill } => {
                let data = [fill; 64];
                assert_same(
                    "set_user_header_data",
                    engine_writer.set_user_header_data(&data),
                    model_writer.set_user_header_data(&data),
                );
            }
            Op::Commit => {
                assert_same("commit", engine_writer.commit(), model_writer.commit());
                return i + 1;
            }
            Op::Discard => {
                engine_writer.close();
                model_writer.close();
                return i + 1;
            }
            _ => break,
        }
        i += 1;
    }
    // Session ran off the end of the stream or into a read op: discard.
    engine_writer.close();
    model_writer.close();
    i
}

/// Applies the op sequence to a fresh file at `path` and to a fresh model,
/// panicking on any divergence or validator finding.
pub fn run_differential(path: &Path, options: &Options, ops: &[Op]) {
    let key_size = options.key_size as usize;
    let mut model = Model::new(options);
    let mut cache = Cache::open(path, options.clone()).expect("create cache file");

    let mut i = 0;
    while i < ops.len() {
        match ops[i] {
            ref op if is_session_op(op) => {
                i = run_session(&cache, &mut model, options, ops, i);
                let violations = validator::validate_file(path).expect("read cache file");
                assert!(
                    violations.is_empty(),
                    "file invalid after writer session: {violations:?}"
                );
                continue;
            }
            Op::Get { key } => {
                let k = key_from_seed(key, key_size);
                assert_same("get", cache.get(&k), model.get(&k));
            }
            Op::Len => assert_same("len", cache.len(), model.len()),
            Op::UserHeader => {
                assert_same("user_header", cache.user_header(), model.user_header());
            }
            Op::Scan {
                reverse,
                offset,
                limit,
                filter,
            } => {
                assert_same(
                    "scan",
                    cache.scan(build_scan_opts(reverse, offset, limit, filter)),
                    model.scan(build_scan_opts(reverse, offset, limit, filter)),
                );
            }
            Op::ScanPrefix { key, len } => {
                let mut prefix = key_from_seed(key, key_size);
                prefix.resize(usize::from(len) % (key_size + 2), 0);
                assert_same(
                    "scan_prefix",
                    cache.scan_prefix(&prefix, ScanOptions::new()),
                    model.scan_prefix(&prefix, ScanOptions::new()),
                );
            }
            Op::ScanMatch {
                offset,
                bits,
                pattern,
            } => {
                let bits = u32::from(bits % 12);
                let width = if bits == 0 {
                    1 + usize::from(pattern) % 2
                } else {
                    (bits as usize).div_ceil(8)
                };
                let spec = MatchSpec {
                    offset: usize::from(offset) % (key_size + 1),
                    bits,
                    bytes: vec![pattern; width],
                };
                assert_same(
                    "scan_match",
                    cache.scan_match(&spec, ScanOptions::new()),
                    model.scan_match(&spec, ScanOptions::new()),
                );
            }
            Op::ScanRange { start, end } => {
                let bound = |seed: Option<u8>| {
                    seed.map(|s| {
                        let mut b = key_from_seed(s, key_size);
                        b.truncate(1 + usize::from(s) % key_size);
                        b
                    })
                };
                let (start, end) = (bound(start), bound(end));
                assert_same(
                    "scan_range",
                    cache.scan_range(start.as_deref(), end.as_deref(), ScanOptions::new()),
                    model.scan_range(start.as_deref(), end.as_deref(), ScanOptions::new()),
                );
            }
            Op::Invalidate => {
                assert_same("invalidate", cache.invalidate(), model.invalidate());
                let violations = validator::validate_file(path).expect("read cache file");
                assert!(
                    violations.is_empty(),
                    "file invalid after invalidate: {violations:?}"
                );
            }
            Op::Reopen => {
                cache.close().expect("close with no writer live");
                cache = Cache::open(path, options.clone()).expect("reopen");
                let violations = validator::validate_file(path).expect("read cache file");
                assert!(
                    violations.is_empty(),
                    "file invalid after reopen: {violations:?}"
                );
            }
            _ => unreachable!("session ops handled above"),
        }
        i += 1;
    }

    // Final cross-check of the complete observable state.
    assert_same("final len", cache.len(), model.len());
    assert_same(
        "final scan",
        cache.scan(ScanOptions::new()),
        model.scan(ScanOptions::new()),
    );
    assert_same("final user_header", cache.user_header(), model.user_header());
}

/// Convenience entry point used by fuzz targets: derive the configuration
/// from the first byte, ops from the rest.
pub fn run_from_bytes(dir: &Path, data: &[u8]) {
    let Some((&config, rest)) = data.split_first() else {
        return;
    };
    let options = config_from_byte(config);
    let ops = crate::ops::decode_ops(rest, 64);
    let path = dir.join("differential.slc");
    run_differential(&path, &options, &ops);
}
