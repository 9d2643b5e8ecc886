//! Deterministic operation generation from raw bytes.
//!
//! A byte stream decodes to a bounded op sequence: one opcode byte selects
//! the operation, following bytes fill its arguments. Decoding stops at the
//! end of input or at `max_ops`. Key material is drawn from a 64-key
//! alphabet so that collisions, updates, re-inserts, and ordered-mode
//! violations all occur with useful frequency.
//!
//! Write ops are session-scoped by the executor: a maximal run of
//! `Put`/`Delete`/`SetUserFlags`/`SetUserData` terminated by `Commit`,
//! `Discard`, or end-of-input forms one writer session.

/// One generated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put { key: u8, revision: i8, index: u8 },
    Delete { key: u8 },
    SetUserFlags { value: u8 },
    SetUserData { fill: u8 },
    Commit,
    Discard,
    Get { key: u8 },
    Len,
    UserHeader,
    Scan { reverse: bool, offset: u8, limit: u8, filter: u8 },
    ScanPrefix { key: u8, len: u8 },
    ScanMatch { offset: u8, bits: u8, pattern: u8 },
    ScanRange { start: Option<u8>, end: Option<u8> },
    Invalidate,
    Reopen,
}

/// Decodes `data` into at most `max_ops` operations.
pub fn decode_ops(data: &[u8], max_ops: usize) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut cursor = data.iter().copied();
    let mut next = || cursor.next();

    while ops.len() < max_ops {
        let Some(opcode) = next() else { break };
        let op = match opcode % 15 {
            0 | 1 | 2 => {
                let (Some(key), Some(revision), Some(index)) = (next(), next(), next()) else {
                    break;
                };
                Op::Put {
                    key,
                    revision: revision as i8,
                    index,
                }
            }
            3 => {
                let Some(key) = next() else { break };
                Op::Delete { key }
            }
            4 => Op::Commit,
            5 => Op::Discard,
            6 | 7 => {
                let Some(key) = next() else { break };
                Op::Get { key }
            }
            8 => Op::Len,
            9 => {
                let (Some(flags), Some(reverse)) = (next(), next()) else {
                    break;
                };
                let (Some(offset), Some(limit)) = (next(), next()) else {
                    break;
                };
                Op::Scan {
                    reverse: reverse & 1 == 1,
                    offset,
                    limit,
                    filter: flags % 4,
                }
            }
            10 => {
                let (Some(key), Some(len)) = (next(), next()) else {
                    break;
                };
                Op::ScanPrefix { key, len }
            }
            11 => {
                let (Some(offset), Some(bits), Some(pattern)) = (next(), next(), next()) else {
                    break;
                };
                Op::ScanMatch {
                    offset,
                    bits,
                    pattern,
                }
            }
            12 => {
                let (Some(start), Some(end)) = (next(), next()) else {
                    break;
                };
                Op::ScanRange {
                    start: (start != 0xFF).then_some(start),
                    end: (end != 0xFF).then_some(end),
                }
            }
            13 => {
                let Some(which) = next() else { break };
                match which % 3 {
                    0 => Op::SetUserFlags { value: which },
                    1 => Op::SetUserData { fill: which },
                    _ => Op::UserHeader,
                }
            }
            _ => {
                let Some(which) = next() else { break };
                // Invalidation ends the whole stream's usefulness, so make
                // it rare relative to reopen.
                if which % 8 == 0 {
                    Op::Invalidate
                } else {
                    Op::Reopen
                }
            }
        };
        ops.push(op);
    }
    ops.push(Op::Commit);
    ops
}

/// Builds a full-width key from a seed. The alphabet is 64 keys wide: two
/// leading bits and four trailing bits of the seed, so byte-lex order over
/// keys follows `(seed >> 4 & 3, seed & 15)`.
pub fn key_from_seed(seed: u8, key_size: usize) -> Vec<u8> {
    let mut key = vec![0u8; key_size];
    key[0] = (seed >> 4) & 3;
    key[key_size - 1] = seed & 15;
    key
}

/// Builds a full-width index payload from a seed.
pub fn index_from_seed(seed: u8, index_size: usize) -> Vec<u8> {
    vec![seed; index_size]
}
