//! Scan options, entries, and key matching.

use bytes::Bytes;

use crate::error::{CacheError, Result};

/// One live entry, with caller-owned copies of the key and index bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub revision: i64,
    pub index: Bytes,
}

/// Caller-supplied predicate run on each candidate entry before pagination.
pub type Filter = Box<dyn Fn(&Entry) -> bool>;

/// Options shared by every scan variant.
///
/// The filter (if any) runs on each live candidate first; `offset` then
/// skips that many surviving entries and `limit` caps the rest (`0` means
/// unlimited).
#[derive(Default)]
pub struct ScanOptions {
    pub reverse: bool,
    pub offset: usize,
    pub limit: usize,
    pub filter: Option<Filter>,
}

impl ScanOptions {
    pub fn new() -> Self {
        ScanOptions::default()
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn filter(mut self, filter: impl Fn(&Entry) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl std::fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOptions")
            .field("reverse", &self.reverse)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A bit-granular key pattern for [`Cache::scan_match`](crate::Cache::scan_match).
///
/// `offset` is a byte offset into the key. With `bits == 0` the whole of
/// `bytes` is compared byte-aligned; with `bits > 0` only the first `bits`
/// bits of `bytes` are compared, and `bytes` must be exactly
/// `ceil(bits / 8)` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    pub offset: usize,
    pub bits: u32,
    pub bytes: Vec<u8>,
}

/// Validated, ready-to-run form of a [`MatchSpec`] or prefix.
#[derive(Debug, Clone)]
pub(crate) struct KeyMatcher {
    offset: usize,
    bytes: Vec<u8>,
    /// Mask applied to the final byte; `0xFF` when the pattern is byte-aligned.
    last_mask: u8,
}

impl KeyMatcher {
    pub fn from_prefix(prefix: &[u8], key_size: usize) -> Result<KeyMatcher> {
        if prefix.is_empty() || prefix.len() > key_size {
            return Err(CacheError::invalid_input(format!(
                "prefix length {} outside 1..={key_size}",
                prefix.len()
            )));
        }
        Ok(KeyMatcher {
            offset: 0,
            bytes: prefix.to_vec(),
            last_mask: 0xFF,
        })
    }

    pub fn from_match_spec(spec: &MatchSpec, key_size: usize) -> Result<KeyMatcher> {
        if spec.offset >= key_size {
            return Err(CacheError::invalid_input(format!(
                "match offset {} outside key of {key_size} bytes",
                spec.offset
            )));
        }
        if spec.bits == 0 {
            if spec.bytes.is_empty() {
                return Err(CacheError::invalid_input("match bytes must not be empty"));
            }
            if spec.offset + spec.bytes.len() > key_size {
                return Err(CacheError::invalid_input(
                    "match pattern extends past the end of the key",
                ));
            }
            return Ok(KeyMatcher {
                offset: spec.offset,
                bytes: spec.bytes.clone(),
                last_mask: 0xFF,
            });
        }

        let want = (spec.bits as usize).div_ceil(8);
        if spec.bytes.len() != want {
            return Err(CacheError::invalid_input(format!(
                "{} pattern bytes for {} bits, expected {want}",
                spec.bytes.len(),
                spec.bits
            )));
        }
        if spec.offset + want > key_size {
            return Err(CacheError::invalid_input(
                "match pattern extends past the end of the key",
            ));
        }
        let rem = spec.bits % 8;
        let last_mask = if rem == 0 { 0xFF } else { 0xFFu8 << (8 - rem) };
        Ok(KeyMatcher {
            offset: spec.offset,
            bytes: spec.bytes.clone(),
            last_mask,
        })
    }

    /// Tests the pattern against a full-width key.
    pub fn matches(&self, key: &[u8]) -> bool {
        let n = self.bytes.len();
        let region = &key[self.offset..self.offset + n];
        region[..n - 1] == self.bytes[..n - 1]
            && (region[n - 1] ^ self.bytes[n - 1]) & self.last_mask == 0
    }
}

/// Applies filter-then-pagination over an iterator of candidate entries,
/// materializing the page.
pub(crate) fn paginate(
    candidates: impl Iterator<Item = Entry>,
    opts: &ScanOptions,
) -> Vec<Entry> {
    let filtered = candidates.filter(|entry| match &opts.filter {
        Some(filter) => filter(entry),
        None => true,
    });
    let skipped = filtered.skip(opts.offset);
    if opts.limit == 0 {
        skipped.collect()
    } else {
        skipped.take(opts.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(offset: usize, bits: u32, bytes: &[u8]) -> MatchSpec {
        MatchSpec {
            offset,
            bits,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn prefix_matches_only_its_prefix() {
        let matcher = KeyMatcher::from_prefix(b"ab", 4).unwrap();
        assert!(matcher.matches(b"abcd"));
        assert!(matcher.matches(b"abzz"));
        assert!(!matcher.matches(b"aacd"));
    }

    #[test]
    fn prefix_of_full_key_size_is_exact_match() {
        let matcher = KeyMatcher::from_prefix(b"abcd", 4).unwrap();
        assert!(matcher.matches(b"abcd"));
        assert!(!matcher.matches(b"abce"));
    }

    #[test]
    fn prefix_length_validation() {
        assert!(KeyMatcher::from_prefix(b"", 4).is_err());
        assert!(KeyMatcher::from_prefix(b"abcde", 4).is_err());
    }

    #[test]
    fn byte_aligned_match_at_offset() {
        let matcher = KeyMatcher::from_match_spec(&spec(2, 0, b"cd"), 4).unwrap();
        assert!(matcher.matches(b"xxcd"));
        assert!(!matcher.matches(b"cdxx"));
    }

    #[test]
    fn ten_bit_match_ignores_low_bits() {
        // bits = 10: first byte fully compared, second byte only its top
        // two bits.
        let matcher = KeyMatcher::from_match_spec(&spec(0, 10, &[0xAB, 0b1100_0000]), 2).unwrap();
        assert!(matcher.matches(&[0xAB, 0b1100_0000]));
        assert!(matcher.matches(&[0xAB, 0b1111_1111]));
        assert!(!matcher.matches(&[0xAB, 0b0100_0000]));
        assert!(!matcher.matches(&[0xAA, 0b1100_0000]));
    }

    #[test]
    fn byte_multiple_bits_compare_all_bytes() {
        let matcher = KeyMatcher::from_match_spec(&spec(0, 16, &[0x12, 0x34]), 4).unwrap();
        assert!(matcher.matches(&[0x12, 0x34, 0, 0]));
        assert!(!matcher.matches(&[0x12, 0x35, 0, 0]));
    }

    #[test]
    fn match_spec_validation() {
        // offset past the key
        assert!(KeyMatcher::from_match_spec(&spec(4, 0, b"a"), 4).is_err());
        // empty byte-aligned pattern
        assert!(KeyMatcher::from_match_spec(&spec(0, 0, b""), 4).is_err());
        // pattern overruns the key
        assert!(KeyMatcher::from_match_spec(&spec(3, 0, b"ab"), 4).is_err());
        // wrong byte count for the bit width
        assert!(KeyMatcher::from_match_spec(&spec(0, 10, b"a"), 4).is_err());
        assert!(KeyMatcher::from_match_spec(&spec(0, 10, b"abc"), 4).is_err());
        // bit pattern overruns the key
        assert!(KeyMatcher::from_match_spec(&spec(3, 10, &[0, 0]), 4).is_err());
    }

    #[test]
    fn paginate_filters_before_offset_and_limit() {
        let entries: Vec<Entry> = (0..10)
            .map(|i| Entry {
                key: Bytes::from(vec![i]),
                revision: i64::from(i),
                index: Bytes::new(),
            })
            .collect();

        let opts = ScanOptions::new()
            .filter(|e: &Entry| e.revision % 2 == 0)
            .offset(1)
            .limit(2);
        let page = paginate(entries.into_iter(), &opts);
        let revs: Vec<i64> = page.iter().map(|e| e.revision).collect();
        assert_eq!(revs, vec![2, 4]);
    }

    #[test]
    fn paginate_offset_past_end_is_empty() {
        let entries = vec![Entry {
            key: Bytes::from_static(b"k"),
            revision: 1,
            index: Bytes::new(),
        }];
        let opts = ScanOptions::new().offset(5);
        assert!(paginate(entries.into_iter(), &opts).is_empty());
    }
}
