#![no_main]

use libfuzzer_sys::fuzz_target;
use slotcache::{HEADER_LEN, Header, verify_crc};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic. This covers:
    // - short inputs (< 256 bytes)
    // - bad magic / version / header size / hash algorithm
    // - unknown flag bits and nonzero reserved regions
    // - out-of-range key_size / slot_capacity
    // - slot_size, bucket_count, buckets_offset that disagree with the
    //   derived values
    // - counter relations (live/highwater/capacity, bucket occupancy)
    let decoded = Header::decode(data);
    let crc_ok = verify_crc(data).is_ok();

    // A structurally valid, CRC-valid header must re-encode bit-exactly:
    // every field round-trips and the recomputed CRC matches the stored
    // one (the CRC ignores the generation by design).
    if let Ok(header) = decoded {
        if crc_ok {
            let reencoded = header.encode();
            assert_eq!(&reencoded[..], &data[..HEADER_LEN]);
        }
    }
});
