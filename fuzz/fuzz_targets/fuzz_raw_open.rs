#![no_main]

use libfuzzer_sys::fuzz_target;
use slotcache::Cache;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes on disk, opened as a cache file. Open must either
    // produce a working handle (only for a genuinely well-formed file) or
    // fail with an error; it must never panic or read out of bounds.
    let Some((&config, contents)) = data.split_first() else {
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("raw.slc");
    std::fs::write(&path, contents).expect("write fuzz file");

    let _ = Cache::inspect(&path);

    let options = slotcache_harness::exec::config_from_byte(config);
    let key_size = options.key_size as usize;
    if let Ok(cache) = Cache::open(&path, options) {
        // A handle that validated must survive basic reads.
        let _ = cache.len();
        let _ = cache.scan(slotcache::ScanOptions::new());
        let _ = cache.get(&vec![0u8; key_size]);
    }
});
