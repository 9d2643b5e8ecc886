#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the configuration (key width, index width, capacity,
    // ordering); the rest decodes to an op stream. The harness applies it
    // to a real file and the in-memory oracle in lockstep and panics on any
    // divergence in values, iteration order, or error kinds, and runs the
    // raw-format validator after every commit, invalidate, and reopen.
    let dir = tempfile::tempdir().expect("tempdir");
    slotcache_harness::exec::run_from_bytes(dir.path(), data);
});
