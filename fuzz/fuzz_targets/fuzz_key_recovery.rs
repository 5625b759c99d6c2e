#![no_main]

use libfuzzer_sys::fuzz_target;
use live_timing::{recover_key, KeyReverser, StreamFramer};
use std::time::SystemTime;

fuzz_target!(|data: &[u8]| {
    // Key recovery on arbitrary packet streams: errors are fine, panics are not
    let mut framer = StreamFramer::new();
    let mut reverser = KeyReverser::new();
    for packet in framer.feed_at(data, SystemTime::UNIX_EPOCH).flatten() {
        let _ = recover_key(&packet);
        reverser.observe(&packet);
    }
});
