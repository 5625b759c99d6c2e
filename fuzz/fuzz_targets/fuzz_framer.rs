#![no_main]

use libfuzzer_sys::fuzz_target;
use live_timing::StreamFramer;

fuzz_target!(|data: &[u8]| {
    // Framing arbitrary bytes in two uneven blocks must never panic and
    // must account for every byte
    let split = data.first().map_or(0, |&b| usize::from(b)).min(data.len());
    let mut framer = StreamFramer::new();
    let mut framed = 0;
    for block in [&data[..split], &data[split..]] {
        for packet in framer.feed(block).flatten() {
            framed += 2 + packet.len();
        }
    }
    assert_eq!(framed + framer.buffered(), data.len());
});
