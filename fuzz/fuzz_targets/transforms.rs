#![no_main]

use libfuzzer_sys::fuzz_target;
use smolder::transform::TransformStack;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let stack = TransformStack::decode(s);
        // well-formed entries must survive a round trip
        let reencoded = TransformStack::decode(&stack.encode());
        assert_eq!(stack, reencoded);
    }
});
