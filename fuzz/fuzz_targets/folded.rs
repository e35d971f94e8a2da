#![no_main]

use libfuzzer_sys::fuzz_target;
use smolder::profile::folded::profile_from_folded;

fuzz_target!(|data: &[u8]| {
    profile_from_folded(data).ok();
});
