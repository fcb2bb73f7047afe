#![no_main]

use libfuzzer_sys::fuzz_target;
use showdown_client::team::{self, UnsetStats};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(packed) = team::export_to_packed(text, UnsetStats::Blank) {
        let _ = team::validate_packed(&packed);
    }
    let _ = team::export_to_packed(text, UnsetStats::Explicit);
    let _ = team::validate_packed(text);
});
