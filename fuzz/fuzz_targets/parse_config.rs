#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(cfg) = benchify_config::parse_config(s)
    {
        let _ = benchify_config::validate(&cfg);
    }
});
