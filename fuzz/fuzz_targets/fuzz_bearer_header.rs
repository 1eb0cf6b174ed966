//! Fuzz target for `Authorization` header handling.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_bearer_header -- -max_total_time=600

#![no_main]

use fwreg_auth::extract_bearer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(header) = std::str::from_utf8(data) else {
        return;
    };

    if let Some(token) = extract_bearer(header) {
        assert!(!token.is_empty());
        assert!(!token.contains(' '));
        assert!(header.len() > token.len());
        assert!(header[..6].eq_ignore_ascii_case("bearer"));
    }

    // Token decoding must reject garbage without panicking
    let _ = fwreg_auth::jwt::decode_header(header);
});
