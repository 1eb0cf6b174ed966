//! Fuzz target for peer-address parsing and allowlist matching.
//!
//! Peer strings come straight from the connection layer and allowlist
//! entries from operator config; neither may panic on odd input.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_peer_address -- -max_total_time=600

#![no_main]

use fwreg_auth::{parse_peer, AllowEntry, IpAllowlist};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Parsed peers are always canonical
    if let Some(ip) = parse_peer(s) {
        assert_eq!(ip, ip.to_canonical());
    }

    // First line is the allowlist config, the rest are peers
    let mut lines = s.lines();
    let entries = lines.next().unwrap_or_default();
    let allowlist = IpAllowlist::from_entries(entries.split(','));
    for peer in lines {
        let bypassed = allowlist.is_bypassed(peer);
        if allowlist.is_empty() {
            assert!(!bypassed);
        }
        if bypassed {
            assert!(parse_peer(peer).is_some());
        }
    }

    // Entries that parse display in a form that parses again
    for raw in entries.split(',') {
        if let Ok(entry) = raw.trim().parse::<AllowEntry>() {
            let shown = entry.to_string();
            assert!(shown.parse::<AllowEntry>().is_ok());
        }
    }
});
