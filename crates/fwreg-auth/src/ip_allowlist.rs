//! Peer-address allowlist.
//!
//! A match here is a full trust boundary: a listed peer skips every other
//! credential check for both the admin and device roles.

use ipnetwork::IpNetwork;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use tracing::warn;

/// One configured allowlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowEntry {
    /// A single address, stored in canonical form.
    Ip(IpAddr),
    /// A CIDR subnet.
    Subnet(IpNetwork),
}

impl FromStr for AllowEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains('/') {
            s.parse::<IpNetwork>()
                .map(AllowEntry::Subnet)
                .map_err(|e| format!("{s}: {e}"))
        } else {
            s.parse::<IpAddr>()
                .map(|ip| AllowEntry::Ip(ip.to_canonical()))
                .map_err(|e| format!("{s}: {e}"))
        }
    }
}

impl fmt::Display for AllowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowEntry::Ip(ip) => write!(f, "{ip}"),
            AllowEntry::Subnet(net) => write!(f, "{net}"),
        }
    }
}

/// Literal IPs and subnets whose peers bypass authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowlist {
    ips: Vec<IpAddr>,
    subnets: Vec<IpNetwork>,
    rejected: Vec<String>,
}

impl IpAllowlist {
    /// Build an allowlist from already-parsed entries.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = AllowEntry>) -> Self {
        let mut list = Self::default();
        for entry in entries {
            list.push(entry);
        }
        list
    }

    /// Build an allowlist from raw configuration strings.
    ///
    /// Blank entries are ignored. Entries that fail to parse are skipped with
    /// a warning and kept in [`rejected`](Self::rejected).
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for raw in entries {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match raw.parse::<AllowEntry>() {
                Ok(entry) => list.push(entry),
                Err(error) => {
                    warn!(entry = %raw, %error, "Ignoring invalid allowlist entry");
                    list.rejected.push(raw.to_string());
                }
            }
        }
        list
    }

    fn push(&mut self, entry: AllowEntry) {
        match entry {
            AllowEntry::Ip(ip) => self.ips.push(ip.to_canonical()),
            AllowEntry::Subnet(net) => self.subnets.push(net),
        }
    }

    /// True when no IPs or subnets are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.subnets.is_empty()
    }

    /// Number of configured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ips.len() + self.subnets.len()
    }

    /// Raw entries that failed to parse, in configuration order.
    #[must_use]
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Whether `peer` (optionally carrying a port) is allow-listed.
    ///
    /// Unparseable input never matches.
    #[must_use]
    pub fn is_bypassed(&self, peer: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        match parse_peer(peer) {
            Some(ip) => self.contains(ip),
            None => false,
        }
    }

    /// Whether an already-parsed address is allow-listed.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        let canonical = ip.to_canonical();
        if self.ips.iter().any(|listed| *listed == canonical) {
            return true;
        }
        self.subnets
            .iter()
            .any(|net| net.contains(canonical) || net.contains(ip))
    }
}

/// Parse a peer address of the forms `ip`, `ip:port`, `[v6]` or `[v6]:port`.
///
/// IPv4-mapped IPv6 addresses come back as plain IPv4.
#[must_use]
pub fn parse_peer(peer: &str) -> Option<IpAddr> {
    let peer = peer.trim();
    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return Some(addr.ip().to_canonical());
    }
    if let Ok(ip) = peer.parse::<IpAddr>() {
        return Some(ip.to_canonical());
    }
    peer.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|host| host.parse::<IpAddr>().ok())
        .map(|ip| ip.to_canonical())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist(entries: &[&str]) -> IpAllowlist {
        IpAllowlist::from_entries(entries.iter().copied())
    }

    #[test]
    fn test_empty_allowlist_never_bypasses() {
        let list = IpAllowlist::default();
        assert!(list.is_empty());
        assert!(!list.is_bypassed("127.0.0.1"));
        assert!(!list.is_bypassed("127.0.0.1:9000"));
    }

    #[test]
    fn test_literal_ip_with_and_without_port() {
        let list = allowlist(&["192.168.1.10"]);
        assert!(list.is_bypassed("192.168.1.10"));
        assert!(list.is_bypassed("192.168.1.10:54321"));
        assert!(!list.is_bypassed("192.168.1.11:54321"));
    }

    #[test]
    fn test_subnet_match_ipv4() {
        let list = allowlist(&["10.0.0.0/8"]);
        assert!(list.is_bypassed("10.20.30.40:80"));
        assert!(!list.is_bypassed("11.0.0.1:80"));
    }

    #[test]
    fn test_subnet_match_ipv6() {
        let list = allowlist(&["2001:db8::/32"]);
        assert!(list.is_bypassed("[2001:db8::1]:443"));
        assert!(list.is_bypassed("2001:db8::ffff"));
        assert!(!list.is_bypassed("[2001:db9::1]:443"));
    }

    #[test]
    fn test_ipv4_mapped_peer_matches_ipv4_entries() {
        let list = allowlist(&["127.0.0.1", "172.16.0.0/12"]);
        assert!(list.is_bypassed("[::ffff:127.0.0.1]:8080"));
        assert!(list.is_bypassed("::ffff:172.16.5.4"));
    }

    #[test]
    fn test_mapped_literal_entry_matches_plain_ipv4_peer() {
        let list = allowlist(&["::ffff:127.0.0.1"]);
        assert!(list.is_bypassed("127.0.0.1:1234"));
    }

    #[test]
    fn test_unparseable_peer_fails_closed() {
        let list = allowlist(&["0.0.0.0/0"]);
        assert!(!list.is_bypassed(""));
        assert!(!list.is_bypassed("not-an-ip"));
        assert!(!list.is_bypassed("localhost:8080"));
        assert!(!list.is_bypassed("[::1"));
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let list = allowlist(&["bogus", " 10.1.1.1 ", "", "300.1.1.1", "10.0.0.0/33"]);
        assert_eq!(list.len(), 1);
        assert!(list.is_bypassed("10.1.1.1"));
        assert_eq!(list.rejected(), ["bogus", "300.1.1.1", "10.0.0.0/33"]);
        assert!(allowlist(&["10.0.0.0/8", " "]).rejected().is_empty());
    }

    #[test]
    fn test_parse_peer_forms() {
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();
        assert_eq!(parse_peer("10.0.0.1"), Some(v4));
        assert_eq!(parse_peer("10.0.0.1:80"), Some(v4));
        assert_eq!(parse_peer("[::1]:80"), Some(v6));
        assert_eq!(parse_peer("[::1]"), Some(v6));
        assert_eq!(parse_peer("::1"), Some(v6));
        assert_eq!(parse_peer("10.0.0.1:notaport"), None);
    }

    #[test]
    fn test_entry_display_roundtrips_config_text() {
        let entry: AllowEntry = "192.168.0.0/16".parse().unwrap();
        assert_eq!(entry.to_string(), "192.168.0.0/16");
    }
}
