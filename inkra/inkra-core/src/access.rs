//! IP allow-list evaluation for the signing action.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// An IP network in CIDR notation. Host bits in the address are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match (self.network, ip) {
            (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => return false,
            },
            (_, ip) => ip,
        };
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("missing prefix length in {s:?}"))?;
        let network: IpAddr = addr.parse().map_err(|_| format!("invalid address in {s:?}"))?;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid prefix length in {s:?}"));
        }
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("invalid prefix length in {s:?}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(format!("prefix length out of range in {s:?}"));
        }
        Ok(Self { network, prefix })
    }
}

/// Decide whether `client_ip` may sign a document guarded by `whitelist`.
///
/// An empty whitelist allows everyone. Otherwise the client address must
/// parse, and match either an exact literal entry or a CIDR entry (any entry
/// containing `/`). Malformed CIDR entries never match.
pub fn is_allowed(client_ip: &str, whitelist: &[String]) -> bool {
    if whitelist.is_empty() {
        return true;
    }
    let ip: IpAddr = match client_ip.parse() {
        Ok(ip) => ip,
        Err(_) => return false,
    };
    whitelist.iter().any(|entry| {
        if entry.contains('/') {
            entry
                .parse::<Cidr>()
                .map(|net| net.contains(ip))
                .unwrap_or(false)
        } else {
            entry == client_ip
        }
    })
}

/// Pick the address a request should be attributed to.
///
/// With `trust_headers` the first `X-Forwarded-For` hop wins, then
/// `X-Real-IP`; the transport peer is the last resort. Without it only the
/// peer is used, so clients cannot spoof their address when no trusted proxy
/// sits in front of the server.
pub fn resolve_client_ip(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<SocketAddr>,
    trust_headers: bool,
) -> Option<String> {
    if trust_headers {
        if let Some(first) = forwarded_for
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Some(first.to_string());
        }
        if let Some(real) = real_ip.map(str::trim).filter(|s| !s.is_empty()) {
            return Some(real.to_string());
        }
    }
    peer.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_whitelist_is_open() {
        assert!(is_allowed("10.0.0.5", &[]));
        assert!(is_allowed("not-an-ip", &[]));
    }

    #[test]
    fn cidr_membership() {
        assert!(is_allowed("10.0.0.5", &list(&["10.0.0.0/24"])));
        assert!(!is_allowed("10.0.0.5", &list(&["10.0.1.0/24"])));
        assert!(is_allowed("203.0.113.50", &list(&["198.51.100.0/24", "203.0.113.0/24"])));
    }

    #[test]
    fn unparseable_client_fails_closed() {
        assert!(!is_allowed("not-an-ip", &list(&["0.0.0.0/0"])));
        assert!(!is_allowed("", &list(&["10.0.0.5"])));
    }

    #[test]
    fn literal_entries_match_exactly() {
        assert!(is_allowed("198.51.100.7", &list(&["198.51.100.7"])));
        assert!(!is_allowed("198.51.100.70", &list(&["198.51.100.7"])));
    }

    #[test]
    fn malformed_cidr_never_matches() {
        let wl = list(&["10.0.0.0/33", "10.0.0.0/", "bogus/8", "10.0.0.5"]);
        assert!(!is_allowed("10.0.0.6", &wl));
        assert!(is_allowed("10.0.0.5", &wl));
    }

    #[test]
    fn host_bits_in_network_are_ignored() {
        assert!(is_allowed("192.0.2.200", &list(&["192.0.2.1/24"])));
    }

    #[test]
    fn ipv6_and_mapped_addresses() {
        assert!(is_allowed("2001:db8::1", &list(&["2001:db8::/32"])));
        assert!(!is_allowed("2001:db9::1", &list(&["2001:db8::/32"])));
        assert!(is_allowed("::ffff:10.0.0.5", &list(&["10.0.0.0/8"])));
        assert!(!is_allowed("10.0.0.5", &list(&["::/0"])));
    }

    #[test]
    fn zero_prefix_matches_family() {
        assert!(is_allowed("8.8.8.8", &list(&["0.0.0.0/0"])));
    }

    #[test]
    fn client_ip_precedence() {
        let peer: SocketAddr = "192.0.2.9:51234".parse().unwrap();
        assert_eq!(
            resolve_client_ip(Some("203.0.113.5, 10.0.0.1"), Some("10.9.9.9"), Some(peer), true),
            Some("203.0.113.5".to_string())
        );
        assert_eq!(
            resolve_client_ip(None, Some(" 10.9.9.9 "), Some(peer), true),
            Some("10.9.9.9".to_string())
        );
        assert_eq!(
            resolve_client_ip(None, None, Some(peer), true),
            Some("192.0.2.9".to_string())
        );
        assert_eq!(resolve_client_ip(None, None, None, true), None);
    }

    #[test]
    fn untrusted_headers_are_ignored() {
        let peer: SocketAddr = "[2001:db8::7]:443".parse().unwrap();
        assert_eq!(
            resolve_client_ip(Some("203.0.113.5"), Some("10.9.9.9"), Some(peer), false),
            Some("2001:db8::7".to_string())
        );
    }
}
