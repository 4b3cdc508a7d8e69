//! Matchers - IP ranges, domains and keyword phrases

use std::net::IpAddr;
use crate::logic::error::{ShieldError, ShieldResult};

// ============================================================================
// IP RANGE (exact address or CIDR)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    pub fn parse(spec: &str) -> ShieldResult<Self> {
        let spec = spec.trim();
        let (addr, prefix) = match spec.split_once('/') {
            Some((addr, bits)) => {
                let bits: u8 = bits
                    .parse()
                    .map_err(|_| ShieldError::Config(format!("invalid CIDR prefix in '{}'", spec)))?;
                (addr, Some(bits))
            }
            None => (spec, None),
        };

        let network: IpAddr = addr
            .parse()
            .map_err(|_| ShieldError::Config(format!("invalid IP address '{}'", spec)))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return Err(ShieldError::Config(format!("CIDR prefix too long in '{}'", spec)));
        }

        Ok(Self { network, prefix })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                prefix_eq(u32::from(net) as u128, u32::from(*ip) as u128, self.prefix, 32)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                prefix_eq(u128::from(net), u128::from(*ip), self.prefix, 128)
            }
            _ => false,
        }
    }
}

fn prefix_eq(a: u128, b: u128, prefix: u8, width: u32) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = width - prefix as u32;
    (a >> shift) == (b >> shift)
}

/// True when `ip` parses and falls inside any range
pub fn ip_in_any(ip: &str, ranges: &[IpRange]) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(addr) => ranges.iter().any(|r| r.contains(&addr)),
        Err(_) => false,
    }
}

// ============================================================================
// DOMAINS & PHRASES
// ============================================================================

/// `domain` equals `blocked` or is a subdomain of it
pub fn domain_matches(domain: &str, blocked: &str) -> bool {
    domain == blocked
        || domain
            .strip_suffix(blocked)
            .map_or(false, |prefix| prefix.ends_with('.'))
}

/// Phrase occurrence bounded by non-alphanumeric characters (both inputs lower-case)
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + phrase.len()..].chars().next();
        !before.map_or(false, char::is_alphanumeric) && !after.map_or(false, char::is_alphanumeric)
    })
}
