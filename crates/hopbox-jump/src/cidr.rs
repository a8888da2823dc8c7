//! CIDR block parsing and containment
//!
//! Subnets report their address space as `network/prefix-len` strings.
//! Containment is the standard bitwise prefix comparison:
//! `(addr & mask) == (network & mask)`.

use crate::error::{JumpError, Result};
use std::net::IpAddr;

/// An address prefix in `network/len` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrBlock {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || JumpError::InvalidAddress(raw.to_string());
        let (addr, len) = raw.split_once('/').ok_or_else(invalid)?;
        let network: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let prefix_len: u8 = len.trim().parse().map_err(|_| invalid())?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(invalid());
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `addr` falls inside this block. An address of the other
    /// family never matches.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_v4(self.prefix_len);
                u32::from(ip) & mask == u32::from(net) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_v6(self.prefix_len);
                u128::from(ip) & mask == u128::from(net) & mask
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn mask_v4(len: u8) -> u32 {
    if len == 0 { 0 } else { u32::MAX << (32 - len as u32) }
}

fn mask_v6(len: u8) -> u128 {
    if len == 0 { 0 } else { u128::MAX << (128 - len as u32) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn contains_matches_the_bitwise_definition() {
        // contains(P, A) == (A & mask(P)) == (network(P) & mask(P))
        let cases = [
            ("10.0.1.0/24", "10.0.1.55"),
            ("10.0.1.0/24", "10.0.2.1"),
            ("192.168.0.0/16", "192.168.200.13"),
            ("192.168.0.0/16", "192.169.0.1"),
            ("172.16.5.4/30", "172.16.5.7"),
            ("172.16.5.4/30", "172.16.5.8"),
            ("0.0.0.0/0", "255.255.255.255"),
        ];
        for (prefix, addr) in cases {
            let block = CidrBlock::parse(prefix).unwrap();
            let (IpAddr::V4(net), IpAddr::V4(probe)) = (block.network, ip(addr)) else {
                unreachable!()
            };
            let mask = mask_v4(block.prefix_len);
            let expected = u32::from(probe) & mask == u32::from(net) & mask;
            assert_eq!(block.contains(ip(addr)), expected, "{prefix} vs {addr}");
        }
    }

    #[test]
    fn exact_host_prefix() {
        let block = CidrBlock::parse("10.1.2.3/32").unwrap();
        assert!(block.contains(ip("10.1.2.3")));
        assert!(!block.contains(ip("10.1.2.4")));
    }

    #[test]
    fn zero_length_prefix_contains_everything() {
        let block = CidrBlock::parse("0.0.0.0/0").unwrap();
        assert!(block.contains(ip("1.2.3.4")));
        assert!(block.contains(ip("255.0.0.1")));
    }

    #[test]
    fn ipv6_containment() {
        let block = CidrBlock::parse("fd00:1234::/32").unwrap();
        assert!(block.contains(ip("fd00:1234:0:1::5")));
        assert!(!block.contains(ip("fd00:1235::1")));
    }

    #[test]
    fn mixed_families_never_match() {
        let block = CidrBlock::parse("10.0.0.0/8").unwrap();
        assert!(!block.contains(ip("::ffff:a00:1")));
    }

    #[test]
    fn rejects_malformed_prefixes() {
        for raw in ["10.0.0.0", "10.0.0.0/33", "banana/24", "10.0.0.0/x", "fd00::/129"] {
            assert!(
                matches!(CidrBlock::parse(raw), Err(JumpError::InvalidAddress(_))),
                "{raw} should not parse"
            );
        }
    }
}
