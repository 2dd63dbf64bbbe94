//! Address range parsing.
//!
//! Accepted notations, checked in this order:
//! - CIDR block: `192.168.1.0/24`
//! - last-octet range: `192.168.1.10-20`
//! - full range: `10.0.0.250-10.0.1.5`
//! - single address: `192.168.1.5`
//!
//! Every form describes one contiguous block, so a parsed range is stored as
//! its inclusive bounds and enumerated lazily in ascending order.

use crate::error::{Result, ScanError};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// An ordered, duplicate-free block of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl AddressRange {
    /// Parse a subnet expression into an address range.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ScanError::invalid_range(input));
        }

        if let Some((ip, prefix)) = input.split_once('/') {
            return parse_cidr(ip.trim(), prefix.trim()).ok_or_else(|| ScanError::invalid_range(input));
        }

        if let Some((left, right)) = input.split_once('-') {
            let (left, right) = (left.trim(), right.trim());
            let parsed = if right.contains('.') {
                parse_full_range(left, right)
            } else {
                parse_last_octet_range(left, right)
            };
            return parsed.ok_or_else(|| ScanError::invalid_range(input));
        }

        parse_ipv4(input)
            .map(Self::single)
            .ok_or_else(|| ScanError::invalid_range(input))
    }

    /// A range holding exactly one address.
    pub fn single(ip: Ipv4Addr) -> Self {
        Self { start: ip, end: ip }
    }

    /// Build a range from explicit bounds. Fails when `start > end`.
    pub fn from_bounds(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        if u32::from(start) > u32::from(end) {
            return Err(ScanError::InvalidRangeFormat(format!("{}-{}", start, end)));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Number of addresses in the range (`2^32` for `0.0.0.0/0`).
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }

    /// A parsed range always holds at least one address.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let ip = u32::from(ip);
        ip >= u32::from(self.start) && ip <= u32::from(self.end)
    }

    /// Iterate the addresses in ascending order.
    pub fn iter(&self) -> AddressIter {
        AddressIter {
            next: u64::from(u32::from(self.start)),
            end: u64::from(u32::from(self.end)),
        }
    }

    /// Dotted-quad strings for every address, in ascending order.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|ip| ip.to_string()).collect()
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl std::str::FromStr for AddressRange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl IntoIterator for &AddressRange {
    type Item = Ipv4Addr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

/// Ascending iterator over an [`AddressRange`].
#[derive(Debug, Clone)]
pub struct AddressIter {
    next: u64,
    end: u64,
}

impl Iterator for AddressIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next > self.end {
            return None;
        }
        // Bounded by `end`, which came from a u32.
        let ip = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(ip)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end + 1).saturating_sub(self.next);
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

fn parse_cidr(ip: &str, prefix: &str) -> Option<AddressRange> {
    let ip = parse_ipv4(ip)?;
    let prefix = parse_number(prefix).filter(|p| *p <= 32)?;
    let network = Ipv4Network::new(ip, prefix as u8).ok()?;

    Some(AddressRange {
        start: network.network(),
        end: network.broadcast(),
    })
}

fn parse_last_octet_range(left: &str, right: &str) -> Option<AddressRange> {
    let start = parse_ipv4(left)?;
    let [a, b, c, first] = start.octets();
    let last = u8::try_from(parse_number(right)?).ok()?;
    if first > last {
        return None;
    }

    Some(AddressRange {
        start,
        end: Ipv4Addr::new(a, b, c, last),
    })
}

fn parse_full_range(left: &str, right: &str) -> Option<AddressRange> {
    let start = parse_ipv4(left)?;
    let end = parse_ipv4(right)?;
    AddressRange::from_bounds(start, end).ok()
}

fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    s.trim().parse::<Ipv4Addr>().ok()
}

/// Plain decimal digits only, with the same leading-zero rule as [`Ipv4Addr`].
fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 3 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}
