//! MAC OUI (Organizationally Unique Identifier) vendor lookup
//!
//! Loads the IEEE registry text format, where each assignment carries a
//! line such as:
//!
//! ```text
//! 00000C     (base 16)		Cisco Systems, Inc
//! ```
//!
//! Only lines starting with six hex characters followed by a parenthesised
//! segment are recognised; the vendor name is whatever follows the first `)`.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Vendor name returned when a MAC has no registry entry.
pub const UNKNOWN_VENDOR: &str = "Unknown";

/// Immutable prefix -> vendor mapping.
#[derive(Debug, Clone, Default)]
pub struct VendorDatabase {
    vendors: HashMap<String, String>,
}

impl VendorDatabase {
    /// An empty database; every lookup yields [`UNKNOWN_VENDOR`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse registry text into a database.
    pub fn parse(source: &str) -> Self {
        let vendors: HashMap<String, String> = source.lines().filter_map(parse_line).collect();
        Self { vendors }
    }

    /// Read and parse a registry file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vendor registry {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    /// Load a registry file, degrading to an empty database when it is unavailable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::from_path(path) {
            Ok(db) => {
                tracing::info!("Loaded {} OUI vendor prefixes from {}", db.len(), path.display());
                db
            }
            Err(e) => {
                tracing::warn!("Vendor registry unavailable, vendors will be '{}': {:#}", UNKNOWN_VENDOR, e);
                Self::empty()
            }
        }
    }

    /// Replace the current contents with a fresh load of `path`.
    pub fn reload(&mut self, path: impl AsRef<Path>) {
        *self = Self::load(path);
    }

    /// Lookup the vendor/manufacturer name for a MAC address.
    ///
    /// Accepts any common format ("00:1A:2B:3C:4D:5E", "00-1a-2b-3c-4d-5e",
    /// "001a.2b3c.4d5e"). Returns [`UNKNOWN_VENDOR`] for short or unregistered
    /// addresses.
    pub fn lookup(&self, mac: &str) -> String {
        let Some(prefix) = mac_prefix(mac) else {
            return UNKNOWN_VENDOR.to_string();
        };

        match self.vendors.get(&prefix) {
            Some(vendor) => {
                tracing::debug!("OUI lookup for {}: found {}", mac, vendor);
                vendor.clone()
            }
            None => {
                tracing::debug!("OUI lookup for {}: not found in database", mac);
                UNKNOWN_VENDOR.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

/// First six hex characters of a MAC, upper-cased, ignoring separators.
pub fn mac_prefix(mac: &str) -> Option<String> {
    let hex: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(6)
        .collect();

    if hex.len() < 6 {
        return None;
    }
    Some(hex.to_ascii_uppercase())
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let prefix = line.get(..6)?;
    if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let rest = &line[6..];
    let open = rest.find('(')?;
    // The parenthesised segment must follow the prefix, separated only by whitespace.
    if !rest[..open].trim().is_empty() {
        return None;
    }
    let close = rest[open..].find(')')? + open;

    let vendor = rest[close + 1..].trim();
    if vendor.is_empty() {
        return None;
    }

    Some((prefix.to_ascii_uppercase(), vendor.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
OUI/MA-L                                                    Organization
company_id                                                  Organization
                                                            Address

00-00-0C   (hex)\t\tCisco Systems, Inc
00000C     (base 16)\t\tCisco Systems, Inc
\t\t\t\t170 WEST TASMAN DR.
\t\t\t\tSan Jose CA 95134 US

0c383e     (base 16)\t\tFanvil Technology Co., Ltd
F4F5D8     (base 16)\t\t  Google, Inc.
ABCDEF     no parenthesis here
123456     (base 16)
";

    #[test]
    fn parses_base16_lines_only() {
        let db = VendorDatabase::parse(SAMPLE);
        assert_eq!(db.len(), 3);
        assert_eq!(db.lookup("00:00:0c:12:34:56"), "Cisco Systems, Inc");
        assert_eq!(db.lookup("0C-38-3E-AA-BB-CC"), "Fanvil Technology Co., Ltd");
        assert_eq!(db.lookup("f4f5.d811.2233"), "Google, Inc.");
    }

    #[test]
    fn short_or_unknown_mac_is_unknown() {
        let db = VendorDatabase::parse(SAMPLE);
        assert_eq!(db.lookup("00:00"), UNKNOWN_VENDOR);
        assert_eq!(db.lookup("-"), UNKNOWN_VENDOR);
        assert_eq!(db.lookup(""), UNKNOWN_VENDOR);
        assert_eq!(db.lookup("AA:BB:CC:DD:EE:FF"), UNKNOWN_VENDOR);
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = VendorDatabase::load(dir.path().join("absent.txt"));
        assert!(db.is_empty());
        assert_eq!(db.lookup("00:00:0C:00:00:00"), UNKNOWN_VENDOR);
    }

    #[test]
    fn reload_replaces_instead_of_merging() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        std::fs::write(&first, "00000C     (base 16)\t\tCisco Systems, Inc\n").unwrap();
        std::fs::write(&second, "0C383E     (base 16)\t\tFanvil Technology Co., Ltd\n").unwrap();

        let mut db = VendorDatabase::load(&first);
        assert_eq!(db.lookup("00000C000000"), "Cisco Systems, Inc");

        db.reload(&second);
        assert_eq!(db.len(), 1);
        assert_eq!(db.lookup("00000C000000"), UNKNOWN_VENDOR);
        assert_eq!(db.lookup("0C383E000000"), "Fanvil Technology Co., Ltd");
    }
}
