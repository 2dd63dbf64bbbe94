//! Neighbor (ARP) table snapshot using system commands

use super::hidden_command_sync;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Placeholder for a missing physical address.
pub const NO_MAC: &str = "-";

/// Point-in-time IP -> MAC table, captured once per scan.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: HashMap<Ipv4Addr, String>,
}

impl NeighborTable {
    /// Build a table from known entries. MACs are normalised; invalid ones are dropped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Ipv4Addr, S)>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .filter_map(|(ip, mac)| normalize_mac(mac.as_ref()).map(|mac| (ip, mac)))
            .collect();
        Self { entries }
    }

    /// Capture the system neighbor table. Failure yields an empty table.
    pub async fn capture() -> Self {
        let result = tokio::task::spawn_blocking(read_system_table).await;
        match result {
            Ok(Ok(table)) => {
                tracing::info!("Captured {} neighbor table entries", table.len());
                table
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to read neighbor table: {:#}", e);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Neighbor table task failed: {}", e);
                Self::default()
            }
        }
    }

    /// Cached MAC for `ip`, or [`NO_MAC`].
    pub fn lookup(&self, ip: Ipv4Addr) -> String {
        self.entries
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| NO_MAC.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the orchestrator gets its per-scan neighbor table from.
#[async_trait]
pub trait NeighborSource: Send + Sync {
    async fn snapshot(&self) -> NeighborTable;
}

/// Reads the operating system's table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNeighbors;

#[async_trait]
impl NeighborSource for SystemNeighbors {
    async fn snapshot(&self) -> NeighborTable {
        NeighborTable::capture().await
    }
}

/// A fixed table always yields itself.
#[async_trait]
impl NeighborSource for NeighborTable {
    async fn snapshot(&self) -> NeighborTable {
        self.clone()
    }
}

#[cfg(target_os = "linux")]
fn read_system_table() -> Result<NeighborTable> {
    if let Ok(output) = hidden_command_sync("ip").args(["neigh", "show"]).output() {
        if output.status.success() {
            return Ok(parse_ip_neigh(&String::from_utf8_lossy(&output.stdout)));
        }
    }

    let output = hidden_command_sync("arp").args(["-n"]).output()?;
    Ok(parse_arp_linux(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(target_os = "macos")]
fn read_system_table() -> Result<NeighborTable> {
    let output = hidden_command_sync("arp").args(["-a", "-n"]).output()?;
    Ok(parse_arp_macos(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(target_os = "windows")]
fn read_system_table() -> Result<NeighborTable> {
    let output = hidden_command_sync("arp").args(["-a"]).output()?;
    Ok(parse_arp_windows(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn read_system_table() -> Result<NeighborTable> {
    let _ = hidden_command_sync;
    Ok(NeighborTable::default())
}

/// Parse `ip neigh show` output.
///
/// Format: `192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE`
pub fn parse_ip_neigh(output: &str) -> NeighborTable {
    NeighborTable::from_entries(output.lines().filter_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let ip = parts.first()?.parse::<Ipv4Addr>().ok()?;
        let state = parts.last()?;
        if state.eq_ignore_ascii_case("FAILED") || state.eq_ignore_ascii_case("INCOMPLETE") {
            return None;
        }
        let lladdr = parts.iter().position(|&p| p == "lladdr")?;
        let mac = parts.get(lladdr + 1)?;
        Some((ip, *mac))
    }))
}

/// Parse Linux `arp -n` output (header line first).
pub fn parse_arp_linux(output: &str) -> NeighborTable {
    NeighborTable::from_entries(output.lines().skip(1).filter_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }
        let ip = parts[0].parse::<Ipv4Addr>().ok()?;
        Some((ip, parts[2]))
    }))
}

/// Parse macOS `arp -a -n` output.
///
/// Format: `? (192.168.1.1) at a4:2b:b0:1:2:3 on en0 ifscope [ethernet]`
pub fn parse_arp_macos(output: &str) -> NeighborTable {
    NeighborTable::from_entries(output.lines().filter_map(|line| {
        let ip_start = line.find('(')?;
        let ip_end = line.find(')')?;
        let ip = line.get(ip_start + 1..ip_end)?.parse::<Ipv4Addr>().ok()?;
        let at_pos = line.find(" at ")?;
        let mac = line[at_pos + 4..].split_whitespace().next()?;
        Some((ip, mac))
    }))
}

/// Parse Windows `arp -a` output, skipping multicast and broadcast rows.
pub fn parse_arp_windows(output: &str) -> NeighborTable {
    NeighborTable::from_entries(output.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Interface") || line.contains("Internet Address") {
            return None;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            return None;
        }
        let ip = parts[0].parse::<Ipv4Addr>().ok()?;
        if ip.is_multicast() || ip.is_broadcast() || ip.octets()[3] == 255 {
            return None;
        }
        Some((ip, parts[1]))
    }))
}

/// Normalise a MAC to `AA:BB:CC:DD:EE:FF`.
///
/// Accepts `:` or `-` separators and the single-digit groups macOS prints.
/// Incomplete and all-zero addresses yield `None`.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let groups: Vec<&str> = mac.split([':', '-']).collect();
    if groups.len() != 6 {
        return None;
    }

    let mut octets = Vec::with_capacity(6);
    for group in groups {
        if group.is_empty() || group.len() > 2 {
            return None;
        }
        octets.push(u8::from_str_radix(group, 16).ok()?);
    }

    if octets.iter().all(|&o| o == 0) {
        return None;
    }

    Some(
        octets
            .iter()
            .map(|o| format!("{:02X}", o))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
