//! Reverse hostname resolution through the system resolver tools.

use super::hidden_command_sync;
use std::net::Ipv4Addr;

/// Resolve a hostname for `ip`, trying each platform method in turn.
pub async fn resolve_hostname(ip: Ipv4Addr) -> Option<String> {
    let ip_owned = ip.to_string();
    tokio::task::spawn_blocking(move || resolve_blocking(&ip_owned))
        .await
        .ok()
        .flatten()
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn resolve_blocking(ip: &str) -> Option<String> {
    // Method 1: getent hosts
    if let Ok(output) = hidden_command_sync("getent").args(["hosts", ip]).output() {
        if output.status.success() {
            if let Some(name) = parse_getent(&String::from_utf8_lossy(&output.stdout)) {
                return Some(name);
            }
        }
    }

    // Method 2: host command
    if let Ok(output) = hidden_command_sync("host").arg(ip).output() {
        if output.status.success() {
            if let Some(name) = parse_host_pointer(&String::from_utf8_lossy(&output.stdout)) {
                return Some(name);
            }
        }
    }

    None
}

#[cfg(target_os = "windows")]
fn resolve_blocking(ip: &str) -> Option<String> {
    // Method 1: PowerShell Resolve-DnsName
    if let Ok(output) = hidden_command_sync("powershell")
        .args([
            "-NoProfile",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            &format!(
                "try {{ (Resolve-DnsName -Name '{}' -Type PTR -ErrorAction Stop).NameHost }} catch {{ }}",
                ip
            ),
        ])
        .output()
    {
        if output.status.success() {
            let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !out.is_empty() && !out.contains("error") && !out.contains(ip) {
                return out.lines().next().map(|l| l.trim().to_string());
            }
        }
    }

    // Method 2: nbtstat for NetBIOS names
    if let Ok(output) = hidden_command_sync("nbtstat").args(["-A", ip]).output() {
        return parse_nbtstat(&String::from_utf8_lossy(&output.stdout));
    }

    None
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn resolve_blocking(_ip: &str) -> Option<String> {
    let _ = hidden_command_sync;
    None
}

/// `192.168.1.5     printer.lan` -> `printer.lan`
#[cfg_attr(target_os = "windows", allow(dead_code))]
fn parse_getent(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .nth(1)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

/// `5.1.168.192.in-addr.arpa domain name pointer printer.lan.` -> `printer.lan`
#[cfg_attr(target_os = "windows", allow(dead_code))]
fn parse_host_pointer(output: &str) -> Option<String> {
    let name = output
        .split("pointer")
        .nth(1)?
        .lines()
        .next()?
        .trim()
        .trim_end_matches('.');
    (!name.is_empty()).then(|| name.to_string())
}

/// First unique `<00>` name from `nbtstat -A`.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_nbtstat(output: &str) -> Option<String> {
    output.lines().map(str::trim).find_map(|line| {
        if line.contains("<00>") && line.contains("UNIQUE") {
            line.split_whitespace().next().map(str::to_string)
        } else {
            None
        }
    })
}
