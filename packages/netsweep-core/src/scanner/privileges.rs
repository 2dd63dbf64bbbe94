//! What this process can probe.
//!
//! Echo probes shell out to the system `ping` and MACs come from the system
//! neighbor table, so neither needs raw sockets. When either command is
//! missing or refused, results degrade silently; [`detect_capabilities`]
//! lets the orchestrator and the CLI say so up front.

use super::hidden_command_sync;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCapabilities {
    pub can_ping: bool,
    pub can_read_neighbors: bool,
    pub is_elevated: bool,
}

impl Default for ScanCapabilities {
    fn default() -> Self {
        Self {
            can_ping: true,
            can_read_neighbors: true,
            is_elevated: false,
        }
    }
}

impl ScanCapabilities {
    pub fn is_limited(&self) -> bool {
        !(self.can_ping && self.can_read_neighbors)
    }

    /// The most severe missing capability, phrased for a log line.
    pub fn warning(&self) -> Option<&'static str> {
        if !self.can_ping {
            Some("system ping is unavailable, every host will be reported unreachable")
        } else if !self.can_read_neighbors {
            Some("neighbor table is unavailable, MACs and vendors will be missing")
        } else {
            None
        }
    }
}

#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(target_os = "windows")]
pub fn is_elevated() -> bool {
    hidden_command_sync("whoami")
        .arg("/groups")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("S-1-16-12288"))
        .unwrap_or(false)
}

#[cfg(not(any(unix, target_os = "windows")))]
pub fn is_elevated() -> bool {
    false
}

/// True when `program args..` runs and exits successfully.
fn succeeds(program: &str, args: &[&str]) -> bool {
    hidden_command_sync(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn ping_loopback() -> bool {
    if cfg!(target_os = "windows") {
        succeeds("ping", &["-n", "1", "-w", "500", "127.0.0.1"])
    } else if cfg!(target_os = "macos") {
        succeeds("ping", &["-c", "1", "-t", "1", "127.0.0.1"])
    } else {
        succeeds("ping", &["-c", "1", "-W", "1", "127.0.0.1"])
    }
}

fn read_neighbors() -> bool {
    if cfg!(target_os = "linux") {
        succeeds("ip", &["neigh", "show"]) || succeeds("arp", &["-n"])
    } else {
        succeeds("arp", &["-a"])
    }
}

/// Run the capability checks off the async threads.
pub async fn detect_capabilities() -> ScanCapabilities {
    tokio::task::spawn_blocking(|| ScanCapabilities {
        can_ping: ping_loopback(),
        can_read_neighbors: read_neighbors(),
        is_elevated: is_elevated(),
    })
    .await
    .unwrap_or_else(|e| {
        tracing::warn!("Capability check failed: {}", e);
        ScanCapabilities {
            can_ping: false,
            can_read_neighbors: false,
            is_elevated: false,
        }
    })
}

fn platform_hint() -> &'static str {
    if cfg!(target_os = "linux") {
        "Give the system ping CAP_NET_RAW (sudo setcap cap_net_raw+ep /bin/ping)\n\
         and install iproute2 or net-tools for the neighbor table."
    } else if cfg!(target_os = "windows") {
        "ping and arp normally work without admin rights; check that they are\n\
         on PATH and not blocked by endpoint policy."
    } else if cfg!(target_os = "macos") {
        "ping and arp work without root; check System Settings > Privacy & Security\n\
         for blocked network access."
    } else {
        "Make sure a ping and an arp command are available on PATH."
    }
}

/// Multi-line summary for the `capabilities` subcommand.
pub fn format_capabilities_message(caps: &ScanCapabilities) -> String {
    if !caps.is_limited() {
        return "Probing with full capabilities".to_string();
    }

    let mut msg = String::from("Probing with limited capabilities:\n");
    if !caps.can_ping {
        msg.push_str("  - Echo probe unavailable (all hosts will appear unreachable)\n");
    }
    if !caps.can_read_neighbors {
        msg.push_str("  - Neighbor table unavailable (no MAC or vendor data)\n");
    }
    msg.push('\n');
    msg.push_str(platform_hint());
    msg
}
