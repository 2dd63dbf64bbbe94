//! Host probing: ICMP echo through the system ping command, then TCP connects
//! against every port of the active profile.

use super::hidden_command_sync;
use super::hostname;
use super::ports::PortProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Replies with a TTL at or below this look like Unix/Linux stacks (initial TTL 64).
pub const TTL_UNIX_MAX: u8 = 65;
/// Replies with a TTL at or above this look like Windows stacks (initial TTL 128).
pub const TTL_WINDOWS_MIN: u8 = 120;

/// OS family guessed from the echo reply TTL. A heuristic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    UnixLike,
    Windows,
    #[default]
    Unknown,
}

impl OsFamily {
    pub fn from_ttl(ttl: u8) -> Self {
        if ttl <= TTL_UNIX_MAX {
            OsFamily::UnixLike
        } else if ttl >= TTL_WINDOWS_MIN {
            OsFamily::Windows
        } else {
            OsFamily::Unknown
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::UnixLike => write!(f, "Unix/Linux"),
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::Unknown => write!(f, "-"),
        }
    }
}

/// Parsed echo reply.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EchoReply {
    pub ttl: Option<u8>,
    pub time_ms: Option<f64>,
}

/// Outcome of probing one address.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeResult {
    pub reachable: bool,
    pub open_ports: BTreeSet<u16>,
    pub os_hint: OsFamily,
    pub response_time_ms: Option<f64>,
}

impl ProbeResult {
    pub fn unreachable() -> Self {
        Self::default()
    }
}

/// Timeouts for a single probe.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub ping_timeout: Duration,
    pub connect_timeout: Duration,
    pub hostname_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(150),
            hostname_timeout: Duration::from_millis(2000),
        }
    }
}

/// Reachability and service-exposure checks for one address.
#[async_trait]
pub trait HostProber: Send + Sync {
    async fn probe(&self, ip: Ipv4Addr, profile: &PortProfile) -> ProbeResult;

    /// Reverse-resolve a hostname. `None` when nothing resolves.
    async fn resolve_hostname(&self, _ip: Ipv4Addr) -> Option<String> {
        None
    }
}

/// Prober backed by the system ping command and tokio TCP connects.
#[derive(Debug, Clone, Default)]
pub struct SystemProber {
    settings: ProbeSettings,
}

impl SystemProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }
}

#[async_trait]
impl HostProber for SystemProber {
    async fn probe(&self, ip: Ipv4Addr, profile: &PortProfile) -> ProbeResult {
        let Some(reply) = ping_host(ip, self.settings.ping_timeout).await else {
            tracing::debug!("{} did not answer the echo request", ip);
            return ProbeResult::unreachable();
        };

        let open_ports = scan_ports(ip, profile.ports(), self.settings.connect_timeout).await;
        let os_hint = reply.ttl.map(OsFamily::from_ttl).unwrap_or_default();

        tracing::debug!(
            "{} is up (ttl: {:?}, hint: {}), open ports: {:?}",
            ip,
            reply.ttl,
            os_hint,
            open_ports
        );

        ProbeResult {
            reachable: true,
            open_ports,
            os_hint,
            response_time_ms: reply.time_ms,
        }
    }

    async fn resolve_hostname(&self, ip: Ipv4Addr) -> Option<String> {
        match timeout(self.settings.hostname_timeout, hostname::resolve_hostname(ip)).await {
            Ok(name) => name,
            Err(_) => {
                tracing::debug!("Hostname lookup for {} timed out", ip);
                None
            }
        }
    }
}

/// Send a single echo request using the system ping command.
pub async fn ping_host(ip: Ipv4Addr, wait: Duration) -> Option<EchoReply> {
    let ip_owned = ip.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let start = Instant::now();

        #[cfg(target_os = "windows")]
        let output = hidden_command_sync("ping")
            .args(["-n", "1", "-w", &wait.as_millis().to_string(), &ip_owned])
            .output();

        // -W takes whole seconds on Linux
        #[cfg(target_os = "linux")]
        let output = hidden_command_sync("ping")
            .args(["-c", "1", "-W", &whole_seconds(wait).to_string(), &ip_owned])
            .output();

        #[cfg(target_os = "macos")]
        let output = hidden_command_sync("ping")
            .args(["-c", "1", "-t", &whole_seconds(wait).to_string(), &ip_owned])
            .output();

        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        let output: std::io::Result<std::process::Output> = {
            let _ = (&ip_owned, wait);
            Err(std::io::Error::new(std::io::ErrorKind::Other, "Unsupported platform"))
        };

        let output = output.ok()?;
        let output_str = String::from_utf8_lossy(&output.stdout);

        #[cfg(target_os = "windows")]
        {
            let output_lower = output_str.to_lowercase();
            if output_lower.contains("request timed out")
                || output_lower.contains("destination host unreachable")
                || output_lower.contains("transmit failed")
                || output_lower.contains("general failure")
                || !output_lower.contains("reply from")
            {
                return None;
            }
        }

        #[cfg(not(target_os = "windows"))]
        {
            if !output.status.success() {
                return None;
            }
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        Some(EchoReply {
            ttl: parse_ping_ttl(&output_str),
            time_ms: Some(parse_ping_time(&output_str).unwrap_or(elapsed_ms)),
        })
    })
    .await;

    result.ok().flatten()
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn whole_seconds(wait: Duration) -> u64 {
    wait.as_millis().div_ceil(1000).max(1) as u64
}

/// Attempt a TCP connect to every port; each attempt has its own timeout.
pub async fn scan_ports(ip: Ipv4Addr, ports: &[u16], connect_timeout: Duration) -> BTreeSet<u16> {
    let attempts = ports.iter().map(|&port| async move {
        let addr = SocketAddr::new(ip.into(), port);
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Some(port),
            Ok(Err(e)) => {
                tracing::trace!("TCP connect to {}:{} failed: {}", ip, port, e);
                None
            }
            Err(_) => {
                tracing::trace!("TCP connect to {}:{} timed out", ip, port);
                None
            }
        }
    });

    futures::future::join_all(attempts)
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Parse the reply TTL (`ttl=64` on Unix, `TTL=128` on Windows).
pub fn parse_ping_ttl(output: &str) -> Option<u8> {
    output.split_whitespace().find_map(|word| {
        let lower = word.to_ascii_lowercase();
        lower.strip_prefix("ttl=").and_then(|v| v.parse::<u8>().ok())
    })
}

/// Parse ping response time from command output
pub fn parse_ping_time(output: &str) -> Option<f64> {
    for word in output.split_whitespace() {
        if word.starts_with("time=") || word.starts_with("time<") {
            let time_str = word
                .trim_start_matches("time=")
                .trim_start_matches("time<")
                .trim_end_matches("ms");

            if let Ok(time) = time_str.parse::<f64>() {
                return Some(time);
            }
        }
    }
    None
}
