//! Named TCP port profiles used for service-exposure probing.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Name of the profile used when none is configured.
pub const DEFAULT_PROFILE: &str = "Default";

const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 53, 80, 135, 139, 443, 445, 515, 554, 631, 3389, 5060, 8080, 9100,
];

const IOT_PORTS: &[u16] = &[
    22, 23, 80, 443, 554, 1883, 1900, 5353, 5683, 8008, 8009, 8080, 8443, 8883, 9100,
];

const VOIP_PORTS: &[u16] = &[22, 80, 443, 2000, 4569, 5060, 5061, 8080];

const SURVEILLANCE_PORTS: &[u16] = &[80, 443, 554, 2020, 8000, 8080, 8443, 8554, 37777];

/// A named, immutable set of TCP ports, kept in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProfile {
    name: String,
    ports: Vec<u16>,
}

impl PortProfile {
    /// Build a profile; ports are deduplicated and sorted. Port 0 is rejected.
    pub fn new(name: impl Into<String>, ports: impl IntoIterator<Item = u16>) -> Result<Self> {
        let name = name.into();
        let ports: BTreeSet<u16> = ports.into_iter().collect();

        if name.trim().is_empty() {
            return Err(ScanError::Config("port profile name is empty".to_string()));
        }
        if ports.contains(&0) {
            return Err(ScanError::Config(format!(
                "port profile '{}' contains port 0",
                name
            )));
        }

        Ok(Self {
            name,
            ports: ports.into_iter().collect(),
        })
    }

    fn builtin(name: &str, ports: &[u16]) -> Self {
        Self {
            name: name.to_string(),
            ports: ports.iter().copied().collect::<BTreeSet<_>>().into_iter().collect(),
        }
    }

    pub fn default_profile() -> Self {
        Self::builtin(DEFAULT_PROFILE, DEFAULT_PORTS)
    }

    pub fn iot() -> Self {
        Self::builtin("IoT", IOT_PORTS)
    }

    pub fn voip() -> Self {
        Self::builtin("VoIP", VOIP_PORTS)
    }

    pub fn surveillance() -> Self {
        Self::builtin("Surveillance", SURVEILLANCE_PORTS)
    }

    /// All built-in profiles, default first.
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::default_profile(),
            Self::iot(),
            Self::voip(),
            Self::surveillance(),
        ]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.binary_search(&port).is_ok()
    }
}

impl Default for PortProfile {
    fn default() -> Self {
        Self::default_profile()
    }
}

impl fmt::Display for PortProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ports: Vec<String> = self.ports.iter().map(|p| p.to_string()).collect();
        write!(f, "{} [{}]", self.name, ports.join(", "))
    }
}

/// Resolve a profile by name (case-insensitive). Custom profiles shadow built-ins.
pub fn find_profile(name: &str, custom: &[PortProfile]) -> Result<PortProfile> {
    let wanted = name.trim();
    custom
        .iter()
        .cloned()
        .chain(PortProfile::builtins())
        .find(|p| p.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ScanError::Config(format!("unknown port profile '{}'", wanted)))
}
