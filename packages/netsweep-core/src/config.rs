//! Scan configuration.
//!
//! Priority:
//! 1. Environment variables (`NETSWEEP_PROFILE`, `NETSWEEP_VENDOR_DB`, `NETSWEEP_STORE`)
//! 2. Config file (`~/.config/netsweep/config.toml`)
//! 3. Default values

use crate::error::Result;
use crate::scanner::ports::{self, PortProfile, DEFAULT_PROFILE};
use crate::scanner::ping::ProbeSettings;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PROFILE: &str = "NETSWEEP_PROFILE";
const ENV_VENDOR_DB: &str = "NETSWEEP_VENDOR_DB";
const ENV_STORE: &str = "NETSWEEP_STORE";

const DEFAULT_PING_TIMEOUT_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 150;
const DEFAULT_HOSTNAME_TIMEOUT_MS: u64 = 2000;
/// Upper bound on addresses probed at once.
pub const MAX_CONCURRENCY: usize = 256;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    scan: Option<ScanSection>,
    paths: Option<PathsSection>,
    #[serde(default)]
    profiles: BTreeMap<String, ProfileSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ScanSection {
    profile: Option<String>,
    ping_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    hostname_timeout_ms: Option<u64>,
    concurrency: Option<usize>,
    resolve_hostnames: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsSection {
    vendor_db: Option<PathBuf>,
    store: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ProfileSection {
    ports: Vec<u16>,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// At least one value came from an environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Runtime scan configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Active port profile name
    pub profile: String,
    pub ping_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub hostname_timeout_ms: u64,
    /// Addresses probed at once; 1 keeps the strictly sequential behaviour
    pub concurrency: usize,
    pub resolve_hostnames: bool,
    pub vendor_db_path: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    /// Profiles defined in the config file
    pub custom_profiles: Vec<PortProfile>,
    pub source: ConfigSource,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            hostname_timeout_ms: DEFAULT_HOSTNAME_TIMEOUT_MS,
            concurrency: 1,
            resolve_hostnames: true,
            vendor_db_path: default_data_path("oui.txt"),
            store_path: crate::store::default_store_path(),
            custom_profiles: Vec::new(),
            source: ConfigSource::Default,
        }
    }
}

impl ScanConfig {
    /// Resolve the active profile against built-in and custom profiles.
    pub fn active_profile(&self) -> Result<PortProfile> {
        ports::find_profile(&self.profile, &self.custom_profiles)
    }

    /// Every profile available to this configuration, custom ones first.
    pub fn available_profiles(&self) -> Vec<PortProfile> {
        let mut all = self.custom_profiles.clone();
        for builtin in PortProfile::builtins() {
            if !all.iter().any(|p| p.name().eq_ignore_ascii_case(builtin.name())) {
                all.push(builtin);
            }
        }
        all
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            ping_timeout: Duration::from_millis(self.ping_timeout_ms.max(1)),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms.max(1)),
            hostname_timeout: Duration::from_millis(self.hostname_timeout_ms.max(1)),
        }
    }
}

fn default_data_path(file: &str) -> Option<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|dir| dir.join("netsweep").join(file))
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("netsweep").join("config.toml"))
}

/// Read the config file text, if there is one
fn read_config_file() -> Option<String> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => {
            tracing::debug!("Loaded config from {:?}", path);
            Some(content)
        }
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load configuration from the process environment and the config file.
pub fn load_config() -> ScanConfig {
    load_config_from(read_config_file().as_deref(), |key| std::env::var(key).ok())
}

/// Build a configuration from optional config file text and an environment lookup.
pub fn load_config_from<F>(file: Option<&str>, env: F) -> ScanConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ScanConfig::default();

    // Priority 2: Config file
    if let Some(content) = file {
        match toml::from_str::<ConfigFile>(content) {
            Ok(parsed) => {
                apply_file(&mut config, parsed);
                config.source = ConfigSource::ConfigFile;
            }
            Err(e) => tracing::warn!("Failed to parse config file: {}", e),
        }
    }

    // Priority 1: Environment variables
    let env_value = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(profile) = env_value(ENV_PROFILE) {
        tracing::info!("Using port profile from environment variable: {}", profile);
        config.profile = profile;
        config.source = ConfigSource::Environment;
    }
    if let Some(path) = env_value(ENV_VENDOR_DB) {
        config.vendor_db_path = Some(PathBuf::from(path));
        config.source = ConfigSource::Environment;
    }
    if let Some(path) = env_value(ENV_STORE) {
        config.store_path = Some(PathBuf::from(path));
        config.source = ConfigSource::Environment;
    }

    config
}

fn apply_file(config: &mut ScanConfig, file: ConfigFile) {
    if let Some(scan) = file.scan {
        if let Some(profile) = scan.profile.filter(|p| !p.trim().is_empty()) {
            config.profile = profile.trim().to_string();
        }
        if let Some(ms) = scan.ping_timeout_ms {
            config.ping_timeout_ms = ms;
        }
        if let Some(ms) = scan.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = scan.hostname_timeout_ms {
            config.hostname_timeout_ms = ms;
        }
        if let Some(n) = scan.concurrency {
            config.concurrency = n.clamp(1, MAX_CONCURRENCY);
        }
        if let Some(resolve) = scan.resolve_hostnames {
            config.resolve_hostnames = resolve;
        }
    }

    if let Some(paths) = file.paths {
        if paths.vendor_db.is_some() {
            config.vendor_db_path = paths.vendor_db;
        }
        if paths.store.is_some() {
            config.store_path = paths.store;
        }
    }

    for (name, section) in file.profiles {
        match PortProfile::new(name.clone(), section.ports) {
            Ok(profile) => config.custom_profiles.push(profile),
            Err(e) => tracing::warn!("Ignoring port profile '{}': {}", name, e),
        }
    }
}

/// Get the path to the config file for documentation purposes
pub fn config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/netsweep/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Netsweep Configuration
# Place this file at: ~/.config/netsweep/config.toml

[scan]
# Port profile: Default, IoT, VoIP, Surveillance, or a custom one below
# profile = "Default"
# ping_timeout_ms = 1000
# connect_timeout_ms = 150
# hostname_timeout_ms = 2000
# Addresses probed at once (1 = one after another)
# concurrency = 1
# resolve_hostnames = true

[paths]
# IEEE OUI registry text (oui.txt)
# vendor_db = "/usr/share/ieee-data/oui.txt"
# Snapshot written after every host
# store = "/var/lib/netsweep/last_scan.json"

# [profiles.Printers]
# ports = [515, 631, 9100]
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = load_config_from(None, no_env);
        assert_eq!(config.source, ConfigSource::Default);
        assert_eq!(config.profile, DEFAULT_PROFILE);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.probe_settings().connect_timeout, Duration::from_millis(150));
    }

    #[test]
    fn file_values_and_custom_profiles() {
        let file = r#"
            [scan]
            profile = "printers"
            connect_timeout_ms = 100
            concurrency = 10000

            [paths]
            vendor_db = "/tmp/oui.txt"

            [profiles.Printers]
            ports = [9100, 631, 515, 631]

            [profiles.Broken]
            ports = [0]
        "#;
        let config = load_config_from(Some(file), no_env);

        assert_eq!(config.source, ConfigSource::ConfigFile);
        assert_eq!(config.connect_timeout_ms, 100);
        assert_eq!(config.concurrency, MAX_CONCURRENCY);
        assert_eq!(config.vendor_db_path, Some(PathBuf::from("/tmp/oui.txt")));
        assert_eq!(config.custom_profiles.len(), 1);

        let active = config.active_profile().unwrap();
        assert_eq!(active.name(), "Printers");
        assert_eq!(active.ports(), &[515, 631, 9100]);
    }

    #[test]
    fn environment_beats_file() {
        let file = "[scan]\nprofile = \"IoT\"\n";
        let config = load_config_from(Some(file), |key| match key {
            ENV_PROFILE => Some("VoIP".to_string()),
            ENV_STORE => Some("/tmp/scan.json".to_string()),
            _ => None,
        });

        assert_eq!(config.source, ConfigSource::Environment);
        assert_eq!(config.profile, "VoIP");
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/scan.json")));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let config = load_config_from(Some("[scan\nprofile ="), no_env);
        assert_eq!(config.source, ConfigSource::Default);
        assert_eq!(config.profile, DEFAULT_PROFILE);
    }

    #[test]
    fn unknown_profile_is_a_config_error() {
        let config = load_config_from(None, |key| {
            (key == ENV_PROFILE).then(|| "Nope".to_string())
        });
        assert!(config.active_profile().is_err());
    }

    #[test]
    fn example_config_parses() {
        let config = load_config_from(Some(&generate_example_config()), no_env);
        assert_eq!(config.source, ConfigSource::ConfigFile);
    }
}
