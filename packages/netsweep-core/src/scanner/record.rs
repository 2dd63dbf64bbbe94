//! Scan output records and the keyed result collection.

use super::classify::DeviceCategory;
use super::ping::OsFamily;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Value used for any field that could not be determined.
pub const UNAVAILABLE: &str = "-";

fn unavailable() -> String {
    UNAVAILABLE.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReachStatus {
    Unreachable,
    #[serde(rename = "OK")]
    Ok,
}

impl std::fmt::Display for ReachStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReachStatus::Unreachable => write!(f, "Unreachable"),
            ReachStatus::Ok => write!(f, "OK"),
        }
    }
}

/// Hardware and OS details from the enrichment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareInfo {
    #[serde(default = "unavailable")]
    pub model: String,
    #[serde(default = "unavailable")]
    pub processor: String,
    #[serde(default = "unavailable")]
    pub memory: String,
    #[serde(default = "unavailable")]
    pub storage: String,
    #[serde(default = "unavailable")]
    pub os_name: String,
    #[serde(default = "unavailable")]
    pub os_version: String,
    #[serde(default = "unavailable")]
    pub os_architecture: String,
    #[serde(default = "unavailable")]
    pub install_date: String,
    #[serde(default = "unavailable")]
    pub uptime: String,
    #[serde(default = "unavailable")]
    pub logged_in_user: String,
}

impl Default for HardwareInfo {
    fn default() -> Self {
        Self {
            model: unavailable(),
            processor: unavailable(),
            memory: unavailable(),
            storage: unavailable(),
            os_name: unavailable(),
            os_version: unavailable(),
            os_architecture: unavailable(),
            install_date: unavailable(),
            uptime: unavailable(),
            logged_in_user: unavailable(),
        }
    }
}

impl HardwareInfo {
    /// True when every field holds the default placeholder.
    pub fn is_unavailable(&self) -> bool {
        *self == Self::default()
    }

    /// Field names and values, in export column order.
    pub fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("model", &self.model),
            ("processor", &self.processor),
            ("memory", &self.memory),
            ("storage", &self.storage),
            ("osName", &self.os_name),
            ("osVersion", &self.os_version),
            ("osArchitecture", &self.os_architecture),
            ("installDate", &self.install_date),
            ("uptime", &self.uptime),
            ("loggedInUser", &self.logged_in_user),
        ]
    }
}

/// One probed address. Built once, never mutated; a re-scan replaces it by IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub status: ReachStatus,
    pub hostname: String,
    pub ip: Ipv4Addr,
    pub mac: String,
    pub vendor: String,
    pub category: DeviceCategory,
    pub open_ports: Vec<u16>,
    pub os_hint: OsFamily,
    pub response_time_ms: Option<f64>,
    #[serde(flatten)]
    pub hardware: HardwareInfo,
}

impl DeviceRecord {
    pub fn is_reachable(&self) -> bool {
        self.status == ReachStatus::Ok
    }
}

/// Ordered collection of records keyed by IP. Inserting an existing IP
/// replaces the record in place; nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct ResultSink {
    records: Vec<DeviceRecord>,
    index: HashMap<Ipv4Addr, usize>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, or replace the record with the same IP. Returns the replaced record.
    pub fn upsert(&mut self, record: DeviceRecord) -> Option<DeviceRecord> {
        match self.index.get(&record.ip) {
            Some(&idx) => Some(std::mem::replace(&mut self.records[idx], record)),
            None => {
                self.index.insert(record.ip, self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&DeviceRecord> {
        self.index.get(&ip).map(|&idx| &self.records[idx])
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_record(ip: Ipv4Addr, status: ReachStatus) -> DeviceRecord {
    DeviceRecord {
        status,
        hostname: unavailable(),
        ip,
        mac: unavailable(),
        vendor: "Unknown".to_string(),
        category: DeviceCategory::OfflineDevice,
        open_ports: Vec::new(),
        os_hint: OsFamily::Unknown,
        response_time_ms: None,
        hardware: HardwareInfo::default(),
    }
}
