//! Optional hardware/OS enrichment.
//!
//! An [`Enricher`] queries a host for management data (model, OS, uptime...).
//! Every failure is absorbed: a whole-query error blanks every field, and a
//! field the collaborator could not read stays at the `"-"` placeholder.

use super::record::HardwareInfo;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Partial answer from an enrichment source. `None` means "not available".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareReport {
    pub model: Option<String>,
    pub processor: Option<String>,
    pub memory: Option<String>,
    pub storage: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub os_architecture: Option<String>,
    pub install_date: Option<String>,
    pub uptime: Option<String>,
    pub logged_in_user: Option<String>,
}

impl From<HardwareReport> for HardwareInfo {
    fn from(report: HardwareReport) -> Self {
        let defaults = HardwareInfo::default();
        let pick = |value: Option<String>, fallback: String| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };

        HardwareInfo {
            model: pick(report.model, defaults.model),
            processor: pick(report.processor, defaults.processor),
            memory: pick(report.memory, defaults.memory),
            storage: pick(report.storage, defaults.storage),
            os_name: pick(report.os_name, defaults.os_name),
            os_version: pick(report.os_version, defaults.os_version),
            os_architecture: pick(report.os_architecture, defaults.os_architecture),
            install_date: pick(report.install_date, defaults.install_date),
            uptime: pick(report.uptime, defaults.uptime),
            logged_in_user: pick(report.logged_in_user, defaults.logged_in_user),
        }
    }
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, ip: Ipv4Addr) -> anyhow::Result<HardwareReport>;
}

/// Enricher that never has anything to add.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait]
impl Enricher for NoEnrichment {
    async fn enrich(&self, _ip: Ipv4Addr) -> anyhow::Result<HardwareReport> {
        Ok(HardwareReport::default())
    }
}

/// Query `enricher`, folding any failure into placeholder fields.
pub async fn collect_hardware(enricher: &dyn Enricher, ip: Ipv4Addr) -> HardwareInfo {
    match enricher.enrich(ip).await {
        Ok(report) => report.into(),
        Err(e) => {
            tracing::debug!("Enrichment for {} unavailable: {:#}", ip, e);
            HardwareInfo::default()
        }
    }
}
