//! Netsweep Core Library
//!
//! Discovery and device classification for a bounded IPv4 address set:
//! - Address range parsing (CIDR, last-octet range, full range, single address)
//! - Reachability and TCP service probing with a TTL-based OS hint
//! - Neighbor table and OUI vendor correlation
//! - Ordered rule-chain device classification
//! - Incremental, cancellable scans with a durable snapshot store
//!
//! # Example
//!
//! ```no_run
//! use netsweep_core::{config, scanner::ScanOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config();
//!     let orchestrator = ScanOrchestrator::from_config(&config);
//!
//!     let handle = orchestrator.start("192.168.1.0/24", config.active_profile()?)?;
//!     let snapshot = handle.wait().await?;
//!
//!     for record in &snapshot.records {
//!         println!("{} {} {}", record.ip, record.vendor, record.category);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigSource, ScanConfig};
pub use error::{Result, ScanError};
pub use scanner::{
    AddressRange, DeviceCategory, DeviceRecord, JobState, PortProfile, ReachStatus, ScanCapabilities,
    ScanHandle, ScanOrchestrator, ScanSnapshot,
};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
