//! Network discovery engine.
//!
//! One discovery pass walks an [`AddressRange`] and, per address:
//! - looks the address up in the neighbor table captured at scan start
//! - sends an echo request and probes the active port profile
//! - maps the MAC prefix to a vendor
//! - classifies the host through the rule chain
//! - replaces the address's record in the result set and writes the whole
//!   set to the durable store
//!
//! Consumers subscribe to immutable [`ScanSnapshot`]s instead of polling.

pub mod arp;
pub mod classify;
pub mod enrich;
pub mod hostname;
pub mod job;
pub mod oui;
pub mod ping;
pub mod ports;
pub mod privileges;
pub mod range;
pub mod record;

pub use arp::{NeighborSource, NeighborTable, SystemNeighbors};
pub use classify::{Classification, ClassifyInput, DeviceCategory, Rule, RuleSet};
pub use enrich::{Enricher, HardwareReport, NoEnrichment};
pub use job::{JobState, ScanJob, ScanSnapshot};
pub use oui::VendorDatabase;
pub use ping::{HostProber, OsFamily, ProbeResult, ProbeSettings, SystemProber};
pub use ports::PortProfile;
pub use privileges::ScanCapabilities;
pub use range::AddressRange;
pub use record::{DeviceRecord, HardwareInfo, ReachStatus, ResultSink};

use crate::config::{ScanConfig, MAX_CONCURRENCY};
use crate::error::{Result, ScanError};
use crate::store::{JsonFileStore, MemoryStore, SnapshotStore};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a hidden command from within a non-async context.
#[cfg(target_os = "windows")]
pub(crate) fn hidden_command_sync(program: &str) -> Command {
    use std::os::windows::process::CommandExt;
    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn hidden_command_sync(program: &str) -> Command {
    Command::new(program)
}

/// What the probe stage learned about one address.
struct Observation {
    ip: Ipv4Addr,
    mac: String,
    probe: ProbeResult,
    hostname: Option<String>,
    hardware: HardwareInfo,
}

/// Mutable state of the running pass, owned by the worker task.
struct ScanContext {
    job: ScanJob,
    range: AddressRange,
    sink: ResultSink,
    updates: watch::Sender<Arc<ScanSnapshot>>,
    started: Instant,
}

/// Clears the orchestrator's running flag when the worker ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives discovery passes. Cheap to clone; clones share the
/// one-scan-at-a-time guard.
#[derive(Clone)]
pub struct ScanOrchestrator {
    prober: Arc<dyn HostProber>,
    neighbors: Arc<dyn NeighborSource>,
    vendors: Arc<VendorDatabase>,
    enricher: Arc<dyn Enricher>,
    store: Arc<dyn SnapshotStore>,
    rules: Arc<RuleSet>,
    concurrency: usize,
    resolve_hostnames: bool,
    check_capabilities: bool,
    running: Arc<AtomicBool>,
}

impl ScanOrchestrator {
    /// Orchestrator with the system neighbor table, no vendor data, no
    /// enrichment and an in-memory store.
    pub fn new(prober: Arc<dyn HostProber>) -> Self {
        Self {
            prober,
            neighbors: Arc::new(SystemNeighbors),
            vendors: Arc::new(VendorDatabase::empty()),
            enricher: Arc::new(NoEnrichment),
            store: Arc::new(MemoryStore::new()),
            rules: Arc::new(RuleSet::default()),
            concurrency: 1,
            resolve_hostnames: true,
            check_capabilities: false,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Orchestrator wired to the system prober, the configured vendor
    /// registry and the configured store file.
    pub fn from_config(config: &ScanConfig) -> Self {
        let vendors = match &config.vendor_db_path {
            Some(path) => VendorDatabase::load(path),
            None => {
                tracing::warn!("No vendor registry path available, vendors will be unknown");
                VendorDatabase::empty()
            }
        };

        let store: Arc<dyn SnapshotStore> = match &config.store_path {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => {
                tracing::warn!("No store path available, results will not be persisted");
                Arc::new(MemoryStore::new())
            }
        };

        Self::new(Arc::new(SystemProber::new(config.probe_settings())))
            .with_vendors(vendors)
            .with_store(store)
            .with_concurrency(config.concurrency)
            .with_hostnames(config.resolve_hostnames)
            .with_capability_check(true)
    }

    pub fn with_neighbors(mut self, neighbors: Arc<dyn NeighborSource>) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_vendors(mut self, vendors: VendorDatabase) -> Self {
        self.vendors = Arc::new(vendors);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// Addresses probed at once, clamped to `1..=MAX_CONCURRENCY`. Records
    /// are still applied in address order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_hostnames(mut self, resolve: bool) -> Self {
        self.resolve_hostnames = resolve;
        self
    }

    /// Probe the system ping before scanning and warn when it is unusable.
    pub fn with_capability_check(mut self, check: bool) -> Self {
        self.check_capabilities = check;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The durable store snapshots are written to.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Whatever the store currently holds, typically the previous process's last scan.
    pub fn stored_snapshot(&self) -> Result<Option<ScanSnapshot>> {
        self.store.load().map_err(ScanError::Store)
    }

    /// Validate `input` and start a pass in a background task.
    ///
    /// Fails with [`ScanError::InvalidRangeFormat`] before anything runs, or
    /// [`ScanError::AlreadyRunning`] while another pass is in progress.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, input: &str, profile: PortProfile) -> Result<ScanHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }
        let guard = RunningGuard(self.running.clone());

        let mut job = ScanJob::new(input.trim(), profile);
        let range = match job.start() {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!("Scan {} not started: {}", job.id(), e);
                return Err(e);
            }
        };

        tracing::info!(
            "Starting scan {} of {} ({} addresses, profile {})",
            job.id(),
            range,
            range.len(),
            job.profile()
        );

        // A new pass starts from an empty result set.
        let sink = ResultSink::new();
        let initial = Arc::new(ScanSnapshot::capture(&job, &sink));
        let (updates, rx) = watch::channel(initial);

        let job_id = job.id();
        let ctx = ScanContext {
            job,
            range,
            sink,
            updates,
            started: Instant::now(),
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = self.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            worker.run(ctx, token).await
        });

        Ok(ScanHandle {
            job_id,
            cancel,
            updates: rx,
            task,
        })
    }

    async fn run(&self, mut ctx: ScanContext, cancel: CancellationToken) -> ScanSnapshot {
        let initial = ctx.updates.borrow().clone();
        self.persist(initial).await;

        if self.check_capabilities {
            let caps = privileges::detect_capabilities().await;
            if let Some(warning) = caps.warning() {
                tracing::warn!("Limited probe capabilities: {}", warning);
            } else {
                tracing::info!("Probing with full capabilities");
            }
        }

        let neighbors = self.neighbors.snapshot().await;
        tracing::info!("Neighbor table: {} entries", neighbors.len());

        let profile = ctx.job.profile().clone();
        let neighbors = &neighbors;
        let profile = &profile;
        let observations = futures::stream::iter(ctx.range.iter())
            .map(move |ip| self.observe(ip, neighbors, profile))
            .buffered(self.concurrency);
        let mut observations = std::pin::pin!(observations);

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Scan {} cancelled at {}/{}", ctx.job.id(), ctx.job.progress(), ctx.job.total());
                break;
            }
            let Some(observation) = observations.next().await else {
                break;
            };

            let record = self.build_record(observation);
            ctx.sink.upsert(record);
            ctx.job.advance();
            self.publish(&ctx).await;
        }

        let finished = if ctx.job.progress() >= ctx.job.total() {
            ctx.job.complete()
        } else {
            ctx.job.cancel()
        };
        if let Err(e) = finished {
            tracing::error!("Scan {} could not be finalised: {}", ctx.job.id(), e);
        }

        let snapshot = self.publish(&ctx).await;
        tracing::info!(
            "Scan {} {}: {}/{} addresses, {} reachable in {:.1}s",
            snapshot.job_id,
            snapshot.state,
            snapshot.progress,
            snapshot.total,
            snapshot.reachable_count(),
            ctx.started.elapsed().as_secs_f64()
        );
        (*snapshot).clone()
    }

    /// Network-facing work for one address. Holds no shared mutable state.
    async fn observe(
        &self,
        ip: Ipv4Addr,
        neighbors: &NeighborTable,
        profile: &PortProfile,
    ) -> Observation {
        let mac = neighbors.lookup(ip);
        let probe = self.prober.probe(ip, profile).await;

        let (hostname, hardware) = if probe.reachable {
            let hostname = if self.resolve_hostnames {
                self.prober.resolve_hostname(ip).await
            } else {
                None
            };
            let hardware = enrich::collect_hardware(self.enricher.as_ref(), ip).await;
            (hostname, hardware)
        } else {
            (None, HardwareInfo::default())
        };

        Observation {
            ip,
            mac,
            probe,
            hostname,
            hardware,
        }
    }

    fn build_record(&self, observation: Observation) -> DeviceRecord {
        let Observation {
            ip,
            mac,
            probe,
            hostname,
            hardware,
        } = observation;

        let vendor = if mac == arp::NO_MAC {
            oui::UNKNOWN_VENDOR.to_string()
        } else {
            self.vendors.lookup(&mac)
        };

        let open_ports = if probe.reachable {
            probe.open_ports
        } else {
            BTreeSet::new()
        };
        let printer_hint = classify::printer_hint(&vendor, &open_ports);
        let verdict = self.rules.classify(&ClassifyInput {
            vendor: &vendor,
            open_ports: &open_ports,
            printer_hint,
            os_hint: probe.os_hint,
        });

        tracing::debug!(
            "{} ({}, {}) -> {} via rule '{}', ports {:?}",
            ip,
            mac,
            vendor,
            verdict.category,
            verdict.rule,
            open_ports
        );

        DeviceRecord {
            status: if probe.reachable {
                ReachStatus::Ok
            } else {
                ReachStatus::Unreachable
            },
            hostname: hostname
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| record::UNAVAILABLE.to_string()),
            ip,
            mac,
            vendor,
            category: verdict.category,
            open_ports: open_ports.into_iter().collect(),
            os_hint: probe.os_hint,
            response_time_ms: probe.response_time_ms,
            hardware,
        }
    }

    /// Write the whole result set, then hand the same snapshot to subscribers.
    async fn publish(&self, ctx: &ScanContext) -> Arc<ScanSnapshot> {
        let snapshot = Arc::new(ScanSnapshot::capture(&ctx.job, &ctx.sink));
        self.persist(snapshot.clone()).await;
        ctx.updates.send_replace(snapshot.clone());
        snapshot
    }

    /// Write a snapshot off the async threads. Failures are logged, not fatal.
    async fn persist(&self, snapshot: Arc<ScanSnapshot>) {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to persist scan snapshot: {:#}", e),
            Err(e) => tracing::warn!("Snapshot write task failed: {}", e),
        }
    }
}

/// Handle to a running pass.
#[derive(Debug)]
pub struct ScanHandle {
    job_id: Uuid,
    cancel: CancellationToken,
    updates: watch::Receiver<Arc<ScanSnapshot>>,
    task: JoinHandle<ScanSnapshot>,
}

impl ScanHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Stop at the next address boundary. The host being probed finishes first.
    pub fn cancel(&self) {
        tracing::info!("Scan cancellation requested");
        self.cancel.cancel();
    }

    /// Token that cancels this pass, for callers that give the handle away.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ScanSnapshot>> {
        self.updates.clone()
    }

    pub fn latest(&self) -> Arc<ScanSnapshot> {
        self.updates.borrow().clone()
    }

    /// Wait for the pass to finish and return its final snapshot.
    pub async fn wait(self) -> Result<ScanSnapshot> {
        self.task
            .await
            .map_err(|e| ScanError::Worker(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::enrich::HardwareReport;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct FakeProber {
        hosts: HashMap<Ipv4Addr, ProbeResult>,
        names: HashMap<Ipv4Addr, String>,
        gate: Option<Arc<Semaphore>>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl FakeProber {
        fn up(mut self, ip: Ipv4Addr, ports: &[u16]) -> Self {
            self.hosts.insert(
                ip,
                ProbeResult {
                    reachable: true,
                    open_ports: ports.iter().copied().collect(),
                    os_hint: OsFamily::UnixLike,
                    response_time_ms: Some(1.5),
                },
            );
            self
        }

        fn named(mut self, ip: Ipv4Addr, name: &str) -> Self {
            self.names.insert(ip, name.to_string());
            self
        }
    }

    #[async_trait]
    impl HostProber for FakeProber {
        async fn probe(&self, ip: Ipv4Addr, _profile: &PortProfile) -> ProbeResult {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.hosts.get(&ip).cloned().unwrap_or_default()
        }

        async fn resolve_hostname(&self, ip: Ipv4Addr) -> Option<String> {
            self.names.get(&ip).cloned()
        }
    }

    #[derive(Default)]
    struct CountingEnricher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Enricher for CountingEnricher {
        async fn enrich(&self, _ip: Ipv4Addr) -> anyhow::Result<HardwareReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HardwareReport {
                os_name: Some("Linux".to_string()),
                ..Default::default()
            })
        }
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn orchestrator(prober: FakeProber) -> (ScanOrchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let orch = ScanOrchestrator::new(Arc::new(prober))
            .with_neighbors(Arc::new(NeighborTable::default()))
            .with_store(store.clone());
        (orch, store)
    }

    #[tokio::test]
    async fn unreachable_hosts_get_placeholder_records() {
        let enricher = Arc::new(CountingEnricher::default());
        let (orch, store) = orchestrator(FakeProber::default());
        let orch = orch.with_enricher(enricher.clone());

        let handle = orch.start("10.0.0.1-3", PortProfile::default()).unwrap();
        let snapshot = handle.wait().await.unwrap();

        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.progress, 3);
        assert_eq!(snapshot.records.len(), 3);
        for record in &snapshot.records {
            assert_eq!(record.status, ReachStatus::Unreachable);
            assert_eq!(record.hostname, "-");
            assert_eq!(record.mac, "-");
            assert_eq!(record.vendor, "Unknown");
            assert!(record.open_ports.is_empty());
            assert!(record.hardware.is_unavailable());
            assert_eq!(record.category, DeviceCategory::OfflineDevice);
        }
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
        // initial + one per host + final
        assert_eq!(store.write_count(), 5);
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn initial_write_happens_on_the_worker() {
        let (orch, store) = orchestrator(FakeProber::default());

        let handle = orch.start("10.0.0.1", PortProfile::default()).unwrap();
        // Single-threaded test runtime: the worker has not been polled yet.
        assert_eq!(store.write_count(), 0);

        handle.wait().await.unwrap();
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn fanvil_on_sip_is_a_voip_phone() {
        let prober = FakeProber::default()
            .up(ip(5), &[80, 5060])
            .named(ip(5), "desk-phone.lan");
        let (orch, _store) = orchestrator(prober);
        let enricher = Arc::new(CountingEnricher::default());
        let orch = orch
            .with_neighbors(Arc::new(NeighborTable::from_entries([(ip(5), "0c:38:3e:11:22:33")])))
            .with_vendors(VendorDatabase::parse(
                "0C-38-3E   (hex)\t\tFanvil Technology Co., Ltd\n0C383E     (base 16)\t\tFanvil Technology Co., Ltd\n",
            ))
            .with_enricher(enricher.clone());

        let snapshot = orch
            .start("10.0.0.5", PortProfile::voip())
            .unwrap()
            .wait()
            .await
            .unwrap();

        let record = &snapshot.records[0];
        assert_eq!(record.status, ReachStatus::Ok);
        assert_eq!(record.mac, "0C:38:3E:11:22:33");
        assert_eq!(record.vendor, "Fanvil Technology Co., Ltd");
        assert_eq!(record.category, DeviceCategory::VoIPPhone);
        assert_eq!(record.hostname, "desk-phone.lan");
        assert_eq!(record.open_ports, vec![80, 5060]);
        assert_eq!(record.hardware.os_name, "Linux");
        assert_eq!(record.hardware.model, "-");
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hostnames_can_be_skipped() {
        let prober = FakeProber::default().up(ip(1), &[22]).named(ip(1), "box");
        let (orch, _store) = orchestrator(prober);
        let snapshot = orch
            .with_hostnames(false)
            .start("10.0.0.1", PortProfile::default())
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(snapshot.records[0].hostname, "-");
        assert_eq!(snapshot.records[0].category, DeviceCategory::LinuxDevice);
    }

    #[tokio::test]
    async fn invalid_range_is_rejected_before_running() {
        let (orch, store) = orchestrator(FakeProber::default());

        let err = orch.start("10.0.0.5-10.0.0.1", PortProfile::default()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRangeFormat(_)));
        assert!(!orch.is_running());
        assert_eq!(store.write_count(), 0);

        assert!(orch.start("10.0.0.1", PortProfile::default()).is_ok());
    }

    #[tokio::test]
    async fn one_scan_at_a_time() {
        let gate = Arc::new(Semaphore::new(0));
        let prober = FakeProber {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let (orch, _store) = orchestrator(prober);

        let handle = orch.start("10.0.0.0/30", PortProfile::default()).unwrap();
        assert!(orch.is_running());
        assert!(matches!(
            orch.start("10.0.0.1", PortProfile::default()),
            Err(ScanError::AlreadyRunning)
        ));

        handle.cancel();
        gate.add_permits(16);
        let snapshot = handle.wait().await.unwrap();
        assert!(snapshot.state.is_terminal());
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn cancel_leaves_last_completed_host_in_store() {
        let gate = Arc::new(Semaphore::new(2));
        let prober = FakeProber {
            gate: Some(gate.clone()),
            ..Default::default()
        }
        .up(ip(1), &[22])
        .up(ip(2), &[445]);
        let (orch, store) = orchestrator(prober);

        let handle = orch.start("10.0.0.1-10", PortProfile::default()).unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.progress >= 2).await.unwrap();

        handle.cancel();
        gate.add_permits(16);
        let snapshot = handle.wait().await.unwrap();

        assert_eq!(snapshot.state, JobState::Cancelled);
        assert!(snapshot.progress < snapshot.total);
        assert_eq!(snapshot.records.len() as u64, snapshot.progress);
        assert_eq!(snapshot.records[0].category, DeviceCategory::LinuxDevice);
        assert_eq!(snapshot.records[1].category, DeviceCategory::WindowsPC);

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored, snapshot);
    }

    #[tokio::test]
    async fn stored_snapshot_survives_a_new_orchestrator() {
        let prober = FakeProber::default().up(ip(1), &[80]);
        let (orch, store) = orchestrator(prober);
        orch.start("10.0.0.1-2", PortProfile::default()).unwrap().wait().await.unwrap();

        let fresh = ScanOrchestrator::new(Arc::new(FakeProber::default())).with_store(store);
        let stored = fresh.stored_snapshot().unwrap().unwrap();
        assert_eq!(stored.state, JobState::Completed);
        assert_eq!(stored.records.len(), 2);
        assert_eq!(stored.records[0].category, DeviceCategory::OtherDevice);
    }

    #[tokio::test]
    async fn rerun_replaces_records_by_address() {
        let prober = FakeProber::default().up(ip(2), &[9100]);
        let (orch, store) = orchestrator(prober);

        let first = orch.start("10.0.0.0/30", PortProfile::default()).unwrap().wait().await.unwrap();
        let second = orch.start("10.0.0.0/30", PortProfile::default()).unwrap().wait().await.unwrap();

        assert_ne!(first.job_id, second.job_id);
        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.job_id, second.job_id);
        assert_eq!(stored.records.len(), 4);
        assert_eq!(
            stored.records.iter().filter(|r| r.category == DeviceCategory::Printer).count(),
            1
        );
    }

    #[tokio::test]
    async fn parallel_probing_keeps_address_order() {
        let prober = FakeProber::default().up(ip(3), &[554]).up(ip(9), &[]);
        let (orch, _store) = orchestrator(prober);

        let snapshot = orch
            .with_concurrency(4)
            .start("10.0.0.0/28", PortProfile::surveillance())
            .unwrap()
            .wait()
            .await
            .unwrap();

        let ips: Vec<Ipv4Addr> = snapshot.records.iter().map(|r| r.ip).collect();
        let expected: Vec<Ipv4Addr> = (0..16).map(ip).collect();
        assert_eq!(ips, expected);
        assert_eq!(snapshot.records[3].category, DeviceCategory::RTSPCamera);
        assert_eq!(snapshot.records[9].category, DeviceCategory::OfflineDevice);
        assert_eq!(snapshot.reachable_count(), 2);
    }

    #[tokio::test]
    async fn probes_in_flight_never_exceed_the_cap() {
        let prober = FakeProber::default();
        let peak = prober.peak.clone();
        let (orch, _store) = orchestrator(prober);

        let snapshot = orch
            .with_concurrency(1_000_000)
            .with_hostnames(false)
            .start("10.0.0.0/23", PortProfile::default())
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(snapshot.progress, 512);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= MAX_CONCURRENCY, "peak {}", peak);
        assert!(peak > 1, "probes ran one at a time");
    }

    #[tokio::test]
    async fn custom_rules_take_precedence() {
        let prober = FakeProber::default().up(ip(7), &[22]);
        let (orch, _store) = orchestrator(prober);
        let mut rules = RuleSet::default();
        rules.insert_before(
            "ssh",
            Rule::new("unix-ttl", DeviceCategory::OtherDevice, |i| {
                i.os_hint == OsFamily::UnixLike && i.has_port(22)
            }),
        );

        let snapshot = orch
            .with_rules(rules)
            .start("10.0.0.7", PortProfile::default())
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(snapshot.records[0].category, DeviceCategory::OtherDevice);
    }
}
