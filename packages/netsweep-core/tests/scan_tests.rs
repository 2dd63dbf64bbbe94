use async_trait::async_trait;
use netsweep_core::scanner::{
    Enricher, HardwareReport, HostProber, NeighborTable, OsFamily, ProbeResult, VendorDatabase,
};
use netsweep_core::{
    DeviceCategory, JobState, JsonFileStore, PortProfile, ReachStatus, ScanOrchestrator,
    ScanSnapshot, SnapshotStore,
};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

const OUI_REGISTRY: &str = "\
OUI/MA-L                                                    Organization
company_id                                                  Organization
                                                            Address

00-1B-A9   (hex)\t\tBrother industries, LTD.
001BA9     (base 16)\t\tBrother industries, LTD.
\t\t\t\tNagoya  Aichi  467-8561
\t\t\t\tJP

0C-38-3E   (hex)\t\tFanvil Technology Co., Ltd
0C383E     (base 16)\t\tFanvil Technology Co., Ltd
\t\t\t\tShenzhen  Guangdong  518055
\t\t\t\tCN
";

/// Answers from a fixed table of live hosts.
struct LabNetwork {
    hosts: HashMap<Ipv4Addr, (Vec<u16>, u8)>,
}

#[async_trait]
impl HostProber for LabNetwork {
    async fn probe(&self, ip: Ipv4Addr, profile: &PortProfile) -> ProbeResult {
        match self.hosts.get(&ip) {
            Some((ports, ttl)) => ProbeResult {
                reachable: true,
                open_ports: ports.iter().copied().filter(|p| profile.contains(*p)).collect(),
                os_hint: OsFamily::from_ttl(*ttl),
                response_time_ms: Some(0.4),
            },
            None => ProbeResult::unreachable(),
        }
    }

    async fn resolve_hostname(&self, ip: Ipv4Addr) -> Option<String> {
        self.hosts.contains_key(&ip).then(|| format!("host-{}.lab", ip.octets()[3]))
    }
}

/// Management queries only succeed against Windows hosts.
struct WindowsOnly;

#[async_trait]
impl Enricher for WindowsOnly {
    async fn enrich(&self, ip: Ipv4Addr) -> anyhow::Result<HardwareReport> {
        if ip.octets()[3] != 30 {
            anyhow::bail!("RPC server unavailable");
        }
        Ok(HardwareReport {
            model: Some("OptiPlex 7090".to_string()),
            os_name: Some("Microsoft Windows 11 Pro".to_string()),
            logged_in_user: Some("LAB\\operator".to_string()),
            ..Default::default()
        })
    }
}

fn lab_ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 7, last)
}

fn lab_orchestrator(store: Arc<JsonFileStore>) -> ScanOrchestrator {
    let hosts = HashMap::from([
        (lab_ip(10), (vec![80, 443, 631, 9100], 64)),
        (lab_ip(20), (vec![80, 5060], 64)),
        (lab_ip(30), (vec![135, 139, 445, 3389], 128)),
        (lab_ip(40), (vec![22], 64)),
        (lab_ip(50), (vec![554], 64)),
    ]);
    let neighbors = NeighborTable::from_entries([
        (lab_ip(10), "00:1b:a9:01:02:03"),
        (lab_ip(20), "0c-38-3e-aa-bb-cc"),
        (lab_ip(99), "de:ad:be:ef:00:01"),
    ]);

    ScanOrchestrator::new(Arc::new(LabNetwork { hosts }))
        .with_neighbors(Arc::new(neighbors))
        .with_vendors(VendorDatabase::parse(OUI_REGISTRY))
        .with_enricher(Arc::new(WindowsOnly))
        .with_store(store)
}

#[tokio::test]
async fn full_pass_classifies_and_persists_every_address() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("scans").join("last_scan.json")));
    let orchestrator = lab_orchestrator(store.clone());

    let snapshot = orchestrator
        .start("192.168.7.0/25", PortProfile::default())
        .expect("scan starts")
        .wait()
        .await
        .expect("scan finishes");

    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.total, 128);
    assert_eq!(snapshot.records.len(), 128);
    assert_eq!(snapshot.reachable_count(), 5);

    let by_ip: HashMap<Ipv4Addr, _> = snapshot.records.iter().map(|r| (r.ip, r)).collect();

    let printer = by_ip[&lab_ip(10)];
    assert_eq!(printer.vendor, "Brother industries, LTD.");
    assert_eq!(printer.category, DeviceCategory::Printer);
    assert_eq!(printer.hostname, "host-10.lab");

    let phone = by_ip[&lab_ip(20)];
    assert_eq!(phone.mac, "0C:38:3E:AA:BB:CC");
    assert_eq!(phone.category, DeviceCategory::VoIPPhone);

    let pc = by_ip[&lab_ip(30)];
    assert_eq!(pc.category, DeviceCategory::WindowsPC);
    assert_eq!(pc.os_hint, OsFamily::Windows);
    assert_eq!(pc.vendor, "Unknown");
    assert_eq!(pc.hardware.model, "OptiPlex 7090");
    assert_eq!(pc.hardware.uptime, "-");

    let server = by_ip[&lab_ip(40)];
    assert_eq!(server.category, DeviceCategory::LinuxDevice);
    assert!(server.hardware.is_unavailable());

    assert_eq!(by_ip[&lab_ip(50)].category, DeviceCategory::RTSPCamera);

    // In the neighbor table but silent.
    let silent = by_ip[&lab_ip(99)];
    assert_eq!(silent.status, ReachStatus::Unreachable);
    assert_eq!(silent.mac, "DE:AD:BE:EF:00:01");
    assert_eq!(silent.hostname, "-");
    assert!(silent.open_ports.is_empty());

    let stored = store.load().unwrap().expect("snapshot on disk");
    assert_eq!(stored, snapshot);
}

#[tokio::test]
async fn stored_file_is_a_complete_snapshot_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_scan.json");
    let store = Arc::new(JsonFileStore::new(&path));
    let orchestrator = lab_orchestrator(store.clone());

    let handle = orchestrator
        .start("192.168.7.1-60", PortProfile::default())
        .expect("scan starts");
    let mut updates = handle.subscribe();

    let mut seen = 0;
    while updates.changed().await.is_ok() {
        let published = updates.borrow_and_update().clone();
        assert_eq!(published.records.len() as u64, published.progress);
        let raw = std::fs::read_to_string(&path).unwrap();
        let on_disk: ScanSnapshot = serde_json::from_str(&raw).expect("always valid JSON");
        assert_eq!(on_disk.records.len() as u64, on_disk.progress);
        assert_eq!(on_disk.job_id, published.job_id);
        seen += 1;
    }

    let snapshot = handle.wait().await.unwrap();
    assert!(seen > 0);
    assert_eq!(snapshot.progress, 60);
}

#[tokio::test]
async fn rerun_over_same_range_replaces_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("last_scan.json")));
    let orchestrator = lab_orchestrator(store.clone());

    for _ in 0..2 {
        orchestrator
            .start("192.168.7.1-50", PortProfile::default())
            .expect("scan starts")
            .wait()
            .await
            .expect("scan finishes");
    }

    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.records.len(), 50);
    assert_eq!(stored.reachable_count(), 5);
}

#[tokio::test]
async fn profile_limits_probed_ports() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("last_scan.json")));
    let orchestrator = lab_orchestrator(store);

    let voip = PortProfile::voip();
    let snapshot = orchestrator
        .start("192.168.7.10", voip.clone())
        .unwrap()
        .wait()
        .await
        .unwrap();

    let record = &snapshot.records[0];
    assert!(record.open_ports.iter().all(|p| voip.contains(*p)));
    assert_eq!(snapshot.profile, voip.name());
}
