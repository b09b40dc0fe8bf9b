mod common;

use common::{ctx, harness, harness_with, ip, overlapping, sweep};
use slam_core::{DeviceStatus, DeviceUpdate, PortSet, ServiceTag, UNKNOWN};
use slam_discover::adapters::PortState;
use slam_discover::config::NotificationToggles;
use slam_discover::reconcile::{EngineSettings, LIVENESS_PROVENANCE, PORT_PROVENANCE};
use slam_inventory::InventoryStore;

#[tokio::test]
async fn test_repeated_liveness_pass_is_idempotent() {
    let h = harness();
    let home = ctx("Home");
    let seen = sweep(&[("192.168.1.10", "nas.lan")]);

    let first = h.engine.reconcile_liveness(&home, &seen, None).await.unwrap();
    assert_eq!(first.discovered, 1);
    assert_eq!(h.sink.messages(), vec!["New host discovered: nas.lan (192.168.1.10)"]);

    let second = h.engine.reconcile_liveness(&home, &seen, None).await.unwrap();
    assert_eq!(second.discovered, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(h.sink.count(), 1);

    let records = h.store.list_records(&home.identity).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeviceStatus::Online);
    assert!(records[0].ports.is_empty());
}

#[tokio::test]
async fn test_networks_are_isolated() {
    let h = harness();
    let home = ctx("Home");
    let office = ctx("Office");

    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "nas.lan")]), None)
        .await
        .unwrap();
    h.engine
        .reconcile_liveness(&office, &sweep(&[]), None)
        .await
        .unwrap();

    assert!(h.store.list_records(&office.identity).await.unwrap().is_empty());
    assert!(h
        .store
        .get_record(&office.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(h.store.list_networks().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_offline_transition_fires_once() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "nas.lan")]), None)
        .await
        .unwrap();

    let summary = h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();
    assert_eq!(summary.went_offline, 1);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Offline);
    assert_eq!(h.sink.from_service(ServiceTag::HostUpdater), 1);
    assert!(h
        .sink
        .messages()
        .contains(&"Host nas.lan (192.168.1.10) is offline.".to_string()));

    let again = h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();
    assert_eq!(again.went_offline, 0);
    assert_eq!(h.sink.from_service(ServiceTag::HostUpdater), 1);
}

#[tokio::test]
async fn test_silent_device_without_hostname_is_left_alone() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[]), None)
        .await
        .unwrap();
    h.store
        .upsert_record(&home.identity, ip("192.168.1.50"), &DeviceUpdate::new())
        .await
        .unwrap();

    let summary = h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.went_offline, 0);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.50"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Online);
    assert_eq!(h.sink.count(), 0);
}

#[tokio::test]
async fn test_recovery_emits_back_online_once() {
    let h = harness();
    let home = ctx("Home");
    let seen = sweep(&[("192.168.1.10", "nas.lan")]);
    h.engine.reconcile_liveness(&home, &seen, None).await.unwrap();
    h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();

    let summary = h.engine.reconcile_liveness(&home, &seen, None).await.unwrap();
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.discovered, 0);

    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Online);

    let back: Vec<String> = h
        .sink
        .messages()
        .into_iter()
        .filter(|m| m.contains("back online"))
        .collect();
    assert_eq!(back, vec!["Host nas.lan (192.168.1.10) is back online."]);

    h.engine.reconcile_liveness(&home, &seen, None).await.unwrap();
    assert_eq!(h.sink.count(), 3);
}

#[tokio::test]
async fn test_update_keeps_first_seen() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "old.lan")]), None)
        .await
        .unwrap();
    let before = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();

    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "new.lan")]), None)
        .await
        .unwrap();
    let after = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after.hostname, "new.lan");
    assert_eq!(after.first_seen, before.first_seen);
    assert!(after.last_seen >= before.last_seen);
}

#[tokio::test]
async fn test_new_ports_notify_only_the_difference() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.20", "web.lan")]), None)
        .await
        .unwrap();
    h.store
        .upsert_record(
            &home.identity,
            ip("192.168.1.20"),
            &DeviceUpdate::new().ports(PortSet::from([80])),
        )
        .await
        .unwrap();

    h.scanner.set_ports(
        "192.168.1.20",
        &[
            (22, PortState::Closed),
            (80, PortState::Open),
            (443, PortState::Open),
            (8080, PortState::Filtered),
        ],
    );
    let summary = h.engine.port_pass(&home, None).await.unwrap();
    assert_eq!(summary.new_ports, 1);

    let port_notes: Vec<_> = h
        .sink
        .all()
        .into_iter()
        .filter(|n| n.service == ServiceTag::PortDiscovery)
        .collect();
    assert_eq!(port_notes.len(), 1);
    assert_eq!(
        port_notes[0].message,
        "New open ports discovered: web.lan (192.168.1.20) [443]"
    );
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.20"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.ports, PortSet::from([80, 443]));
}

#[tokio::test]
async fn test_closed_ports_are_dropped_silently() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.20", "web.lan")]), None)
        .await
        .unwrap();
    h.store
        .upsert_record(
            &home.identity,
            ip("192.168.1.20"),
            &DeviceUpdate::new().ports(PortSet::from([80, 443])),
        )
        .await
        .unwrap();
    let before = h.sink.count();

    h.scanner.open_ports("192.168.1.20", &[80]);
    let summary = h.engine.port_pass(&home, None).await.unwrap();
    assert_eq!(summary.new_ports, 0);
    assert_eq!(h.sink.count(), before);

    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.20"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.ports, PortSet::from([80]));
}

#[tokio::test]
async fn test_port_pass_revives_offline_device_before_port_notice() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.20", "web.lan")]), None)
        .await
        .unwrap();
    h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();
    let before = h.sink.count();

    h.scanner.open_ports("192.168.1.20", &[22]);
    let summary = h.engine.port_pass(&home, None).await.unwrap();
    assert_eq!(summary.recovered, 1);

    let new_notes: Vec<String> = h.sink.messages().into_iter().skip(before).collect();
    assert_eq!(
        new_notes,
        vec![
            "Host web.lan (192.168.1.20) is back online.".to_string(),
            "New open ports discovered: web.lan (192.168.1.20) [22]".to_string(),
        ]
    );
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.20"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Online);
    assert_eq!(record.ports, PortSet::from([22]));
}

#[tokio::test]
async fn test_port_pass_skips_devices_without_result() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.20", "web.lan")]), None)
        .await
        .unwrap();
    h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();

    let summary = h.engine.port_pass(&home, None).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.reported, 0);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.20"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_leaves_record_unchanged() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "old.lan")]), None)
        .await
        .unwrap();
    let attempts_before = h.store.upsert_attempts();
    let notes_before = h.sink.count();

    h.store.lock_next_upserts(5);
    let summary = h
        .engine
        .reconcile_liveness(
            &home,
            &sweep(&[("192.168.1.10", "new.lan"), ("192.168.1.20", "tv.lan")]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(summary.abandoned, 1);
    assert_eq!(summary.discovered, 1);
    // Five attempts for the locked record, one for the next device.
    assert_eq!(h.store.upsert_attempts() - attempts_before, 6);

    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.hostname, "old.lan");
    assert!(h
        .store
        .get_record(&home.identity, ip("192.168.1.20"))
        .await
        .unwrap()
        .is_some());
    assert_eq!(h.sink.count() - notes_before, 1);
}

#[tokio::test]
async fn test_permanent_write_error_is_not_retried() {
    let h = harness();
    let home = ctx("Home");
    h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();

    h.store.fail_next_upserts(1);
    let summary = h
        .engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "nas.lan")]), None)
        .await
        .unwrap();

    assert_eq!(summary.abandoned, 1);
    assert_eq!(h.store.upsert_attempts(), 1);
    assert_eq!(h.sink.count(), 0);
    // Progress is still reported for the responder.
    assert_eq!(summary.reported, 1);
}

#[tokio::test]
async fn test_passive_cache_names_unresolved_hosts() {
    let h = harness();
    let home = ctx("Home");
    h.mdns.record(ip("192.168.1.40"), "printer.local");

    h.engine
        .reconcile_liveness(
            &home,
            &sweep(&[("192.168.1.40", ""), ("192.168.1.41", "")]),
            None,
        )
        .await
        .unwrap();

    let printer = h
        .store
        .get_record(&home.identity, ip("192.168.1.40"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(printer.hostname, "printer.local");
    let nameless = h
        .store
        .get_record(&home.identity, ip("192.168.1.41"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nameless.hostname, UNKNOWN);
    assert_eq!(nameless.mac, UNKNOWN);
}

#[tokio::test]
async fn test_disabled_toggles_still_write_records() {
    let h = harness_with(EngineSettings {
        notifications: NotificationToggles {
            host_discovery: false,
            host_update: false,
            port_discovery: false,
        },
        ..EngineSettings::default()
    });
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "nas.lan")]), None)
        .await
        .unwrap();
    h.scanner.open_ports("192.168.1.10", &[22]);
    h.engine.port_pass(&home, None).await.unwrap();
    h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();

    assert_eq!(h.sink.count(), 0);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.ports, PortSet::from([22]));
    assert_eq!(record.status, DeviceStatus::Offline);
}

#[tokio::test]
async fn test_offline_tracking_can_be_disabled() {
    let h = harness_with(EngineSettings {
        track_offline: false,
        ..EngineSettings::default()
    });
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "nas.lan")]), None)
        .await
        .unwrap();
    let summary = h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();

    assert_eq!(summary.went_offline, 0);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Online);
}

#[tokio::test]
async fn test_passes_record_provenance() {
    let h = harness();
    let home = ctx("Home");

    h.scanner.respond(sweep(&[("192.168.1.10", "nas.lan")]));
    h.engine.liveness_pass(&home, None).await.unwrap();
    let row = h.store.get_network(&home.identity).await.unwrap().unwrap();
    assert_eq!(row.updated_by.as_deref(), Some(LIVENESS_PROVENANCE));
    assert_eq!(row.meta.cidr, "192.168.1.0/24");

    h.engine.port_pass(&home, None).await.unwrap();
    let row = h.store.get_network(&home.identity).await.unwrap().unwrap();
    assert_eq!(row.updated_by.as_deref(), Some(PORT_PROVENANCE));
}

#[tokio::test]
async fn test_sweep_that_did_not_run_touches_nothing() {
    let h = harness();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.10", "nas.lan")]), None)
        .await
        .unwrap();

    let summary = h.engine.liveness_pass(&home, None).await.unwrap();
    assert_eq!(summary.went_offline, 0);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Online);
}

#[tokio::test]
async fn test_overlapping_liveness_passes_discover_once() {
    let (h, other) = overlapping();
    let home = ctx("Home");
    let seen = sweep(&[("192.168.1.10", "nas.lan"), ("192.168.1.11", "tv.lan")]);

    let (a, b) = tokio::join!(
        h.engine.reconcile_liveness(&home, &seen, None),
        other.reconcile_liveness(&home, &seen, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.discovered + b.discovered, 2);
    assert_eq!(a.updated + b.updated, 2);
    assert_eq!(h.store.list_records(&home.identity).await.unwrap().len(), 2);
    assert_eq!(h.sink.from_service(ServiceTag::HostDiscovery), 2);
    assert_eq!(h.sink.count(), 2);
}

#[tokio::test]
async fn test_overlapping_liveness_passes_report_recovery_once() {
    let (h, other) = overlapping();
    let home = ctx("Home");
    let seen = sweep(&[("192.168.1.10", "nas.lan")]);
    h.engine.reconcile_liveness(&home, &seen, None).await.unwrap();
    h.engine.reconcile_liveness(&home, &sweep(&[]), None).await.unwrap();
    let before = h.sink.from_service(ServiceTag::HostUpdater);

    let (a, b) = tokio::join!(
        h.engine.reconcile_liveness(&home, &seen, None),
        other.reconcile_liveness(&home, &seen, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.recovered + b.recovered, 1);
    assert_eq!(h.sink.from_service(ServiceTag::HostUpdater) - before, 1);
    assert!(h
        .sink
        .messages()
        .contains(&"Host nas.lan (192.168.1.10) is back online.".to_string()));
}

#[tokio::test]
async fn test_overlapping_liveness_passes_report_offline_once() {
    let (h, other) = overlapping();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(
            &home,
            &sweep(&[("192.168.1.10", "nas.lan"), ("192.168.1.20", "tv.lan")]),
            None,
        )
        .await
        .unwrap();

    // Only the TV answers; both passes see the NAS online before writing.
    let seen = sweep(&[("192.168.1.20", "tv.lan")]);
    let (a, b) = tokio::join!(
        h.engine.reconcile_liveness(&home, &seen, None),
        other.reconcile_liveness(&home, &seen, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.went_offline + b.went_offline, 1);
    let offline: Vec<_> = h
        .sink
        .messages()
        .into_iter()
        .filter(|m| m.ends_with("is offline."))
        .collect();
    assert_eq!(offline, vec!["Host nas.lan (192.168.1.10) is offline."]);
    let record = h
        .store
        .get_record(&home.identity, ip("192.168.1.10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeviceStatus::Offline);
}

#[tokio::test]
async fn test_overlapping_port_passes_report_new_ports_once() {
    let (h, other) = overlapping();
    let home = ctx("Home");
    h.engine
        .reconcile_liveness(&home, &sweep(&[("192.168.1.20", "web.lan")]), None)
        .await
        .unwrap();
    h.scanner.open_ports("192.168.1.20", &[80, 443]);

    let (a, b) = tokio::join!(h.engine.port_pass(&home, None), other.port_pass(&home, None));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.new_ports + b.new_ports, 1);
    assert_eq!(h.sink.from_service(ServiceTag::PortDiscovery), 1);
}
