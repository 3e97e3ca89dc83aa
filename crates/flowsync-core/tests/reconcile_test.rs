// Integration tests for per-device reconciliation against a recording device.

#![allow(clippy::unwrap_used)]

mod common;

use pretty_assertions::assert_eq;

use common::{Call, RecordingService, device, flow, group, meter, push, remove};
use flowsync_core::{
    CoreError, DeviceReconciliationTask, EngineConfig, NodeState, ReconcileOutcome, Table,
    TableFeatures, TableId,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn features(table: u8) -> TableFeatures {
    TableFeatures {
        table_id: TableId(table),
        name: format!("table{table}"),
        max_entries: 4096,
        metadata_match: u64::MAX,
        metadata_write: u64::MAX,
        properties: vec!["instructions".into()],
    }
}

fn desired_state() -> NodeState {
    NodeState {
        tables: vec![Table {
            id: TableId(0),
            features: vec![features(0)],
            flows: vec![flow(0, "to-group", 1), flow(0, "plain", 2)],
        }],
        groups: vec![group(2, &[]), group(3, &[2, 4]), group(4, &[2])],
        meters: vec![meter(1, 1000)],
    }
}

// ── Ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn kinds_applied_in_dependency_order() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);

    let summary = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&desired_state(), &NodeState::default())
        .await
        .unwrap();

    assert_eq!(summary.written, 7);
    assert_eq!(summary.removed, 0);

    let calls = service.calls();
    let table_features = service
        .position(&Call::Update("table-features 0".into()))
        .unwrap();
    let group_2 = service.position(&push("group 2")).unwrap();
    let group_4 = service.position(&push("group 4")).unwrap();
    let group_3 = service.position(&push("group 3")).unwrap();
    let meter_1 = service.position(&push("meter 1")).unwrap();
    let flow_a = service.position(&push("flow 0/to-group")).unwrap();

    assert!(table_features < group_2);
    assert!(group_2 < group_4 && group_4 < group_3);
    assert!(group_3 < meter_1);
    assert!(meter_1 < flow_a);

    // table features, three group phases, meters, flows
    assert_eq!(service.barrier_count(), 6);
    assert_eq!(calls.last(), Some(&Call::Barrier));
}

#[tokio::test]
async fn converged_device_sees_no_writes() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);
    let state = desired_state();

    let summary = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&state, &state)
        .await
        .unwrap();

    assert_eq!(summary.written, 0);
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn changed_objects_are_updated() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);
    let desired = desired_state();
    let mut observed = desired.clone();
    observed.groups[0] = group(2, &[9]);
    observed.meters[0] = meter(1, 5);
    observed.tables[0].flows[1] = flow(0, "plain", 99);

    DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&desired, &observed)
        .await
        .unwrap();

    assert_eq!(
        service.calls(),
        vec![
            Call::Update("group 2".into()),
            Call::Barrier,
            Call::Update("meter 1".into()),
            Call::Barrier,
            Call::Update("flow 0/plain".into()),
            Call::Barrier,
        ]
    );
}

#[tokio::test]
async fn updates_skipped_without_gather_updates() {
    let service = RecordingService::new();
    let config = EngineConfig {
        gather_updates: false,
        ..EngineConfig::default()
    };
    let dev = device(1);
    let desired = desired_state();
    let mut observed = desired.clone();
    observed.meters[0] = meter(1, 5);

    let summary = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&desired, &observed)
        .await
        .unwrap();

    assert_eq!(summary.written, 0);
    assert!(service.calls().is_empty());
}

// ── Removal ─────────────────────────────────────────────────────────

#[tokio::test]
async fn redundant_objects_removed_flows_meters_groups() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);
    let desired = NodeState {
        groups: vec![group(1, &[])],
        ..NodeState::default()
    };
    let observed = NodeState {
        tables: vec![Table::with_flows(0, vec![flow(0, "stale", 1)])],
        groups: vec![group(1, &[]), group(10, &[]), group(11, &[10])],
        meters: vec![meter(7, 1)],
    };

    let summary = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&desired, &observed)
        .await
        .unwrap();

    assert_eq!(summary.removed, 4);
    assert_eq!(
        service.calls(),
        vec![
            remove("flow 0/stale"),
            Call::Barrier,
            remove("meter 7"),
            Call::Barrier,
            remove("group 11"),
            Call::Barrier,
            remove("group 10"),
            Call::Barrier,
        ]
    );
}

#[tokio::test]
async fn stale_group_with_unreported_target_is_still_removed() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);
    let observed = NodeState {
        groups: vec![group(50, &[60])],
        ..NodeState::default()
    };

    let summary = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&desired_state(), &observed)
        .await
        .unwrap();

    assert_eq!(summary.written, 7);
    assert_eq!(summary.removed, 1);
    let group_3 = service.position(&push("group 3")).unwrap();
    let flow = service.position(&push("flow 0/to-group")).unwrap();
    let removal = service.position(&remove("group 50")).unwrap();
    assert!(group_3 < flow && flow < removal);
}

#[tokio::test]
async fn removal_disabled_keeps_device_extras() {
    let service = RecordingService::new();
    let config = EngineConfig {
        remove_redundant: false,
        ..EngineConfig::default()
    };
    let dev = device(1);
    let observed = NodeState {
        meters: vec![meter(7, 1)],
        ..NodeState::default()
    };

    DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .sync(&NodeState::default(), &observed)
        .await
        .unwrap();

    assert!(service.calls().is_empty());
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_group_phase_abandons_rest_of_plan() {
    let service = RecordingService::new();
    service.fail_object("group 4");
    let config = EngineConfig::default();
    let dev = device(1);

    let outcome = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .run(&desired_state(), Some(&NodeState::default()))
        .await;

    let ReconcileOutcome::Failed(CoreError::Aggregated(err)) = &outcome else {
        panic!("expected aggregated failure, got {outcome:?}");
    };
    assert_eq!(err.context, "group add/update");
    assert_eq!(err.causes.len(), 1);

    let calls = service.calls();
    assert!(!calls.contains(&push("group 3")));
    assert!(!calls.contains(&push("meter 1")));
    assert!(!calls.iter().any(|c| matches!(c, Call::Push(name) if name.starts_with("flow"))));
}

#[tokio::test]
async fn unsatisfiable_groups_write_nothing() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);
    let desired = NodeState {
        groups: vec![group(3, &[4])],
        meters: vec![meter(1, 10)],
        ..NodeState::default()
    };
    let observed = NodeState {
        groups: vec![group(1, &[]), group(2, &[])],
        ..NodeState::default()
    };

    let outcome = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .run(&desired, Some(&observed))
        .await;

    let ReconcileOutcome::Failed(CoreError::Dependency(err)) = &outcome else {
        panic!("expected dependency failure, got {outcome:?}");
    };
    assert_eq!(err.unresolved, vec![flowsync_core::GroupId(3)]);
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn missing_observed_state_skips() {
    let service = RecordingService::new();
    let config = EngineConfig::default();
    let dev = device(1);

    let outcome = DeviceReconciliationTask::new(service.as_ref(), &dev, &config)
        .run(&desired_state(), None)
        .await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped(CoreError::ReadUnavailable { .. })
    ));
    assert!(service.calls().is_empty());
}
