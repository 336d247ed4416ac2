use ems_telemetry::{
    BridgeMetrics, MetricsSnapshot, metrics, new_trace_id, record_append_retries,
    record_message_received, record_transport_error,
};

#[test]
fn trace_ids_are_unique() {
    let first = new_trace_id();
    let second = new_trace_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let snapshot = BridgeMetrics::new().snapshot();
    assert_eq!(snapshot, MetricsSnapshot::default());
}

#[test]
fn global_counters_only_grow() {
    let before = metrics().snapshot();
    record_message_received();
    record_transport_error();
    record_append_retries(2);
    record_append_retries(0);
    let after = metrics().snapshot();

    assert!(after.messages_received >= before.messages_received + 1);
    assert!(after.transport_errors >= before.transport_errors + 1);
    assert!(after.append_retries >= before.append_retries + 2);
}
