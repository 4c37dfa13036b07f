use mbus_telemetry::{new_request_ids, record_scrape};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
}

#[test]
fn snapshot_reflects_counters() {
    let before = mbus_telemetry::metrics().snapshot().scrapes;
    record_scrape();
    record_scrape();
    let after = mbus_telemetry::metrics().snapshot().scrapes;
    assert_eq!(after, before + 2);
}
