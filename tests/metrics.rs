//! Tests for the metrics module.

use ironlro::metrics::{CounterMetric, GaugeMetric, HistogramMetric, MetricsCollector};
use serde_json::json;

#[test]
fn test_counter_metric() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("submit_attempts", 5)));

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.get("submit_attempts").unwrap(), &json!(5));
}

#[test]
fn test_gauge_metric() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(
        GaugeMetric::new("inflight_operations", 4.0).with_description("operations being polled"),
    ));

    let json = collector.to_json();
    assert_eq!(json["inflight_operations"]["value"], json!(4.0));
    assert_eq!(json["inflight_operations"]["description"], json!("operations being polled"));
}

#[test]
fn test_increment_counter_accumulates() {
    let collector = MetricsCollector::new();
    collector.increment_counter("polls", 1);
    collector.increment_counter("polls", 5);
    assert_eq!(collector.counter("polls"), Some(6));
    assert_eq!(collector.counter("missing"), None);
}

#[test]
fn test_increment_counter_starts_from_registered_value() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("retries", 10)));
    collector.increment_counter("retries", 2);
    assert_eq!(collector.counter("retries"), Some(12));
}

#[test]
fn test_record_value_builds_histogram() {
    let collector = MetricsCollector::new();
    for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
        collector.record_value("polls_per_operation", v);
    }
    let stats = collector.histogram("polls_per_operation").unwrap();
    assert_eq!(stats.count, 5);
    assert!((stats.mean - 3.0).abs() < f64::EPSILON);
    assert!((stats.max - 5.0).abs() < f64::EPSILON);
}

#[test]
fn test_histogram_metric_json() {
    let collector = MetricsCollector::new();
    collector.register(Box::new(HistogramMetric::with_values("elapsed", vec![10.0, 30.0])));
    let snapshot = collector.snapshot();
    assert_eq!(snapshot["elapsed"]["count"], json!(2));
    assert_eq!(snapshot["elapsed"]["mean"], json!(20.0));
}

#[test]
fn test_clones_share_metrics() {
    let a = MetricsCollector::new();
    let b = a.clone();
    b.increment_counter("pages_fetched", 3);
    assert_eq!(a.counter("pages_fetched"), Some(3));
}

#[test]
fn test_save_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let collector = MetricsCollector::new();
    collector.increment_counter("mutations_succeeded", 2);

    collector.save_to_file(&path).unwrap();

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["mutations_succeeded"]["value"], json!(2));
}
