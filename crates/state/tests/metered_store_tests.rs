//! Integration tests for the metered stores
//!
//! Tests for:
//! - Lifecycle: operations before init, init timing, close cleanup
//! - Store-level metrics: one observation per call, failures included
//! - Timestamped stores: put_if_different_values
//! - Window stores: point and range fetches by window start, fetch metering
//! - Flush listeners over caching and non-caching raw stores, keyed and windowed

use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::metrics::STATE_STORE_LEVEL_GROUP;
use strata_core::traits::StateStore;
use strata_core::{
    DefaultSerdes, InMemoryMetricsRegistry, KeyValue, MetricName, MetricsRegistry, MockClock,
    ProcessorContext, RecordingLevel, Result, SerdeSlot, Serdes, StreamsError, StreamsMetrics,
    TimeWindow, ValueAndTimestamp, Windowed,
};
use strata_state::{
    FlushedChange, MeteredKeyValueStore, MeteredTimestampedKeyValueStore, MeteredWindowStore,
    Stores, IN_MEMORY_STATE_SCOPE,
};
use strata_storage::testing::{FailingMetricsRegistry, RecordingKeyValueStore};
use strata_storage::{CachingKeyValueStore, InMemoryKeyValueStore, KeyValueWindowStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn context_with(registry: Arc<dyn MetricsRegistry>) -> ProcessorContext {
    ProcessorContext::builder("app")
        .thread_id("t1")
        .default_serdes(DefaultSerdes::new(Serdes::string(), Serdes::string()))
        .metrics(Arc::new(StreamsMetrics::new(registry)))
        .clock(Arc::new(MockClock::with_auto_tick(0, 1_000)))
        .build()
}

fn debug_registry() -> Arc<InMemoryMetricsRegistry> {
    Arc::new(InMemoryMetricsRegistry::new(RecordingLevel::Debug))
}

fn store_metric(store: &str, name: &str) -> MetricName {
    MetricName::new(
        name,
        STATE_STORE_LEVEL_GROUP,
        StreamsMetrics::store_level_tags("t1", "0_0", IN_MEMORY_STATE_SCOPE, store),
    )
}

fn string_store(raw: RecordingKeyValueStore) -> MeteredKeyValueStore<String, String> {
    MeteredKeyValueStore::new(Box::new(raw), IN_MEMORY_STATE_SCOPE, SerdeSlot::Unset, SerdeSlot::Unset)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_operations_before_init_fail() {
    let mut store = string_store(RecordingKeyValueStore::new("s"));
    let key = "k".to_string();
    assert!(matches!(store.get(&key), Err(StreamsError::NotInitialized { .. })));
    assert!(matches!(
        store.put(&key, &"v".to_string()),
        Err(StreamsError::NotInitialized { .. })
    ));
    assert!(store.all().is_err());
    assert!(store.flush().is_err());
}

#[test]
fn test_init_creates_debug_sensors_per_operation() {
    init_tracing();
    let registry = debug_registry();
    let mut store = string_store(RecordingKeyValueStore::new("s"));
    store.init(&context_with(registry.clone())).unwrap();

    for op in ["put", "put-if-absent", "put-all", "get", "delete", "range", "all", "flush", "restore"] {
        let sensor = registry
            .get_sensor(&format!("t1.task.0_0.store.s.s.{}", op))
            .unwrap_or_else(|| panic!("missing sensor {}", op));
        assert_eq!(sensor.level(), RecordingLevel::Debug);
    }
    assert_eq!(registry.get_sensor("t1.task.0_0.store.s.s.restore").unwrap().count(), 1);
}

#[test]
fn test_close_removes_sensors_and_closes_store() {
    let registry = debug_registry();
    let raw = RecordingKeyValueStore::new("s");
    let calls = raw.calls();
    let mut store = string_store(raw);
    store.init(&context_with(registry.clone())).unwrap();
    assert!(registry.sensor_count() > 0);

    store.close().unwrap();
    assert_eq!(registry.sensor_count(), 0);
    assert_eq!(calls.closes(), 1);
    assert!(!store.is_open());
}

#[test]
fn test_close_still_closes_store_when_sensor_removal_fails() {
    let registry = Arc::new(FailingMetricsRegistry::new(RecordingLevel::Debug));
    let raw = RecordingKeyValueStore::new("s");
    let calls = raw.calls();
    let mut store = string_store(raw);
    store.init(&context_with(registry.clone())).unwrap();

    assert!(store.close().is_err());
    assert_eq!(calls.closes(), 1);
    assert!(registry.removal_attempts() > 0);
}

#[test]
fn test_close_reports_store_failure_before_sensor_failure() {
    let registry = Arc::new(FailingMetricsRegistry::new(RecordingLevel::Debug));
    let raw = RecordingKeyValueStore::new("s");
    let calls = raw.calls();
    let mut store = string_store(raw);
    store.init(&context_with(registry.clone())).unwrap();
    calls.fail_close(true);

    assert!(matches!(store.close(), Err(StreamsError::Storage(_))));
    assert!(registry.removal_attempts() > 0);
}

// ============================================================================
// Metrics
// ============================================================================

#[test]
fn test_each_operation_records_once() {
    let registry = debug_registry();
    let mut store = string_store(RecordingKeyValueStore::new("s"));
    store.init(&context_with(registry.clone())).unwrap();

    let key = "a".to_string();
    store.put(&key, &"1".to_string()).unwrap();
    store.put(&key, &"2".to_string()).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some("2".to_string()));
    store.delete(&key).unwrap();

    assert_eq!(registry.metric_value(&store_metric("s", "put-total")), Some(2.0));
    assert_eq!(registry.metric_value(&store_metric("s", "get-total")), Some(1.0));
    assert_eq!(registry.metric_value(&store_metric("s", "delete-total")), Some(1.0));
    assert!(registry.metric_value(&store_metric("s", "put-latency-avg")).unwrap() > 0.0);
}

#[test]
fn test_failed_put_is_measured_and_annotated() {
    let registry = debug_registry();
    let raw = RecordingKeyValueStore::new("s");
    let calls = raw.calls();
    let mut store = string_store(raw);
    store.init(&context_with(registry.clone())).unwrap();
    calls.fail_puts(true);

    let err = store.put(&"a".to_string(), &"x".to_string()).unwrap_err();
    assert!(matches!(err, StreamsError::ProcessorState { .. }));
    assert!(err.to_string().contains("\"a\""));
    assert_eq!(registry.metric_value(&store_metric("s", "put-total")), Some(1.0));
}

#[test]
fn test_info_registry_skips_store_sensors() {
    let registry = Arc::new(InMemoryMetricsRegistry::new(RecordingLevel::Info));
    let mut store = string_store(RecordingKeyValueStore::new("s"));
    store.init(&context_with(registry.clone())).unwrap();
    store.put(&"a".to_string(), &"x".to_string()).unwrap();

    assert_eq!(registry.get_sensor("t1.task.0_0.store.s.s.put").unwrap().count(), 0);
}

#[test]
fn test_range_iterator_records_on_close() {
    let registry = debug_registry();
    let mut store = string_store(RecordingKeyValueStore::new("s"));
    store.init(&context_with(registry.clone())).unwrap();
    for k in ["a", "b", "c"] {
        store.put(&k.to_string(), &k.to_uppercase()).unwrap();
    }

    {
        let mut iter = store.range(&"a".to_string(), &"b".to_string()).unwrap();
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first, KeyValue::pair("a".to_string(), "A".to_string()));
        assert_eq!(registry.metric_value(&store_metric("s", "range-total")), Some(0.0));
    }
    assert_eq!(registry.metric_value(&store_metric("s", "range-total")), Some(1.0));

    let all: Vec<KeyValue<String, String>> = store.all().unwrap().collect::<Result<_>>().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(registry.metric_value(&store_metric("s", "all-total")), Some(1.0));
}

// ============================================================================
// Timestamped Stores
// ============================================================================

#[test]
fn test_put_if_different_values_skips_repeated_payload() {
    let raw = RecordingKeyValueStore::new("ts");
    let calls = raw.calls();
    let mut store: MeteredTimestampedKeyValueStore<String, String> =
        MeteredTimestampedKeyValueStore::new(
            Box::new(raw),
            IN_MEMORY_STATE_SCOPE,
            SerdeSlot::Unset,
            SerdeSlot::Unset,
        );
    store.init(&context_with(debug_registry())).unwrap();

    let key = "a".to_string();
    store.put(&key, &ValueAndTimestamp::make("x".to_string(), 100)).unwrap();
    let old = store.get_with_binary(&key).unwrap().unwrap();
    assert_eq!(old.value, ValueAndTimestamp::make("x".to_string(), 100));

    let written = store
        .put_if_different_values(
            &key,
            &ValueAndTimestamp::make("x".to_string(), 150),
            Some(&old.serialized_value),
        )
        .unwrap();
    assert!(!written);
    assert_eq!(calls.puts(), 1);

    let written = store
        .put_if_different_values(
            &key,
            &ValueAndTimestamp::make("x".to_string(), 99),
            Some(&old.serialized_value),
        )
        .unwrap();
    assert!(written);
    assert_eq!(calls.puts(), 2);
}

// ============================================================================
// Window Stores
// ============================================================================

fn window_store() -> MeteredWindowStore<String, String> {
    window_store_with(debug_registry())
}

fn window_store_with(registry: Arc<InMemoryMetricsRegistry>) -> MeteredWindowStore<String, String> {
    let mut store = MeteredWindowStore::new(
        Box::new(KeyValueWindowStore::new(InMemoryKeyValueStore::new("w"))),
        60_000,
        "in-memory-window-state",
        SerdeSlot::Unset,
        SerdeSlot::Unset,
    );
    store.init(&context_with(registry)).unwrap();
    store
}

#[test]
fn test_window_fetch_by_start() {
    let mut store = window_store();
    let key = "k1".to_string();
    store.put(&key, Some(&"v1".to_string()), 1_000).unwrap();

    assert_eq!(store.fetch(&key, 1_000).unwrap(), Some("v1".to_string()));
    assert_eq!(store.fetch(&key, 0).unwrap(), None);
    assert_eq!(store.fetch_range(&key, 0, 999).unwrap().count(), 0);

    let hits: Vec<KeyValue<i64, String>> = store
        .fetch_range(&key, 1_000, 1_000)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(hits, vec![KeyValue::pair(1_000, "v1".to_string())]);
}

#[test]
fn test_window_fetch_range_is_ordered() {
    let mut store = window_store();
    let key = "k".to_string();
    for (start, value) in [(120_000, "c"), (0, "a"), (60_000, "b")] {
        store.put(&key, Some(&value.to_string()), start).unwrap();
    }
    store.put(&"other".to_string(), Some(&"z".to_string()), 60_000).unwrap();

    let starts: Vec<i64> = store
        .fetch_range(&key, 0, 120_000)
        .unwrap()
        .map(|kv| kv.unwrap().key)
        .collect();
    assert_eq!(starts, vec![0, 60_000, 120_000]);
}

#[test]
fn test_window_fetch_range_from_negative_bound() {
    let mut store = window_store();
    let key = "k1".to_string();
    store.put(&key, Some(&"v1".to_string()), 1_000).unwrap();

    let hits: Vec<KeyValue<i64, String>> = store
        .fetch_range(&key, -1, 2_000)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(hits, vec![KeyValue::pair(1_000, "v1".to_string())]);
}

#[test]
fn test_each_window_read_records_one_fetch() {
    let registry = debug_registry();
    let mut store = window_store_with(registry.clone());
    let key = "k".to_string();
    store.put(&key, Some(&"v".to_string()), 0).unwrap();
    let fetches = || registry.get_sensor("t1.task.0_0.store.w.s.fetch").unwrap().count();

    assert_eq!(store.fetch(&key, 0).unwrap(), Some("v".to_string()));
    assert_eq!(fetches(), 1);
    assert_eq!(store.fetch_range(&key, 0, 60_000).unwrap().count(), 1);
    assert_eq!(fetches(), 2);
    assert_eq!(store.fetch_key_range(&key, &key, 0, 60_000).unwrap().count(), 1);
    assert_eq!(fetches(), 3);
    assert_eq!(store.fetch_all(0, 60_000).unwrap().count(), 1);
    assert_eq!(fetches(), 4);
    assert_eq!(store.all().unwrap().count(), 1);
    assert_eq!(fetches(), 5);
}

// ============================================================================
// Flush Listeners
// ============================================================================

#[test]
fn test_flush_listener_rejected_without_cache() {
    let mut store = string_store(RecordingKeyValueStore::new("s"));
    store.init(&context_with(debug_registry())).unwrap();
    assert!(!store.set_flush_listener(|_| {}, true));
}

#[test]
fn test_flush_listener_receives_typed_changes() {
    let mut store: MeteredKeyValueStore<String, String> = MeteredKeyValueStore::new(
        Box::new(CachingKeyValueStore::new(InMemoryKeyValueStore::new("cached"))),
        IN_MEMORY_STATE_SCOPE,
        SerdeSlot::Unset,
        SerdeSlot::Unset,
    );
    let context = context_with(debug_registry());
    store.init(&context).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    assert!(store.set_flush_listener(move |change| sink.lock().push(change), true));

    let key = "a".to_string();
    context.set_record_timestamp(10);
    store.put(&key, &"1".to_string()).unwrap();
    store.flush().unwrap();
    context.set_record_timestamp(20);
    store.put(&key, &"2".to_string()).unwrap();
    assert!(seen.lock().is_empty());
    store.flush().unwrap();

    let seen = seen.lock();
    assert_eq!(
        *seen,
        vec![
            FlushedChange {
                key: key.clone(),
                new_value: Some("1".to_string()),
                old_value: None,
                timestamp: 10,
            },
            FlushedChange {
                key,
                new_value: Some("2".to_string()),
                old_value: Some("1".to_string()),
                timestamp: 20,
            },
        ]
    );
}

#[test]
fn test_cached_window_store_flush_listener_sends_old_values() {
    let mut store = Stores::window_store_builder::<String, String>("cw", 60_000)
        .with_caching_enabled()
        .build();
    let context = context_with(debug_registry());
    store.init(&context).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    assert!(store.set_flush_listener(move |change| sink.lock().push(change), true));

    let key = "k".to_string();
    context.set_record_timestamp(10);
    store.put(&key, Some(&"1".to_string()), 1_000).unwrap();
    store.flush().unwrap();
    context.set_record_timestamp(20);
    store.put(&key, Some(&"2".to_string()), 1_000).unwrap();
    assert_eq!(seen.lock().len(), 1);
    store.flush().unwrap();

    let windowed = Windowed::new(key, TimeWindow::of_size(1_000, 60_000));
    let seen = seen.lock();
    assert_eq!(
        *seen,
        vec![
            FlushedChange {
                key: windowed.clone(),
                new_value: Some("1".to_string()),
                old_value: None,
                timestamp: 10,
            },
            FlushedChange {
                key: windowed,
                new_value: Some("2".to_string()),
                old_value: Some("1".to_string()),
                timestamp: 20,
            },
        ]
    );
}

#[test]
fn test_builder_stores_resolve_default_serdes() {
    let mut store = Stores::key_value_store_builder::<String, String>("built")
        .with_caching_enabled()
        .build();
    store.init(&context_with(debug_registry())).unwrap();
    store.put(&"k".to_string(), &"v".to_string()).unwrap();
    assert_eq!(store.get(&"k".to_string()).unwrap(), Some("v".to_string()));
    assert_eq!(store.serdes().unwrap().topic(), "app-built-changelog");
}
