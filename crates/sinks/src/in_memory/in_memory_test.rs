use super::*;

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let mut event = Event::new("log");
            event.put("seq", i as u64).unwrap();
            Record::new(event)
        })
        .collect()
}

#[tokio::test]
async fn test_stores_events_under_key_in_order() {
    let accessor = InMemorySinkAccessor::new();
    let sink = InMemorySink::new("sink", "key", accessor.clone());

    sink.output(records(3)).await.unwrap();
    sink.output(records(2)).await.unwrap();

    let seqs: Vec<u64> = accessor
        .get("key")
        .iter()
        .map(|e| e.get("seq").and_then(|v| v.as_u64()).unwrap())
        .collect();
    assert_eq!(seqs, vec![0, 1, 2, 0, 1]);
    assert_eq!(accessor.count("other"), 0);
}

#[tokio::test]
async fn test_failing_key_stores_and_reports_error() {
    let accessor = InMemorySinkAccessor::new();
    accessor.set_result("key", false);
    let sink = InMemorySink::new("sink", "key", accessor.clone());

    let err = sink.output(records(4)).await.unwrap_err();
    assert!(matches!(err, SinkError::Write(_)));
    assert_eq!(accessor.count("key"), 4);
    assert_eq!(sink.metrics().unwrap().write_errors, 1);

    accessor.set_result("key", true);
    sink.output(records(1)).await.unwrap();
}

#[tokio::test]
async fn test_get_and_clear() {
    let accessor = InMemorySinkAccessor::new();
    let sink = InMemorySink::new("sink", "key", accessor.clone());
    sink.output(records(2)).await.unwrap();

    assert_eq!(accessor.get_and_clear("key").len(), 2);
    assert!(accessor.get("key").is_empty());
}

#[tokio::test]
async fn test_latency_delays_write() {
    let accessor = InMemorySinkAccessor::new();
    let sink = InMemorySink::new("sink", "key", accessor.clone())
        .with_latency(Duration::from_millis(50));

    let started = Instant::now();
    sink.output(records(1)).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_wait_for() {
    let accessor = InMemorySinkAccessor::new();
    assert!(!accessor.wait_for("key", 1, Duration::from_millis(20)).await);

    let sink = InMemorySink::new("sink", "key", accessor.clone());
    let writer = tokio::spawn(async move { sink.output(records(3)).await });
    assert!(accessor.wait_for("key", 3, Duration::from_secs(1)).await);
    writer.await.unwrap().unwrap();
}

#[test]
fn test_factory_options() {
    let factory = InMemorySinkFactory::default();
    let mut config = SinkPluginConfig::new();
    config.insert("testing_key".into(), toml::Value::String("k".into()));
    config.insert("latency_ms".into(), toml::Value::Integer(10));
    let sink = factory.create("s", &config).unwrap();
    assert_eq!(sink.name(), "s");

    config.insert("latency_ms".into(), toml::Value::Integer(-1));
    assert!(factory.create("s", &config).is_err());
}
