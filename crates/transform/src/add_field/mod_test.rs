use super::*;
use conduit_protocol::Event;

#[tokio::test]
async fn test_sets_field_on_every_event() {
    let processor = AddFieldProcessor::new("/meta/env", "prod");
    let batch = Batch::from_events([Event::new("log"), Event::new("log")]);

    let out = processor.execute(batch).await.unwrap();
    assert!(out.events().all(|e| e.get("/meta/env") == Some(&Value::from("prod"))));
    assert_eq!(processor.events_modified(), 2);
}

#[tokio::test]
async fn test_no_overwrite_keeps_existing() {
    let processor = AddFieldProcessor::new("env", "prod").with_overwrite(false);
    let mut existing = Event::new("log");
    existing.put("env", "dev").unwrap();
    let batch = Batch::from_events([existing, Event::new("log")]);

    let out = processor.execute(batch).await.unwrap();
    let envs: Vec<_> = out.events().map(|e| e.get("env").cloned()).collect();
    assert_eq!(envs, vec![Some(Value::from("dev")), Some(Value::from("prod"))]);
    assert_eq!(processor.events_modified(), 1);
}

#[tokio::test]
async fn test_put_through_scalar_fails_batch() {
    let processor = AddFieldProcessor::new("/env/name", "prod");
    let mut event = Event::new("log");
    event.put("env", "dev").unwrap();

    let err = processor.execute(Batch::from_events([event])).await.unwrap_err();
    assert!(matches!(err, ProcessorError::Failed(_)));
}

#[test]
fn test_factory_parses_config() {
    let mut config = ProcessorConfig::new();
    config.insert("key".into(), toml::Value::String("env".into()));
    config.insert("value".into(), toml::Value::Integer(3));
    assert!(AddFieldFactory.create(&config).is_ok());

    config.insert("overwrite".into(), toml::Value::String("yes".into()));
    assert!(AddFieldFactory.create(&config).is_err());

    config.remove("value");
    assert!(AddFieldFactory.create(&config).is_err());
}
