//! Tests for processor registry

use super::*;
use crate::create_default_registry;

#[test]
fn test_empty_registry() {
    let registry = ProcessorRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.available_types().is_empty());
}

#[test]
fn test_register_and_create() {
    let mut registry = ProcessorRegistry::new();
    registry.register("noop", NoopFactory);

    assert_eq!(registry.len(), 1);
    assert!(registry.contains("noop"));
    assert!(!registry.contains("nonexistent"));

    let processor = registry.create("noop", &ProcessorConfig::new()).unwrap();
    assert_eq!(processor.name(), "noop");
}

#[test]
fn test_try_register_duplicate() {
    let mut registry = ProcessorRegistry::new();
    assert!(registry.try_register("noop", NoopFactory));
    assert!(!registry.try_register("noop", NoopFactory));
}

#[test]
#[should_panic(expected = "already registered")]
fn test_register_duplicate_panics() {
    let mut registry = ProcessorRegistry::new();
    registry.register("noop", NoopFactory);
    registry.register("noop", NoopFactory);
}

#[test]
fn test_unknown_type_lists_available() {
    let registry = create_default_registry();
    let err = registry
        .create("nonexistent", &ProcessorConfig::new())
        .err()
        .unwrap();
    let msg = err.to_string();
    assert!(msg.contains("nonexistent"));
    assert!(msg.contains("add_field, drop_events, noop, sequence"));
}

#[test]
fn test_build_slot_shared_vs_per_worker() {
    let registry = create_default_registry();

    let shared = registry
        .build_slot("noop", &ProcessorConfig::new(), 4)
        .unwrap();
    assert!(!shared.is_per_worker());

    let pinned = registry
        .build_slot("sequence", &ProcessorConfig::new(), 4)
        .unwrap();
    assert!(pinned.is_per_worker());
    assert_eq!(pinned.instances().len(), 4);
    assert_eq!(registry.is_single_thread("sequence"), Some(true));
    assert_eq!(registry.is_single_thread("noop"), Some(false));
}

#[test]
fn test_build_chain() {
    let registry = create_default_registry();
    let mut add = ProcessorConfig::new();
    add.insert("key".into(), toml::Value::String("env".into()));
    add.insert("value".into(), toml::Value::String("prod".into()));

    let chain = registry
        .build_chain(
            &[
                ("add_field", add),
                ("sequence", ProcessorConfig::new()),
                ("noop", ProcessorConfig::new()),
            ],
            3,
        )
        .unwrap();

    assert_eq!(chain.names(), vec!["add_field", "sequence", "noop"]);
    assert_eq!(chain.worker_count(), 3);
    // one shared add_field, three sequence instances, one shared noop
    assert_eq!(chain.processors().count(), 5);
}

#[test]
fn test_build_chain_propagates_config_error() {
    let registry = create_default_registry();
    let result = registry.build_chain(&[("add_field", ProcessorConfig::new())], 1);
    assert!(matches!(result, Err(ProcessorError::Config(_))));
}
