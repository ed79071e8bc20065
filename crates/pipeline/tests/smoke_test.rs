//! Smoke tests for the pipeline graph
//!
//! These tests build graphs from TOML, feed them through the in-memory
//! source and check what reaches the in-memory sinks and which
//! acknowledgement outcome the source observes.

use std::time::Duration;

use conduit_config::Config;
use conduit_pipeline::{PipelineError, PipelineGraph, PipelineState, PluginRegistries};
use conduit_protocol::{Event, Value};
use conduit_sinks::{InMemorySinkAccessor, InMemorySinkFactory};
use conduit_sources::{InMemorySourceAccessor, InMemorySourceFactory};
use conduit_transform::ProcessorConfig;

const WAIT: Duration = Duration::from_secs(10);

struct TestGraph {
    source: InMemorySourceAccessor,
    sink: InMemorySinkAccessor,
    graph: PipelineGraph,
}

impl TestGraph {
    fn new(toml: &str) -> Self {
        let source = InMemorySourceAccessor::new();
        let sink = InMemorySinkAccessor::new();

        let mut registries = PluginRegistries::with_defaults();
        registries
            .sources
            .register("in_memory", InMemorySourceFactory::new(source.clone()));
        registries
            .sinks
            .register("in_memory", InMemorySinkFactory::new(sink.clone()));

        let config: Config = toml.parse().expect("valid config");
        let graph = PipelineGraph::from_config(&config, &registries).expect("graph builds");
        Self {
            source,
            sink,
            graph,
        }
    }
}

fn numbered(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            let mut event = Event::new("log");
            event.put("n", i).unwrap();
            event.put("message", format!("record {i}")).unwrap();
            event
        })
        .collect()
}

fn processor_options(toml: &str) -> ProcessorConfig {
    toml::from_str(toml).expect("valid processor options")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_sink_receives_every_record() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 4

        [pipelines.minimal]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        sinks = [{ type = "in_memory", testing_key = "out" }]
        "#,
    );
    t.graph.start().await.unwrap();

    let input = numbered(200);
    t.source.submit("in", input.clone());

    assert!(t.sink.wait_for("out", 200, WAIT).await);
    assert_eq!(t.source.wait_for_acks("in", 1, WAIT).await, Some(true));
    t.graph.stop().await;

    assert_eq!(t.sink.get("out"), input);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routes_feed_sub_pipelines() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 2

        [pipelines.entry]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        routes = [
            { name = "route_one", condition = "/route == 1" },
            { name = "route_two", condition = "/route == 2" },
        ]
        sinks = [
            { type = "pipeline", pipeline = "sub_one", routes = ["route_one"] },
            { type = "pipeline", pipeline = "sub_two", routes = ["route_two"] },
        ]

        [pipelines.sub_one]
        source = { type = "pipeline" }
        sinks = [{ type = "in_memory", testing_key = "one" }]

        [pipelines.sub_two]
        source = { type = "pipeline" }
        sinks = [{ type = "in_memory", testing_key = "two" }]
        "#,
    );
    assert_eq!(t.graph.start_order(), vec!["entry", "sub_one", "sub_two"]);
    t.graph.start().await.unwrap();

    let events = (0..100)
        .map(|i| {
            let mut event = Event::new("log");
            event.put("n", i).unwrap();
            event.put("route", if i % 3 == 0 { 1 } else { 2 }).unwrap();
            event
        })
        .collect();
    t.source.submit("in", events);

    assert_eq!(t.source.wait_for_acks("in", 1, WAIT).await, Some(true));
    t.graph.stop().await;

    let one = t.sink.get("one");
    let two = t.sink.get("two");
    assert_eq!(one.len(), 34);
    assert_eq!(two.len(), 66);
    assert!(one.iter().all(|e| e.get("/route") == Some(&Value::from(1))));
    assert!(two.iter().all(|e| e.get("/route") == Some(&Value::from(2))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failing_sink_fails_acknowledgement() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 2

        [pipelines.fanout]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        sinks = [
            { type = "in_memory", testing_key = "s1" },
            { type = "in_memory", testing_key = "s2" },
            { type = "in_memory", testing_key = "s3" },
        ]
        "#,
    );
    t.sink.set_result("s2", false);
    t.graph.start().await.unwrap();

    t.source.submit("in", numbered(100));

    assert_eq!(t.source.wait_for_acks("in", 1, WAIT).await, Some(false));
    for key in ["s1", "s2", "s3"] {
        assert!(t.sink.wait_for(key, 100, WAIT).await, "sink {key} incomplete");
    }
    t.graph.stop().await;

    let fanout = &t.graph.metrics()["fanout"];
    assert_eq!(fanout.sink_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_acknowledgement_is_never_reported() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 1
        acknowledgement_expiry = "50ms"
        expiry_sweep_interval = "10ms"

        [pipelines.slow]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        sinks = [{ type = "in_memory", testing_key = "out", latency_ms = 400 }]
        "#,
    );
    t.graph.start().await.unwrap();

    t.source.submit("in", numbered(10));

    assert!(t.sink.wait_for("out", 10, WAIT).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.source.ack_received("in"), None);
    assert_eq!(t.source.acks_completed("in"), 0);
    assert!(t.graph.ack_metrics().sets_expired >= 1);
    t.graph.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hot_swap_changes_later_records_only() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 3

        [pipelines.live]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        processors = [
            { type = "add_field", key = "/first", value = "old" },
            { type = "add_field", key = "/second", value = "old" },
        ]
        sinks = [{ type = "in_memory", testing_key = "out" }]
        "#,
    );
    t.graph.start().await.unwrap();

    for _ in 0..5 {
        t.source.submit("in", numbered(20));
    }
    assert_eq!(t.source.wait_for_acks("in", 5, WAIT).await, Some(true));

    let registry = conduit_transform::create_default_registry();
    let chain = registry
        .build_chain(
            &[
                ("add_field", processor_options(r#"key = "/first"
value = "new""#)),
                ("add_field", processor_options(r#"key = "/second"
value = "new""#)),
            ],
            3,
        )
        .unwrap();
    let previous = t.graph.swap_processors("live", chain).unwrap();
    previous.close().unwrap();

    for _ in 0..5 {
        t.source.submit("in", numbered(20));
    }
    assert_eq!(t.source.wait_for_acks("in", 10, WAIT).await, Some(true));
    t.graph.stop().await;

    let out = t.sink.get("out");
    assert_eq!(out.len(), 200);
    let tags = |e: &Event| {
        (
            e.get("/first").and_then(Value::as_str).map(str::to_owned),
            e.get("/second").and_then(Value::as_str).map(str::to_owned),
        )
    };
    let old = (Some("old".to_string()), Some("old".to_string()));
    let new = (Some("new".to_string()), Some("new".to_string()));
    assert!(out[..100].iter().all(|e| tags(e) == old));
    assert!(out[100..].iter().all(|e| tags(e) == new));
}

fn tagging_chain(version: usize, workers: usize) -> conduit_transform::ProcessorChain {
    let options = |key: &str| {
        processor_options(&format!(
            r#"key = "{key}"
value = "v{version}""#
        ))
    };
    conduit_transform::create_default_registry()
        .build_chain(
            &[("add_field", options("/first")), ("add_field", options("/second"))],
            workers,
        )
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swaps_during_traffic_keep_records_on_one_chain() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 4

        [pipelines.live]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        processors = [
            { type = "add_field", key = "/first", value = "v0" },
            { type = "add_field", key = "/second", value = "v0" },
        ]
        sinks = [{ type = "in_memory", testing_key = "out" }]
        "#,
    );
    t.graph.start().await.unwrap();

    let submitter = {
        let source = t.source.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                source.submit("in", numbered(10));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };
    for version in 1..=25 {
        t.graph
            .swap_processors("live", tagging_chain(version, 4))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    submitter.await.unwrap();

    assert_eq!(t.source.wait_for_acks("in", 100, WAIT).await, Some(true));
    t.graph.stop().await;
    assert_eq!(t.graph.metrics()["live"].swaps, 25);

    let out = t.sink.get("out");
    assert_eq!(out.len(), 1000);
    for event in &out {
        let first = event.get("/first").and_then(Value::as_str);
        assert!(first.is_some());
        assert_eq!(event.get("/second").and_then(Value::as_str), first);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unrouted_records_do_not_block_acknowledgement() {
    let t = TestGraph::new(
        r#"
        [pipelines.a]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        routes = [{ name = "keep", condition = "/keep" }]
        sinks = [{ type = "pipeline", pipeline = "b", routes = ["keep"] }]

        [pipelines.b]
        source = { type = "pipeline" }
        sinks = [{ type = "pipeline", pipeline = "c" }]

        [pipelines.c]
        source = { type = "pipeline" }
        sinks = [{ type = "in_memory", testing_key = "out" }]
        "#,
    );
    t.graph.start().await.unwrap();

    let events = (0..30)
        .map(|i| {
            let mut event = Event::new("log");
            event.put("keep", i % 2 == 0).unwrap();
            event
        })
        .collect();
    t.source.submit("in", events);

    assert_eq!(t.source.wait_for_acks("in", 1, WAIT).await, Some(true));
    t.graph.stop().await;
    assert_eq!(t.sink.count("out"), 15);
    assert_eq!(t.graph.metrics()["a"].records_unrouted, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fanout_to_three_sinks() {
    let t = TestGraph::new(
        r#"
        [global]
        workers = 4

        [pipelines.fanout]
        source = { type = "in_memory", testing_key = "in" }
        acknowledgements = true
        sinks = [
            { type = "in_memory", name = "a", testing_key = "a" },
            { type = "in_memory", name = "b", testing_key = "b" },
            { type = "in_memory", name = "c", testing_key = "c" },
        ]
        "#,
    );
    t.graph.start().await.unwrap();

    for _ in 0..3 {
        t.source.submit("in", numbered(100));
    }
    assert_eq!(t.source.wait_for_acks("in", 3, WAIT).await, Some(true));
    t.graph.stop().await;

    for key in ["a", "b", "c"] {
        assert_eq!(t.sink.count(key), 300);
    }
    assert_eq!(t.graph.metrics()["fanout"].records_written, 900);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swap_after_stop_is_rejected() {
    let t = TestGraph::new(
        r#"
        [pipelines.p]
        source = { type = "in_memory" }
        sinks = [{ type = "null" }]
        "#,
    );
    t.graph.start().await.unwrap();
    t.graph.stop().await;

    let workers = t.graph.pipeline("p").unwrap().worker_count();
    let err = t
        .graph
        .swap_processors("p", conduit_transform::ProcessorChain::empty(workers))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidState {
            state: PipelineState::Stopped,
            ..
        }
    ));
}
