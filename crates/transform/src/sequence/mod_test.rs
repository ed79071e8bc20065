use super::*;
use conduit_protocol::Event;

#[tokio::test]
async fn test_numbers_events_in_order() {
    let processor = SequenceProcessor::new(7, "seq");
    let batch = Batch::from_events((0..3).map(|_| Event::new("log")));

    let out = processor.execute(batch).await.unwrap();
    let seqs: Vec<_> = out.events().map(|e| e.get("seq").cloned()).collect();
    assert_eq!(seqs, vec![Some(0.into()), Some(1.into()), Some(2.into())]);
    assert!(
        out.events()
            .all(|e| e.metadata().attributes.get(INSTANCE_ATTRIBUTE) == Some(&Value::from(7)))
    );
    assert_eq!(processor.count(), 3);
}

#[test]
fn test_factory_assigns_distinct_instances() {
    let factory = SequenceFactory::default();
    assert!(factory.single_thread());
    let a = factory.create(&ProcessorConfig::new()).unwrap();
    let b = factory.create(&ProcessorConfig::new()).unwrap();
    assert_eq!(a.name(), "sequence");
    assert_eq!(b.name(), "sequence");
    assert_eq!(factory.next_instance.load(Ordering::Relaxed), 2);
}
