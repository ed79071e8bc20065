use super::*;

#[test]
fn test_failed_display() {
    let err = ProcessorError::failed("bad record");
    assert_eq!(err.to_string(), "processing failed: bad record");
    assert_eq!(err.processor(), None);
}

#[test]
fn test_config_display() {
    let err = ProcessorError::config("missing 'key'");
    assert!(err.to_string().contains("missing 'key'"));
}

#[test]
fn test_chain_wraps_source() {
    let err = ProcessorError::chain("add_field", ProcessorError::failed("boom"));
    assert_eq!(err.processor(), Some("add_field"));
    assert!(err.to_string().contains("add_field"));
    assert!(err.to_string().contains("boom"));

    let source = std::error::Error::source(&err).unwrap();
    assert!(source.to_string().contains("boom"));
}

#[test]
fn test_worker_count_mismatch_display() {
    let err = ProcessorError::WorkerCountMismatch {
        processor: "sequence",
        expected: 4,
        actual: 2,
    };
    assert_eq!(err.processor(), Some("sequence"));
    assert!(err.to_string().contains("2 instances for 4 workers"));
}
