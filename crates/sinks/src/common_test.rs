use super::*;

#[test]
fn test_metrics_snapshot() {
    let metrics = SinkMetrics::new();
    metrics.batch_received();
    metrics.batch_received();
    metrics.batch_written(10, 400);
    metrics.write_error();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.batches_received, 2);
    assert_eq!(snapshot.batches_written, 1);
    assert_eq!(snapshot.records_written, 10);
    assert_eq!(snapshot.bytes_written, 400);
    assert_eq!(snapshot.write_errors, 1);
}

#[test]
fn test_error_helpers() {
    assert_eq!(SinkError::init("no disk").to_string(), "failed to initialize sink: no disk");
    assert_eq!(SinkError::write("refused").to_string(), "write failed: refused");
    assert!(SinkError::config("bad").to_string().contains("configuration"));
    assert_eq!(SinkError::Closed.to_string(), "sink closed");
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
    let err: SinkError = io.into();
    assert!(matches!(err, SinkError::Io(_)));
}
