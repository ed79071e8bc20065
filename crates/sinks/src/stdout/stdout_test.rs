use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use conduit_protocol::{Event, Record};
use super::*;

/// Writer appending into a shared byte buffer
#[derive(Clone, Default)]
struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

impl AsyncWrite for SharedBuf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn record(message: &str) -> Record {
    let mut event = Event::new("log");
    event.put("message", message).unwrap();
    Record::new(event)
}

#[tokio::test]
async fn test_writes_json_lines() {
    let buf = SharedBuf::default();
    let sink = StdoutSink::with_writer("out", buf.clone());

    sink.output(vec![record("a"), record("b")]).await.unwrap();

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        [
            r#"{"type":"log","data":{"message":"a"}}"#,
            r#"{"type":"log","data":{"message":"b"}}"#
        ]
    );
    assert_eq!(sink.metrics().unwrap().records_written, 2);
}

#[tokio::test]
async fn test_includes_metadata_when_asked() {
    let buf = SharedBuf::default();
    let sink = StdoutSink::with_writer("out", buf.clone()).with_metadata(true);
    sink.output(vec![record("a")]).await.unwrap();

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
    assert!(value["metadata"]["time_received"].is_string());
    sink.close().await.unwrap();
}

#[test]
fn test_factory_rejects_bad_option() {
    let mut config = SinkPluginConfig::new();
    config.insert("metadata".into(), toml::Value::String("yes".into()));
    assert!(StdoutSinkFactory.create("out", &config).is_err());
}
