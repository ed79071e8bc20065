use super::*;
use serde_json::json;

fn sample() -> Event {
    Event::from_json(
        event_types::LOG,
        r#"{"message":"hello","http":{"status":200,"path":"/"}}"#,
    )
    .unwrap()
}

#[test]
fn test_new_event_is_empty() {
    let event = Event::new(event_types::EVENT);
    assert_eq!(event.event_type(), "event");
    assert!(event.data().is_empty());
    assert!(event.metadata().tags.is_empty());
}

#[test]
fn test_from_json_rejects_non_object() {
    let err = Event::from_json(event_types::LOG, "[1,2]").unwrap_err();
    assert!(matches!(err, ProtocolError::NotAnObject("array")));

    let err = Event::from_json(event_types::LOG, "{").unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidJson(_)));
}

#[test]
fn test_get_top_level_and_nested() {
    let event = sample();
    assert_eq!(event.get("message"), Some(&json!("hello")));
    assert_eq!(event.get("/message"), Some(&json!("hello")));
    assert_eq!(event.get("/http/status"), Some(&json!(200)));
    assert_eq!(event.get("/http/missing"), None);
    assert_eq!(event.get("/message/inner"), None);
    assert!(event.contains("http"));
}

#[test]
fn test_get_invalid_key() {
    let event = sample();
    assert_eq!(event.get(""), None);
    assert_eq!(event.get("/"), None);
    assert_eq!(event.get("/http//status"), None);
}

#[test]
fn test_put_creates_intermediate_objects() {
    let mut event = Event::new(event_types::EVENT);
    assert_eq!(event.put("/a/b/c", 1).unwrap(), None);
    assert_eq!(event.get("/a/b/c"), Some(&json!(1)));

    let previous = event.put("/a/b/c", 2).unwrap();
    assert_eq!(previous, Some(json!(1)));
    assert_eq!(event.get("/a/b/c"), Some(&json!(2)));
}

#[test]
fn test_put_through_scalar_fails() {
    let mut event = sample();
    let err = event.put("/message/inner", true).unwrap_err();
    assert!(matches!(err, ProtocolError::NotTraversable(path) if path == "message"));
}

#[test]
fn test_delete() {
    let mut event = sample();
    assert_eq!(event.delete("/http/status"), Some(json!(200)));
    assert!(!event.contains("/http/status"));
    assert!(event.contains("/http/path"));
    assert_eq!(event.delete("/nope"), None);
}

#[test]
fn test_rename() {
    let mut event = sample();
    assert!(event.rename("message", "/log/body").unwrap());
    assert!(!event.contains("message"));
    assert_eq!(event.get("/log/body"), Some(&json!("hello")));

    assert!(!event.rename("message", "other").unwrap());
    assert!(event.rename("/http/path", "").is_err());
}

#[test]
fn test_insertion_order_preserved() {
    let mut event = Event::new(event_types::EVENT);
    event.put("z", 1).unwrap();
    event.put("a", 2).unwrap();
    event.put("m", 3).unwrap();
    let keys: Vec<&String> = event.data().keys().collect();
    assert_eq!(keys, ["z", "a", "m"]);
    assert_eq!(event.to_json(), r#"{"z":1,"a":2,"m":3}"#);
}

#[test]
fn test_clone_is_deep() {
    let original = sample();
    let mut copy = original.clone();
    copy.put("/http/status", 500).unwrap();
    copy.metadata_mut().tags.insert("copied".into());

    assert_eq!(original.get("/http/status"), Some(&json!(200)));
    assert!(original.metadata().tags.is_empty());
}

#[test]
fn test_serde_shape() {
    let event = sample();
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], json!("log"));
    assert_eq!(value["data"]["message"], json!("hello"));
    assert!(value["metadata"]["time_received"].is_string());

    let back: Event = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
}
