//! Tests for message types.

use super::*;
use serde_json::json;

mod queue_name {
    use super::*;

    #[test]
    fn test_valid_queue_names() {
        for name in ["main", "test-queue", "orders_v2", "orders.created", "Q1"] {
            let queue = QueueName::new(name).unwrap();
            assert_eq!(queue.as_str(), name);
        }
    }

    #[test]
    fn test_invalid_queue_names() {
        assert!(QueueName::new("").is_err());
        assert!(QueueName::new("a".repeat(261)).is_err());
        assert!(QueueName::new("../escape").is_err());
        assert!(QueueName::new(".hidden").is_err());
        assert!(QueueName::new("has space").is_err());
    }

    #[test]
    fn test_queue_names_are_case_sensitive() {
        let lower = QueueName::new("main").unwrap();
        let upper = QueueName::new("Main").unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<QueueName, _> = serde_json::from_value(json!("main"));
        assert!(ok.is_ok());

        let bad: Result<QueueName, _> = serde_json::from_value(json!("a/b"));
        assert!(bad.is_err());
    }
}

mod envelope {
    use super::*;

    #[test]
    fn test_new_envelope_has_empty_header() {
        let envelope = Envelope::new("hello");
        assert_eq!(envelope.body, Body::Text("hello".to_string()));
        assert!(envelope.header.is_empty());
        assert!(envelope.queue.is_none());
        assert_eq!(envelope.origin(), "-");
    }

    #[test]
    fn test_from_parts_accepts_map_header() {
        let envelope =
            Envelope::from_parts("body", Some(json!({"priority": 3, "source": "web"})), None)
                .unwrap();

        assert_eq!(envelope.header.get("priority"), Some(&json!(3)));
        assert_eq!(envelope.header.get("source"), Some(&json!("web")));
    }

    #[test]
    fn test_from_parts_accepts_absent_header() {
        let envelope = Envelope::from_parts("body", None, None).unwrap();
        assert!(envelope.header.is_empty());

        let envelope = Envelope::from_parts("body", Some(Value::Null), None).unwrap();
        assert!(envelope.header.is_empty());
    }

    #[test]
    fn test_from_parts_rejects_non_map_header() {
        let result = Envelope::from_parts("body", Some(json!(["not", "a", "map"])), None);
        match result {
            Err(ValidationError::InvalidFormat { field, message }) => {
                assert_eq!(field, "header");
                assert!(message.contains("array"));
            }
            other => panic!("Expected InvalidFormat, got: {:?}", other),
        }
    }

    #[test]
    fn test_merge_header_overwrites() {
        let mut envelope = Envelope::new("body")
            .with_header("a", 1)
            .with_header("b", 2);

        let mut extra = Header::new();
        extra.insert("b".to_string(), json!(20));
        extra.insert("c".to_string(), json!(30));
        envelope.merge_header(extra);

        assert_eq!(envelope.header.get("a"), Some(&json!(1)));
        assert_eq!(envelope.header.get("b"), Some(&json!(20)));
        assert_eq!(envelope.header.get("c"), Some(&json!(30)));
    }

    #[test]
    fn test_header_keeps_insertion_order_through_serialization() {
        let envelope = Envelope::new("body")
            .with_header("zulu", 1)
            .with_header("alpha", 2)
            .with_header("mike", 3);

        let stored = serde_json::to_vec(&envelope).unwrap();
        let restored: Envelope = serde_json::from_slice(&stored).unwrap();

        let keys: Vec<&str> = restored.header.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_resend_copy_drops_origin() {
        let envelope = Envelope::new("body")
            .with_header("k", "v")
            .with_queue(QueueName::new("main").unwrap());

        let copy = envelope.resend_copy();
        assert_eq!(copy.body, envelope.body);
        assert_eq!(copy.header, envelope.header);
        assert!(copy.queue.is_none());
    }
}

mod body {
    use super::*;

    #[test]
    fn test_invocation_is_executable() {
        let body = Body::from(Invocation::new("count").with_arg("p1").with_arg(2));
        let invocation = body.as_invocation().expect("invocation body");
        assert_eq!(invocation.task, "count");
        assert_eq!(invocation.args, vec![json!("p1"), json!(2)]);

        assert!(Body::from("plain").as_invocation().is_none());
    }

    #[test]
    fn test_body_serialization_is_tagged() {
        let value = serde_json::to_value(Body::Text("hi".to_string())).unwrap();
        assert_eq!(value, json!({"kind": "text", "data": "hi"}));

        let value = serde_json::to_value(Body::Bytes(Bytes::from_static(b"\x00\x01"))).unwrap();
        assert_eq!(value, json!({"kind": "bytes", "data": "AAE="}));
    }
}

#[test]
fn test_receive_options_limit() {
    let unbounded = ReceiveOptions::new();
    assert!(!unbounded.is_satisfied(1_000));

    let limited = ReceiveOptions::new().with_limit(2);
    assert!(!limited.is_satisfied(1));
    assert!(limited.is_satisfied(2));
}
