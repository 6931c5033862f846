//! Delivery failures and the `on_error` pipeline, end to end.

mod common;

use common::*;
use message_queue::config::default_interfaces;
use message_queue::{
    error_callback_fn, ErrorActionEntry, HandlerError, InMemoryBackend, ReceiveOptions,
};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_log_and_requeue_on_failed_delivery() {
    let backend = InMemoryBackend::new();
    let log = RecordingFailureLog::default();
    let callback = RecordingCallback::failing_on(&["bad"]);
    let registry = registry_with(vec![(
        "main",
        named("main", "memory")
            .with_callback("record")
            .with_on_error(vec![
                ErrorActionEntry::bare("log"),
                ErrorActionEntry::bare("requeue"),
            ]),
    )]);
    let queue = memory_engine(registry, &backend, &log)
        .callback("record", callback.clone())
        .build()
        .unwrap();

    queue.send("main", "bad").await.unwrap();
    assert_eq!(queue.consume("main", &ReceiveOptions::new()).await.unwrap(), 1);

    let records = log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].interface, "main");
    assert_eq!(records[0].queue, "main");
    assert!(records[0].failure.contains("rejected 'bad'"));
    assert_eq!(stored_texts(&backend, "main"), vec!["bad"]);
}

#[tokio::test]
async fn test_drop_discards_failed_message() {
    let backend = InMemoryBackend::new();
    let log = RecordingFailureLog::default();
    let registry = registry_with(vec![(
        "main",
        named("main", "memory")
            .with_callback("record")
            .with_on_error(vec![ErrorActionEntry::bare("drop")]),
    )]);
    let queue = memory_engine(registry, &backend, &log)
        .callback("record", RecordingCallback::failing_on(&["bad"]))
        .build()
        .unwrap();

    queue.send("main", "bad").await.unwrap();
    queue.consume("main", &ReceiveOptions::new()).await.unwrap();

    assert!(log.records().is_empty());
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_default_interface_requeues_only_the_failed_message() {
    let backend = InMemoryBackend::new();
    let log = RecordingFailureLog::default();
    let callback = RecordingCallback::failing_on(&["M1"]);

    let (name, config) = default_interfaces().unwrap().remove(0);
    let registry = registry_with(vec![(name.as_str(), config.with_callback("record"))]);
    let queue = memory_engine(registry, &backend, &log)
        .callback("record", callback.clone())
        .deferred_enabled(false)
        .build()
        .unwrap();

    queue.send("main", "M1").await.unwrap();
    queue.send("main", "M2").await.unwrap();

    let consumed = queue.consume("main", &ReceiveOptions::new()).await.unwrap();
    assert_eq!(consumed, 2);

    assert_eq!(callback.delivered_texts(), vec!["M2"]);
    assert_eq!(log.records().len(), 1);
    assert_eq!(stored_texts(&backend, "main"), vec!["M1"]);
}

#[tokio::test]
async fn test_requeue_to_dead_letter_queue_then_error_callback() {
    let backend = InMemoryBackend::new();
    let log = RecordingFailureLog::default();
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&alerts);

    let registry = registry_with(vec![
        (
            "orders",
            named("orders", "memory")
                .with_callback("record")
                .with_on_error(vec![
                    ErrorActionEntry::with_argument("requeue", "orders-dead"),
                    ErrorActionEntry::with_argument("callback", "alert"),
                ]),
        ),
        ("dead-letters", named("orders-dead", "memory")),
    ]);
    let queue = memory_engine(registry, &backend, &log)
        .callback("record", RecordingCallback::failing_on(&["broken"]))
        .error_callback(
            "alert",
            error_callback_fn(move |failure, envelope| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock()
                        .unwrap()
                        .push((failure, envelope.origin().to_string()));
                    Ok::<(), HandlerError>(())
                }
            }),
        )
        .build()
        .unwrap();

    queue.send("orders", "broken").await.unwrap();
    queue.send("orders", "fine").await.unwrap();
    queue.consume("orders", &ReceiveOptions::new()).await.unwrap();

    assert_eq!(stored_texts(&backend, "orders-dead"), vec!["broken"]);
    assert_eq!(backend.len("orders"), 0);

    let alerts = alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].1, "orders");
    assert!(log.records().is_empty());
}

#[tokio::test]
async fn test_invalid_pipeline_surfaces_as_configuration_error() {
    let backend = InMemoryBackend::new();
    let log = RecordingFailureLog::default();
    let registry = registry_with(vec![(
        "main",
        named("main", "memory")
            .with_callback("record")
            .with_on_error(vec![
                ErrorActionEntry::bare("log"),
                ErrorActionEntry::bare("retry-forever"),
            ]),
    )]);
    let queue = memory_engine(registry, &backend, &log)
        .callback("record", RecordingCallback::failing_on(&["bad"]))
        .build()
        .unwrap();

    queue.send("main", "bad").await.unwrap();
    let error = queue
        .consume("main", &ReceiveOptions::new())
        .await
        .unwrap_err();

    assert!(error.is_fatal());
    assert!(log.records().is_empty());
}
