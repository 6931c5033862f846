//! Deferred consumption at process end through the in-process worker.

mod common;

use common::*;
use message_queue::{ErrorActionEntry, InMemoryBackend, ShutdownActions};

#[tokio::test]
async fn test_flushed_messages_are_consumed_at_shutdown() {
    let backend = InMemoryBackend::new();
    let callback = RecordingCallback::default();
    let registry = registry_with(vec![
        (
            "mail",
            named("mail", "memory")
                .with_buffer("mail-buffer")
                .with_on_shutdown(ShutdownActions::ALL)
                .with_callback("record"),
        ),
        ("buffer", named("mail-buffer", "memory")),
    ]);
    let (queue, worker) = memory_engine(registry, &backend, &RecordingFailureLog::default())
        .callback("record", callback.clone())
        .build_with_worker()
        .unwrap();

    queue.send("mail", "first").await.unwrap();
    queue.send("mail", "second").await.unwrap();
    assert!(
        !queue.dispatcher().is_armed(),
        "buffered sends follow the buffer's policy"
    );

    // Replaying into the real queue uses its own policy
    assert_eq!(queue.flush("mail").await.unwrap(), 2);
    assert!(callback.delivered().is_empty(), "nothing is delivered before shutdown");

    let report = queue.shutdown();
    assert_eq!(report.launched, vec!["mail"]);
    assert!(report.failed.is_empty());

    assert_eq!(worker.await.unwrap(), 1);
    assert_eq!(callback.delivered_texts(), vec!["first", "second"]);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_buffer_policy_launches_the_buffer_queue() {
    let backend = InMemoryBackend::new();
    let callback = RecordingCallback::default();
    let registry = registry_with(vec![
        ("mail", named("mail", "memory").with_buffer("mail-buffer")),
        (
            "buffer",
            named("mail-buffer", "memory")
                .with_on_shutdown(ShutdownActions::CONSUME)
                .with_callback("record"),
        ),
    ]);
    let (queue, worker) = memory_engine(registry, &backend, &RecordingFailureLog::default())
        .callback("record", callback.clone())
        .build_with_worker()
        .unwrap();

    queue.send("mail", "held").await.unwrap();

    let report = queue.shutdown();
    assert_eq!(report.launched, vec!["mail-buffer"]);
    assert_eq!(worker.await.unwrap(), 1);
    assert_eq!(callback.delivered_texts(), vec!["held"]);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_each_queue_is_launched_once() {
    let backend = InMemoryBackend::new();
    let callback = RecordingCallback::default();
    let registry = registry_with(vec![
        (
            "a",
            named("a", "memory")
                .with_on_shutdown(ShutdownActions::ALL)
                .with_callback("record"),
        ),
        (
            "b",
            named("b", "memory")
                .with_on_shutdown(ShutdownActions::ALL)
                .with_callback("record"),
        ),
        ("c", named("c", "memory")),
    ]);
    let (queue, worker) = memory_engine(registry, &backend, &RecordingFailureLog::default())
        .callback("record", callback.clone())
        .build_with_worker()
        .unwrap();

    for target in ["a", "b", "a", "c", "b"] {
        queue.send(target, target).await.unwrap();
    }

    let report = queue.shutdown();
    assert_eq!(report.launched, vec!["a", "b"]);
    assert_eq!(worker.await.unwrap(), 2);

    assert_eq!(callback.delivered().len(), 4);
    assert_eq!(backend.len("c"), 1);
}

#[tokio::test]
async fn test_requeue_during_deferred_pass_does_not_rearm() {
    let backend = InMemoryBackend::new();
    let log = RecordingFailureLog::default();
    let registry = registry_with(vec![(
        "jobs",
        named("jobs", "memory")
            .with_on_shutdown(ShutdownActions::ALL)
            .with_callback("record")
            .with_on_error(vec![
                ErrorActionEntry::bare("log"),
                ErrorActionEntry::bare("requeue"),
            ]),
    )]);
    let (queue, worker) = memory_engine(registry, &backend, &log)
        .callback("record", RecordingCallback::failing_on(&["poison"]))
        .build_with_worker()
        .unwrap();

    queue.send("jobs", "poison").await.unwrap();
    queue.shutdown();
    assert_eq!(worker.await.unwrap(), 1);

    // One failed attempt, the message waits for the next run
    assert_eq!(log.records().len(), 1);
    assert_eq!(stored_texts(&backend, "jobs"), vec!["poison"]);
    assert!(!queue.dispatcher().is_armed());
}
