//! Send buffering across backends.

mod common;

use common::*;
use message_queue::{
    Body, FileSystemBackend, InMemoryBackend, MessageQueue, QueueName, ReceiveOptions,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_flush_moves_buffered_messages_to_the_real_queue() {
    let backend = InMemoryBackend::new();
    let registry = registry_with(vec![
        ("events", named("events", "memory").with_buffer("events-buffer")),
        ("buffer", named("events-buffer", "memory")),
    ]);
    let queue = memory_engine(registry, &backend, &RecordingFailureLog::default())
        .build()
        .unwrap();

    for body in ["one", "two", "three"] {
        queue.send("events", body).await.unwrap();
    }
    assert_eq!(backend.len("events-buffer"), 3);
    assert_eq!(backend.len("events"), 0);

    assert_eq!(queue.flush("events").await.unwrap(), 3);

    assert_eq!(backend.len("events-buffer"), 0);
    let mut texts = stored_texts(&backend, "events");
    texts.sort();
    assert_eq!(texts, vec!["one", "three", "two"]);
}

#[tokio::test]
async fn test_durable_buffer_in_front_of_memory_queue() {
    let dir = TempDir::new().unwrap();
    let files = FileSystemBackend::new(dir.path()).await.unwrap();
    let memory = InMemoryBackend::new();

    let registry = registry_with(vec![
        ("events", named("events", "memory").with_buffer("events-spool")),
        ("spool", named("events-spool", "files")),
    ]);
    let queue = MessageQueue::builder()
        .registry(registry)
        .backend("memory", Arc::new(memory.clone()))
        .backend("files", Arc::new(files))
        .build()
        .unwrap();

    queue.send("events", "a").await.unwrap();
    queue.send("events", "b").await.unwrap();

    let spool = FileSystemBackend::new(dir.path()).await.unwrap();
    assert_eq!(spool.len(&QueueName::new("events-spool").unwrap()).await.unwrap(), 2);
    assert!(memory.is_empty());

    assert_eq!(queue.flush("events").await.unwrap(), 2);
    assert_eq!(spool.len(&QueueName::new("events-spool").unwrap()).await.unwrap(), 0);

    let messages = queue
        .get_messages(Some("events"), &ReceiveOptions::new())
        .await
        .unwrap();
    let bodies: Vec<Body> = messages.into_iter().map(|m| m.body).collect();
    assert_eq!(bodies, vec![Body::from("a"), Body::from("b")]);
}
