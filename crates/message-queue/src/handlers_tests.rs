//! Tests for handler adapters and the handler registry.

use super::*;
use crate::config::QueueSelector;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn config() -> InterfaceConfig {
    InterfaceConfig::new(QueueSelector::name("main"), "memory")
}

#[tokio::test]
async fn test_task_fn_receives_arguments() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let task = task_fn(move |args, _envelope| {
        let counter = Arc::clone(&counter);
        async move {
            let n = args.first().and_then(Value::as_u64).unwrap_or(0);
            counter.fetch_add(n as usize, Ordering::SeqCst);
            Ok(())
        }
    });

    task.execute(&[json!(3)], &Envelope::new("x"), &config())
        .await
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_callback_fn_propagates_errors() {
    let callback = callback_fn(|_envelope| async { Err::<(), HandlerError>("boom".into()) });

    let error = callback
        .deliver(&Envelope::new("x"), &config())
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "boom");
}

#[tokio::test]
async fn test_error_callback_fn_sees_rendered_failure() {
    let messages = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let callback = error_callback_fn(move |failure, envelope| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push((failure, envelope.origin().to_string()));
            Ok(())
        }
    });

    let failure = DeliveryFailure::UnknownTask {
        task: "missing".to_string(),
    };
    callback.handle(&failure, &Envelope::new("x")).await.unwrap();

    let recorded = messages.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].0.contains("missing"));
    assert_eq!(recorded[0].1, "-");
}

#[test]
fn test_registry_lookup_by_name() {
    let mut handlers = Handlers::new();
    handlers
        .register_task("count", Arc::new(task_fn(|_, _| async { Ok(()) })))
        .register_callback("audit", Arc::new(callback_fn(|_| async { Ok(()) })))
        .register_error_callback("alert", Arc::new(error_callback_fn(|_, _| async { Ok(()) })));

    assert!(handlers.task("count").is_some());
    assert!(handlers.task("audit").is_none());
    assert!(handlers.callback("audit").is_some());
    assert!(handlers.error_callback("alert").is_some());

    let debug = format!("{:?}", handlers);
    assert!(debug.contains("count"));
    assert!(debug.contains("alert"));
}

#[test]
fn test_tracing_failure_log_does_not_panic() {
    let failure = DeliveryFailure::NoDeliveryStrategy {
        queue: "main".to_string(),
    };
    TracingFailureLog.record(&failure, &Envelope::new("x"), "default");
}
