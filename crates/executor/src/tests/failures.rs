//! Tests for failures that never reach the backend or that the backend
//! raises. None of them may escape as a panic or `Err`.

use std::time::{Duration, Instant};

use serde_json::json;

use super::{fixture, status};
use crate::{Error, ErrorKind};

#[tokio::test]
async fn test_unknown_command_lists_known_ids() {
    let f = fixture(&[
        r#"{"id":"b.one","procedure":"p","connection":"main"}"#,
        r#"{"id":"a.two","procedure":"p","connection":"main"}"#,
    ]);

    let result = f.executor.execute("nope", None).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::CommandNotFound));
    let message = result.error_message.unwrap();
    assert!(message.contains("'nope' not found"));
    assert!(message.contains("a.two, b.one"));
    assert_eq!(result.command_id, "nope");
    assert!(!result.trace_id.is_empty());
}

#[tokio::test]
async fn test_unrecognized_strategy_lists_valid_ones() {
    let f = fixture(&[r#"{"id":"x","procedure":"p","connection":"main","strategy":"Bulk"}"#]);
    f.backend.on_rows("p", vec![]);

    let result = f.executor.execute("x", None).await;
    assert_eq!(result.error_kind, Some(ErrorKind::UnrecognizedStrategy));
    let message = result.error_message.unwrap();
    assert!(message.contains("Bulk"));
    assert!(message.contains("MultiTransaction"));
    assert_eq!(f.backend.call_count(), 0);
}

#[tokio::test]
async fn test_unconfigured_connection_never_calls_backend() {
    let f = fixture(&[r#"{"id":"x","procedure":"p","connection":"audit"}"#]);
    f.backend.on_rows("p", vec![]);

    let result = f.executor.execute("x", None).await;
    assert_eq!(result.error_kind, Some(ErrorKind::ConnectionNotConfigured));
    assert!(result.error_message.unwrap().contains("main"));
    assert_eq!(f.backend.call_count(), 0);
}

#[tokio::test]
async fn test_backend_error_message_is_embedded() {
    let f = fixture(&[r#"{"id":"x","procedure":"p","connection":"main"}"#]);
    f.backend
        .on("p", |_| Err(Error::backend("Invalid column name 'Foo'")));

    let result = f.executor.execute("x", None).await;
    assert_eq!(result.error_kind, Some(ErrorKind::Unhandled));
    assert!(result.error_message.unwrap().contains("Invalid column name 'Foo'"));
}

#[tokio::test]
async fn test_missing_procedure_is_failed_result() {
    let f = fixture(&[r#"{"id":"x","procedure":"usp_gone","connection":"main"}"#]);
    let result = f.executor.execute("x", None).await;
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("usp_gone"));
}

#[tokio::test]
async fn test_panicking_procedure_is_contained() {
    let f = fixture(&[r#"{"id":"x","procedure":"p","connection":"main"}"#]);
    f.backend.on("p", |_| panic!("driver bug"));

    let result = f.executor.execute("x", None).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Unhandled));
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let f = fixture(&[r#"{"id":"slow","procedure":"p","connection":"main","timeout":1}"#]);
    f.backend.on_rows("p", vec![]);
    f.backend.with_latency("p", Duration::from_secs(5));

    let started = Instant::now();
    let result = f.executor.execute("slow", None).await;
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert!(result.error_message.unwrap().contains("timed out after 1s"));
}

#[tokio::test]
async fn test_timed_out_transaction_is_rolled_back() {
    let f = fixture(&[
        r#"{"id":"slow","procedure":"p","connection":"main","strategy":"Transaction","timeout":1}"#,
    ]);
    f.backend.on_rows("p", vec![vec![status(json!(0), "ok")]]);
    f.backend.with_latency("p", Duration::from_secs(5));

    let result = f.executor.execute("slow", None).await;
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));

    for _ in 0..40 {
        if f.backend.rollbacks() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!((f.backend.commits(), f.backend.rollbacks()), (0, 1));
    assert!(f.backend.committed_calls().is_empty());
}
