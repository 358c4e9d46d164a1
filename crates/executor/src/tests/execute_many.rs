//! Tests for the execute_many batch execution method.

use serde_json::json;

use super::{fixture, row};
use crate::{Args, ErrorKind};

#[tokio::test]
async fn test_execute_many_empty() {
    let f = fixture(&[]);
    assert!(f.executor.execute_many(None, vec![]).await.is_empty());
}

#[tokio::test]
async fn test_execute_many_preserves_order_and_isolates_failures() {
    let f = fixture(&[
        r#"{"id":"echo","procedure":"usp_echo","connection":"main","params":[{"name":"@N","type":"int"}]}"#,
    ]);
    f.backend.on("usp_echo", |call| {
        let n = match call.param("@N") {
            Some(crate::SqlValue::Int(n)) => *n,
            _ => -1,
        };
        Ok(vec![vec![row(&[("N", json!(n))])]])
    });

    let calls = vec![
        ("echo".to_string(), Some(Args::new().with("n", json!(1)))),
        ("nope".to_string(), None),
        ("echo".to_string(), Some(Args::new().with("n", json!(3)))),
    ];
    let results = f.executor.execute_many(None, calls).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].data[0].get("N"), Some(&json!(1)));
    assert_eq!(results[1].error_kind, Some(ErrorKind::CommandNotFound));
    assert_eq!(results[2].data[0].get("N"), Some(&json!(3)));
}
