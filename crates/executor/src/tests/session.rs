//! Tests for caller-scoped sessions.

use serde_json::json;

use super::fixture;
use crate::{ExecutionContext, Session, SqlValue};

const WHOAMI: &str = r#"{
    "id": "whoami",
    "procedure": "usp_whoami",
    "connection": "main",
    "params": [
        {"name": "@UserId", "from": "@@userid@@", "type": "int"},
        {"name": "@Team", "from": "@@team@@", "optional": true}
    ]
}"#;

#[tokio::test]
async fn test_session_supplies_context() {
    let f = fixture(&[WHOAMI]);
    f.backend.on_rows("usp_whoami", vec![]);

    let mut session = Session::new(f.executor.clone(), ExecutionContext::new(7, "kim"));
    session.set_token("team", json!("core"));
    let result = session.execute("whoami", None).await;
    assert!(result.success, "{:?}", result.error_message);

    let call = &f.backend.calls()[0];
    assert_eq!(call.param("@UserId"), Some(&SqlValue::Int(7)));
    assert_eq!(call.param("@Team"), Some(&SqlValue::String("core".into())));
    assert_eq!(session.context().user_name, "kim");
}

#[tokio::test]
async fn test_session_batch_uses_context() {
    let f = fixture(&[WHOAMI]);
    f.backend.on_rows("usp_whoami", vec![]);
    let mut session = Session::new(f.executor.clone(), ExecutionContext::new(7, "kim"));
    session.set_token("team", json!("core"));

    let results = session
        .execute_many(vec![("whoami".into(), None), ("whoami".into(), None)])
        .await;
    assert!(results.iter().all(|r| r.success));
    assert_eq!(f.backend.call_count(), 2);
}
