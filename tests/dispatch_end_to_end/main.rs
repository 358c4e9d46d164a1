//! End-to-end tests: definitions on disk, loaded by the registry, executed
//! through the facade against the in-memory backend.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procdispatch::{
    Args, CommandRegistry, DispatcherConfig, ErrorKind, ExecutionContext, Executor, MemoryBackend,
    Row, Session,
};
use serde_json::json;

const CONFIG: &str = r#"
default_timeout_secs = 10

[registry]
debounce_ms = 50
reload_backoff_ms = 20

[connections]
Main = "memory://main"
"#;

fn write(dir: &Path, file: &str, body: &str) {
    fs::write(dir.join(file), body).unwrap();
}

fn setup(dir: &Path, watch: bool) -> (Executor, MemoryBackend, Arc<CommandRegistry>) {
    let config = DispatcherConfig::from_toml_str(CONFIG).unwrap();
    let registry = Arc::new(CommandRegistry::new(config.registry.clone()));
    registry.load_from_directory(dir, watch);
    let backend = MemoryBackend::new();
    let executor = Executor::from_config(&config, Arc::clone(&registry), Arc::new(backend.clone()));
    (executor, backend, registry)
}

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}

#[tokio::test]
async fn test_directory_definitions_execute() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("orders")).unwrap();
    write(
        &dir.path().join("orders"),
        "list.json",
        r#"{"id":"Orders.List","procedure":"usp_orders","connection":"main",
            "params":[{"name":"@Status","from":"status"}],
            "includes":["lookup.status"]}"#,
    );
    write(
        dir.path(),
        "status.json",
        r#"{"id":"lookup.status","procedure":"usp_status","connection":"MAIN","cache":60}"#,
    );
    write(dir.path(), "broken.json", "{ nope");
    write(dir.path(), "notes.txt", "ignored");

    let (executor, backend, registry) = setup(dir.path(), false);
    assert_eq!(registry.ids(), vec!["lookup.status".to_string(), "orders.list".to_string()]);

    backend.on("usp_orders", |call| {
        let status = serde_json::to_value(call.param("@Status")).unwrap();
        Ok(vec![vec![Row::new().with("Id", json!(1)).with("Status", status)]])
    });
    backend.on_rows("usp_status", vec![vec![Row::new().with("Code", json!("open"))]]);

    let args = Args::new().with("STATUS", json!("open"));
    let result = executor.execute("orders.list", Some(&args)).await;
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.lookup("lookup.status").len(), 1);
    assert_eq!(backend.connections_used()[0], "memory://main");
}

#[tokio::test]
async fn test_transaction_through_session() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "save.json",
        r#"{"id":"orders.save","procedure":"usp_save","connection":"main","strategy":"Transaction",
            "params":[{"name":"@UserId","from":"@@userid@@","type":"int"},
                      {"name":"@Qty","from":"qty","type":"int"}]}"#,
    );
    let (executor, backend, _registry) = setup(dir.path(), false);
    backend.on("usp_save", |call| {
        let ok = matches!(call.param("@Qty"), Some(procdispatch::SqlValue::Int(q)) if *q > 0);
        let code = if ok { 0 } else { 7 };
        Ok(vec![vec![Row::new()
            .with("ErrorCode", json!(code))
            .with("Message", json!(if ok { "saved" } else { "quantity must be positive" }))]])
    });

    let session = Session::new(executor, ExecutionContext::new(5, "ops"));
    let saved = session
        .execute("orders.save", Some(&Args::new().with("qty", json!(3))))
        .await;
    assert!(saved.success);
    assert_eq!(saved.transaction_message.as_deref(), Some("saved"));

    let refused = session
        .execute("orders.save", Some(&Args::new().with("qty", json!(0))))
        .await;
    assert!(refused.has_transaction_error);
    assert_eq!(refused.error_message.as_deref(), Some("quantity must be positive"));
    assert_eq!((backend.commits(), backend.rollbacks()), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hot_reload_invalidates_cached_results() {
    let dir = tempfile::tempdir().unwrap();
    let body = |procedure: &str| {
        format!(
            r#"{{"id":"products.list","procedure":"{}","connection":"main","cache":300}}"#,
            procedure
        )
    };
    write(dir.path(), "products.json", &body("usp_v1"));

    let (executor, backend, registry) = setup(dir.path(), true);
    assert!(registry.is_watching());
    backend.on_rows("usp_v1", vec![vec![Row::new().with("Version", json!(1))]]);
    backend.on_rows("usp_v2", vec![vec![Row::new().with("Version", json!(2))]]);

    assert!(!executor.execute("products.list", None).await.from_cache);
    assert!(executor.execute("products.list", None).await.from_cache);

    write(dir.path(), "products.json", &body("usp_v2"));
    assert!(
        eventually(|| registry
            .try_get("products.list")
            .map(|d| d.procedure == "usp_v2")
            .unwrap_or(false))
        .await
    );

    // The index swap is published just before the old signal fires
    let mut fresh = executor.execute("products.list", None).await;
    for _ in 0..40 {
        if !fresh.from_cache {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
        fresh = executor.execute("products.list", None).await;
    }
    assert!(!fresh.from_cache);
    assert_eq!(fresh.data[0].get("Version"), Some(&json!(2)));

    fs::remove_file(dir.path().join("products.json")).unwrap();
    assert!(eventually(|| !registry.contains("products.list")).await);
    let gone = executor.execute("products.list", None).await;
    assert_eq!(gone.error_kind, Some(ErrorKind::CommandNotFound));

    registry.shutdown();
}
