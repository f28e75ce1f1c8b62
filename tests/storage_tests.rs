mod common;

use common::*;
use gmbridge::GmValue;
use gmbridge::host::storage::namespace_path;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_values_persist_across_hosts() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let script = create_test_script("Persisted", ALL_GRANTS);

    {
        let host = create_test_host(persistent_store(temp_dir.path())).await;
        let gm = host.connect(&script).await;
        gm.set_value("theme", "dark").await.unwrap();
        gm.set_value("count", 3).await.unwrap();
        gm.set_value("gone", true).await.unwrap();
        gm.delete_value("gone").await.unwrap();
    }

    let file = namespace_path(temp_dir.path(), "tests/Persisted");
    assert!(file.exists());

    // A fresh host loads the namespace from disk
    let host = create_test_host(persistent_store(temp_dir.path())).await;
    let gm = host.connect(&script).await;
    assert_eq!(gm.get_value("theme").await.unwrap(), GmValue::Present(json!("dark")));
    assert_eq!(gm.list_values().await.unwrap(), vec!["count", "theme"]);
    assert!(gm.get_value("gone").await.unwrap().is_absent());
}

#[tokio::test]
async fn test_namespaces_are_separate_files() {
    init_logging();
    let temp_dir = tempfile::tempdir().unwrap();
    let host = create_test_host(persistent_store(temp_dir.path())).await;

    let first = host.connect(&create_test_script("First", ALL_GRANTS)).await;
    let second = host.connect(&create_test_script("Second", ALL_GRANTS)).await;
    first.set_value("k", 1).await.unwrap();
    second.set_value("k", 2).await.unwrap();

    assert!(namespace_path(temp_dir.path(), "tests/First").exists());
    assert!(namespace_path(temp_dir.path(), "tests/Second").exists());

    let snapshot = host.host.store().snapshot("tests/First").await.unwrap();
    assert_eq!(snapshot.get("k"), Some(&json!(1)));
}
