//! End-to-end tests: stage artifacts, run analysis code against them, and
//! read back the digest and the result artifact.
//!
//! Tests that need a Python interpreter return early when `python3` is not
//! on the PATH.

use std::time::Duration;

use adf_session::prelude::*;
use serde_json::json;

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn new_session(root: &std::path::Path) -> (SessionManager, SessionHandle, SessionConfig) {
    let config = SessionConfig::default().with_sessions_root(root);
    let manager = SessionManager::from_config(&config).unwrap();
    let session = manager.create_session().unwrap();
    (manager, session, config)
}

const TIMEOUT: Duration = Duration::from_secs(30);

// ── Python workflow ──────────────────────────────────────────────────

#[tokio::test]
async fn linked_service_lookup_round_trip() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, config) = new_session(root.path());

    let staged = session
        .artifacts()
        .stage(
            "datasets",
            &json!([
                {"name": "d1", "linked_service": "ls1"},
                {"name": "d2", "linked_service": "ls2"}
            ]),
        )
        .unwrap();
    assert_eq!(staged.item_count, Some(2));

    let code = "\
datasets = load_json('datasets')
hits = {d['name']: [d['linked_service']] for d in datasets if d['linked_service'] == 'ls1'}
save_result(hits)
print(f\"{len(hits)} dataset matched\")
";
    let outcome = session
        .runner(&config)
        .run_summarized(code, TIMEOUT)
        .await
        .unwrap();

    assert!(outcome.success(), "stderr: {}", outcome.execution.stderr);
    assert!(outcome.digest.contains("1 dataset matched"));
    let reference = outcome.artifact_ref.clone().unwrap();
    assert_eq!(reference, session.dir().join("results.json"));

    let result = session.artifacts().load("results").unwrap();
    assert_eq!(result, json!({"d1": ["ls1"]}));

    let rendered = outcome.render(config.max_result_bytes);
    assert!(rendered.starts_with("[OK] exit 0"));
    assert!(rendered.contains("Result artifact: "));
}

#[tokio::test]
async fn wrong_field_name_surfaces_in_stderr() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, config) = new_session(root.path());
    session
        .artifacts()
        .save("datasets", &json!([{"name": "d1", "linkedService": "ls1"}]))
        .unwrap();

    let outcome = session
        .runner(&config)
        .run_summarized(
            "for d in load_json('datasets'):\n    print(d['linked_service'])",
            TIMEOUT,
        )
        .await
        .unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.execution.exit_code, 1);
    assert!(outcome.execution.stderr.contains("KeyError: 'linked_service'"));
    assert!(outcome.artifact_ref.is_none());
    assert!(outcome.render(30_000).starts_with("[FAILED] exit 1"));
}

#[tokio::test]
async fn load_json_reports_available_artifacts() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, config) = new_session(root.path());
    session.artifacts().save("pipelines", &json!([])).unwrap();

    let result = session
        .runner(&config)
        .run("load_json('datasets')", TIMEOUT)
        .await
        .unwrap();
    assert_ne!(result.exit_code, 0);
    assert!(
        result
            .stderr
            .contains("Artifact not found: datasets. Available: pipelines.json"),
        "stderr: {}",
        result.stderr
    );
}

#[tokio::test]
async fn script_artifacts_are_visible_to_the_store() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, config) = new_session(root.path());

    let result = session
        .runner(&config)
        .run(
            "save_json('summary', {'count': 3, 'names': ['a', 'b', 'c']})\npretty_print(list(range(30)), max_items=2)",
            TIMEOUT,
        )
        .await
        .unwrap();
    assert!(result.success(), "stderr: {}", result.stderr);
    assert!(result.stdout.starts_with("Showing first 2 of 30 items:"));

    let names: Vec<String> = session
        .artifacts()
        .list()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["summary.json"]);
    assert_eq!(
        session.artifacts().describe("summary").unwrap().to_string(),
        "{\n  count: number\n  names: list[3] of string\n}"
    );
}

// ── Tool surface ─────────────────────────────────────────────────────

#[tokio::test]
async fn tool_calls_drive_a_session() {
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, config) = new_session(root.path());
    let config = config.with_interpreter(Interpreter::shell());
    let tools = ToolSet::for_session(&session, &config, None);

    session
        .artifacts()
        .stage("pipelines", &json!([{"name": "p1"}]))
        .unwrap();

    let listing = tools.execute("list_artifacts", "{}").await;
    assert!(listing.contains("pipelines.json"));

    let observation = tools
        .execute(
            "exec_script",
            &json!({"code": "grep -c '\"name\"' pipelines.json"}).to_string(),
        )
        .await;
    assert!(observation.starts_with("[OK] exit 0"), "got {observation}");
    assert!(observation.contains("\n1"));
}

// ── Concurrency ──────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_writers_to_distinct_names() {
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, _config) = new_session(root.path());

    let writes = (0..16).map(|i| {
        let store = session.artifacts();
        tokio::task::spawn_blocking(move || store.save(&format!("part_{i}"), &json!({"i": i})))
    });
    for joined in futures::future::join_all(writes).await {
        joined.unwrap().unwrap();
    }

    let store = session.artifacts();
    assert_eq!(store.list().unwrap().len(), 16);
    for i in 0..16 {
        assert_eq!(store.load(&format!("part_{i}")).unwrap(), json!({"i": i}));
    }
}

#[tokio::test]
async fn concurrent_writers_to_one_name_leave_a_complete_value() {
    let root = tempfile::tempdir().unwrap();
    let (_manager, session, _config) = new_session(root.path());

    let writes = (0..16).map(|i| {
        let store = session.artifacts();
        let payload: Vec<u32> = vec![i; 1000];
        tokio::task::spawn_blocking(move || store.save("shared", &payload))
    });
    for joined in futures::future::join_all(writes).await {
        joined.unwrap().unwrap();
    }

    let value = session.artifacts().load("shared").unwrap();
    let items = value.as_array().unwrap();
    assert_eq!(items.len(), 1000);
    assert!(items.iter().all(|v| v == &items[0]));
    // No temp files left behind.
    assert_eq!(session.artifacts().list().unwrap().len(), 1);
    let leftovers = std::fs::read_dir(session.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
        .count();
    assert_eq!(leftovers, 0);
}
