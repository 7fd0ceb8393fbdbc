// Install state markers as seen through the provisioning protocol


use hookenv::language::{HealthStatus, SetupRequest};
use hookenv::storage::{StateStore, STATE_FILE_V1};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use test_utils::{RecordingRunner, Workspace};

#[test]
fn test_dependency_set_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = StateStore::new();
    store
        .write_state(temp_dir.path(), &["a".to_string(), "b".to_string()])
        .unwrap();

    let state = store.read_state(temp_dir.path()).unwrap().unwrap();
    let expected: BTreeSet<&str> = ["b", "a"].into_iter().collect();
    assert_eq!(state.dependency_set(), expected);
}

#[test]
fn test_setup_records_requested_dependencies() {
    let workspace = Workspace::new();
    let runner = Arc::new(RecordingRunner::with_tools(&workspace.tools, &["cargo", "rustc"]));
    let provisioner = workspace.provisioner(&runner);
    let request = SetupRequest::new()
        .with_repo_path(&workspace.repo)
        .with_dependencies(["ripgrep", "fd-find"]);

    let path = provisioner.setup_environment("rust", &request).unwrap();
    let state = StateStore::new().read_state(&path).unwrap().unwrap();
    assert_eq!(state.additional_dependencies, vec!["ripgrep", "fd-find"]);
}

#[test]
fn test_corrupt_record_breaks_drift_checked_language() {
    let workspace = Workspace::new();
    let runner = Arc::new(
        RecordingRunner::with_tools(&workspace.tools, &["python3"]).respond_with(|invocation| {
            let args = invocation.args_lossy();
            if args.len() >= 3 && args[0] == "-m" && args[1] == "venv" {
                let env = std::path::PathBuf::from(&args[2]);
                fs::create_dir_all(env.join("bin")).unwrap();
                fs::write(env.join("bin").join("python"), b"").unwrap();
            }
            None
        }),
    );
    let provisioner = workspace.provisioner(&runner);
    let request = SetupRequest::new().with_repo_path(&workspace.repo);

    let path = provisioner.setup_environment("python", &request).unwrap();
    fs::write(path.join(STATE_FILE_V1), "{not json").unwrap();

    let (_, report) = provisioner.status("python", &request).unwrap();
    assert_eq!(report.status, HealthStatus::Broken);

    provisioner.setup_environment("python", &request).unwrap();
    assert!(StateStore::new().read_state(&path).unwrap().is_some());
}

#[test]
fn test_corrupt_record_ignored_without_drift_check() {
    let workspace = Workspace::new();
    let runner = Arc::new(RecordingRunner::with_tools(&workspace.tools, &["cargo", "rustc"]));
    let provisioner = workspace.provisioner(&runner);
    let request = SetupRequest::new().with_repo_path(&workspace.repo);

    let path = provisioner.setup_environment("rust", &request).unwrap();
    fs::write(path.join(STATE_FILE_V1), "{not json").unwrap();

    let (_, report) = provisioner.status("rust", &request).unwrap();
    assert_eq!(report.status, HealthStatus::Healthy);
}
