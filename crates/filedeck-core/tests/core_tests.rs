use std::path::{Path, PathBuf};

use filedeck_core::{
    ArchiveCompression, CollisionPolicy, ErrorKind, OpsError, Task, TaskId, TaskKind, TaskState,
    WorkerConfig,
};

#[test]
fn test_task_id_operations() {
    let id1 = TaskId::new(7);
    let id2 = TaskId::new(7);

    assert_eq!(id1, id2);
    assert_eq!(id1.0, 7);
    assert_eq!(id1.to_string(), "#7");
    assert!(TaskId::new(1) < TaskId::new(2));
}

#[test]
fn test_task_kinds_and_accessors() {
    let search = Task::search("/home/user", "*.txt");
    assert_eq!(search.kind(), TaskKind::Search);
    assert_eq!(search.inputs(), vec![Path::new("/home/user")]);
    assert_eq!(search.destination(), None);
    assert_eq!(search.pattern(), Some("*.txt"));

    let zip = Task::zip_create(vec![PathBuf::from("/data/docs")], "/data/docs.zip");
    assert_eq!(zip.kind(), TaskKind::ZipCreate);
    assert_eq!(zip.destination(), Some(Path::new("/data/docs.zip")));
    assert_eq!(zip.pattern(), None);

    let unzip = Task::zip_extract("/data/docs.zip", "/data/out");
    assert_eq!(unzip.kind(), TaskKind::ZipExtract);
    assert_eq!(unzip.inputs(), vec![Path::new("/data/docs.zip")]);
}

#[test]
fn test_self_containment_guard_kinds() {
    assert!(TaskKind::ZipCreate.guards_self_containment());
    assert!(TaskKind::BulkCopy.guards_self_containment());
    assert!(TaskKind::BulkMove.guards_self_containment());
    assert!(!TaskKind::ZipExtract.guards_self_containment());
    assert!(!TaskKind::Search.guards_self_containment());
}

#[test]
fn test_task_deserialization_dedups_inputs() {
    let task: Task = toml::from_str(
        r#"
        [BulkCopy]
        inputs = ["/a", "/b", "/a"]
        destination = "/d"
        "#,
    )
    .unwrap();

    assert_eq!(task.kind(), TaskKind::BulkCopy);
    assert_eq!(task.inputs(), vec![Path::new("/a"), Path::new("/b")]);
}

#[test]
fn test_task_state_display() {
    assert_eq!(TaskState::Cancelling.to_string(), "Cancelling");
    assert_eq!(TaskState::Failed.to_string(), "Failed");
}

#[test]
fn test_error_taxonomy() {
    let inside = OpsError::DestinationInsideSource {
        input: PathBuf::from("/src"),
        destination: PathBuf::from("/src/sub"),
    };
    assert_eq!(inside.kind(), ErrorKind::DestinationInsideSource);
    assert_eq!(inside.path(), Some(Path::new("/src/sub")));
    assert!(!inside.is_recoverable());

    let traversal = OpsError::PathTraversal {
        archive: PathBuf::from("/a.zip"),
        entry: "../evil".to_string(),
    };
    assert_eq!(traversal.kind(), ErrorKind::PathTraversalRejected);
    assert!(traversal.to_string().contains("../evil"));

    assert_eq!(OpsError::Cancelled.kind(), ErrorKind::Cancelled);
    assert_eq!(OpsError::invalid("x").kind(), ErrorKind::InvalidTask);
}

#[test]
fn test_worker_config_from_toml() {
    let config: WorkerConfig = toml::from_str(
        r#"
        max_search_results = 100
        collision_policy = "overwrite"
        compression = "stored"
        "#,
    )
    .unwrap();

    assert_eq!(config.max_search_results, 100);
    assert_eq!(config.progress_interval, 50);
    assert_eq!(config.collision_policy, CollisionPolicy::Overwrite);
    assert_eq!(config.compression, ArchiveCompression::Stored);
}
