//! End-to-end tests for the dispatcher, worker and clipboard.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filedeck_core::{CollisionPolicy, ErrorKind, Task, TaskState, WorkerConfig};
use filedeck_tasks::{
    start_paste, CancelState, Clipboard, ClipboardMode, SubmitError, TabId, TaskDispatcher,
    TaskEvent, TaskOutput,
};
use tempfile::TempDir;

const TICK: Duration = Duration::from_millis(5);

fn dispatcher() -> TaskDispatcher {
    TaskDispatcher::new(WorkerConfig::default())
}

fn many_files(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        fs::write(dir.join(format!("file-{i:04}.bin")), vec![b'x'; 4096]).unwrap();
    }
}

fn terminal(events: &[TaskEvent]) -> &TaskEvent {
    let last = events.last().expect("no events");
    assert!(last.is_terminal(), "stream did not end with a terminal event");
    last
}

fn assert_well_formed(events: &[TaskEvent]) {
    let counts: Vec<u64> = events.iter().map(TaskEvent::processed_count).collect();
    assert!(
        counts.windows(2).all(|w| w[0] <= w[1]),
        "processed counts went backwards: {counts:?}"
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    terminal(events);
}

#[tokio::test]
async fn test_second_submit_is_busy() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    many_files(&src, 500);

    let dispatcher = dispatcher();
    let mut handle = dispatcher
        .submit(Task::bulk_copy([src.clone()], temp.path().join("dest")))
        .unwrap();
    assert!(dispatcher.is_busy());

    let err = dispatcher
        .submit(Task::search(temp.path(), "*.bin"))
        .unwrap_err();
    assert!(matches!(err, SubmitError::Busy));

    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    assert!(!dispatcher.is_busy());
    assert_eq!(handle.state(), TaskState::Completed);

    let mut next = dispatcher.submit(Task::search(temp.path(), "*.bin")).unwrap();
    assert_ne!(next.id(), handle.id());
    next.wait_terminal(TICK).await;
}

#[tokio::test]
async fn test_copy_events_are_monotonic() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    many_files(&src.join("nested"), 40);
    fs::write(src.join("top.txt"), "top").unwrap();

    let dispatcher = dispatcher();
    let dest = temp.path().join("dest");
    let mut handle = dispatcher.submit(Task::bulk_copy([src], &dest)).unwrap();

    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    match terminal(&events) {
        TaskEvent::Completed {
            snapshot,
            output: TaskOutput::Transfer(summary),
        } => {
            assert_eq!(summary.succeeded, 41);
            assert_eq!(snapshot.total_estimate, Some(41));
            assert_eq!(snapshot.processed_count, 41);
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
    assert_eq!(fs::read_to_string(dest.join("src/top.txt")).unwrap(), "top");
    assert!(handle.is_finished());
    assert!(handle.poll().is_empty());
}

#[tokio::test]
async fn test_cancel_running_copy() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    many_files(&src, 500);
    let dest = temp.path().join("dest");

    let dispatcher = dispatcher();
    let mut handle = dispatcher.submit(Task::bulk_copy([src.clone()], &dest)).unwrap();
    assert!(dispatcher.cancel(&handle));
    assert!(!dispatcher.cancel(&handle));

    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    let last = terminal(&events);
    assert!(matches!(last, TaskEvent::Cancelled { .. }), "got {last:?}");
    assert!(last.processed_count() < 500);
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert_eq!(handle.cancel_state(), CancelState::Acknowledged);

    // Whatever was copied before the stop is complete.
    if let Ok(entries) = fs::read_dir(dest.join("src")) {
        for entry in entries {
            assert_eq!(fs::metadata(entry.unwrap().path()).unwrap().len(), 4096);
        }
    }
}

#[tokio::test]
async fn test_zip_round_trip() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    fs::create_dir_all(project.join("src/empty")).unwrap();
    fs::write(project.join("README.md"), "# readme").unwrap();
    fs::write(project.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(temp.path().join("notes.txt"), vec![7u8; 100_000]).unwrap();

    let archive = temp.path().join("out/backup.zip");
    let dispatcher = dispatcher();

    let mut handle = dispatcher
        .submit(Task::zip_create(
            [project.clone(), temp.path().join("notes.txt")],
            &archive,
        ))
        .unwrap();
    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    assert!(matches!(terminal(&events), TaskEvent::Completed { .. }));

    let dest = temp.path().join("restored");
    let mut handle = dispatcher.submit(Task::zip_extract(&archive, &dest)).unwrap();
    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    match terminal(&events) {
        TaskEvent::Completed {
            output: TaskOutput::Transfer(summary),
            ..
        } => assert!(summary.is_success()),
        other => panic!("unexpected terminal event {other:?}"),
    }

    assert_eq!(
        fs::read_to_string(dest.join("project/README.md")).unwrap(),
        "# readme"
    );
    assert_eq!(
        fs::read_to_string(dest.join("project/src/main.rs")).unwrap(),
        "fn main() {}"
    );
    assert!(dest.join("project/src/empty").is_dir());
    assert_eq!(fs::read(dest.join("notes.txt")).unwrap(), vec![7u8; 100_000]);
}

#[tokio::test]
async fn test_search_fixture() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "").unwrap();
    fs::write(temp.path().join("b.TXT"), "").unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::write(temp.path().join("sub/a.txt"), "").unwrap();

    let dispatcher = dispatcher();
    let mut handle = dispatcher.submit(Task::search(temp.path(), "a.*")).unwrap();
    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    match terminal(&events) {
        TaskEvent::Completed {
            output: TaskOutput::Search(result),
            ..
        } => {
            assert_eq!(
                result.paths,
                vec![temp.path().join("a.txt"), temp.path().join("sub/a.txt")]
            );
            assert!(!result.truncated);
        }
        other => panic!("unexpected terminal event {other:?}"),
    }

    let limited = TaskDispatcher::new(
        WorkerConfig::builder()
            .max_search_results(1usize)
            .build()
            .unwrap(),
    );
    let mut handle = limited.submit(Task::search(temp.path(), "a.*")).unwrap();
    let events = handle.wait_terminal(TICK).await;
    match terminal(&events) {
        TaskEvent::Completed {
            output: TaskOutput::Search(result),
            ..
        } => {
            assert_eq!(result.paths, vec![temp.path().join("a.txt")]);
            assert!(result.truncated);
            assert_eq!(result.entries_visited, 1);
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
}

#[tokio::test]
async fn test_copy_into_own_descendant_is_rejected() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    many_files(&src, 3);
    let inside = src.join("backup");

    let dispatcher = dispatcher();
    let err = dispatcher
        .submit(Task::bulk_copy([src.clone()], &inside))
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::DestinationInsideSource));
    assert!(!dispatcher.is_busy());
    assert!(!inside.exists());
    assert_eq!(fs::read_dir(&src).unwrap().count(), 3);
}

#[tokio::test]
async fn test_zip_slip_rejected_at_submit() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("evil.zip");
    let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("../../escape.txt", options).unwrap();
    writer.write_all(b"gotcha").unwrap();
    writer.finish().unwrap();

    let dest = temp.path().join("dest");
    let err = dispatcher()
        .submit(Task::zip_extract(&archive, &dest))
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::PathTraversalRejected));
    assert!(!dest.exists());
    assert!(!temp.path().join("escape.txt").exists());
}

fn archive_with_entry(path: &Path, name: &str) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"payload").unwrap();
    writer.finish().unwrap();
}

#[tokio::test]
async fn test_entry_onto_destination_rejected_at_submit() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("dest");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("precious.txt"), "keep me").unwrap();

    let overwrite = TaskDispatcher::new(
        WorkerConfig::builder()
            .collision_policy(CollisionPolicy::Overwrite)
            .build()
            .unwrap(),
    );
    for (file, entry) in [("dot.zip", "."), ("up.zip", "sub/..")] {
        let archive = temp.path().join(file);
        archive_with_entry(&archive, entry);

        let auto_rename = dispatcher();
        for submitter in [&overwrite, &auto_rename] {
            let err = submitter
                .submit(Task::zip_extract(&archive, &dest))
                .unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::PathTraversalRejected));
        }
    }

    assert_eq!(fs::read_to_string(dest.join("precious.txt")).unwrap(), "keep me");
    assert!(!temp.path().join("dest (1)").exists());
}

#[tokio::test]
async fn test_zip_create_keeps_existing_archive() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("notes.txt"), "notes").unwrap();
    let out = temp.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let archive = out.join("report.zip");
    fs::write(&archive, "important user data").unwrap();

    let dispatcher = dispatcher();
    let mut handle = dispatcher
        .submit(Task::zip_create([temp.path().join("notes.txt")], &archive))
        .unwrap();
    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);

    let written = out.join("report (1).zip");
    match terminal(&events) {
        TaskEvent::Completed {
            output: TaskOutput::Transfer(summary),
            ..
        } => assert_eq!(summary.renamed, vec![(archive.clone(), written.clone())]),
        other => panic!("unexpected terminal event {other:?}"),
    }
    assert_eq!(fs::read_to_string(&archive).unwrap(), "important user data");
    assert_eq!(zip::ZipArchive::new(File::open(&written).unwrap()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_running_search() {
    let temp = TempDir::new().unwrap();
    for i in 0..200 {
        many_files(&temp.path().join(format!("dir-{i:03}")), 3);
    }

    let dispatcher = TaskDispatcher::new(
        WorkerConfig::builder()
            .progress_interval(10usize)
            .build()
            .unwrap(),
    );
    let mut handle = dispatcher.submit(Task::search(temp.path(), "*.bin")).unwrap();
    assert!(handle.cancel());

    let events = handle.wait_terminal(TICK).await;
    assert_well_formed(&events);
    assert!(
        matches!(terminal(&events), TaskEvent::Cancelled { .. }),
        "got {:?}",
        terminal(&events)
    );
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert_eq!(handle.cancel_state(), CancelState::Acknowledged);
    assert!(!dispatcher.is_busy());
}

#[tokio::test]
async fn test_auto_rename_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("report.pdf");
    fs::write(&src, "v2").unwrap();
    let dest = temp.path().join("dest");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("report.pdf"), "v1").unwrap();

    let dispatcher = dispatcher();
    for expected in ["report (1).pdf", "report (2).pdf"] {
        let mut handle = dispatcher.submit(Task::bulk_copy([src.clone()], &dest)).unwrap();
        let events = handle.wait_terminal(TICK).await;
        match terminal(&events) {
            TaskEvent::Completed {
                output: TaskOutput::Transfer(summary),
                ..
            } => assert_eq!(summary.renamed[0].1, dest.join(expected)),
            other => panic!("unexpected terminal event {other:?}"),
        }
    }
    assert_eq!(fs::read_to_string(dest.join("report.pdf")).unwrap(), "v1");
}

#[tokio::test]
async fn test_cut_paste_clears_only_after_completion() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.txt");
    let b = temp.path().join("b.txt");
    fs::write(&a, "a").unwrap();
    fs::write(&b, "b").unwrap();

    let clipboard = Clipboard::new();
    clipboard.set([a.clone(), b.clone()], ClipboardMode::Cut, TabId(1));
    let dispatcher = dispatcher();

    // A destination that is a regular file fails the whole move.
    let blocker = temp.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let (mut handle, pending) = start_paste(&dispatcher, &clipboard, &blocker).unwrap();
    let events = handle.wait_terminal(TICK).await;
    match terminal(&events) {
        TaskEvent::Failed { failure, .. } => {
            assert_eq!(failure.kind, ErrorKind::DestinationCollision);
            assert_eq!(failure.path.as_deref(), Some(blocker.as_path()));
            assert_eq!(failure.completed, 0);
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
    assert!(!pending.settle_all(&clipboard, &events));
    assert_eq!(clipboard.get().unwrap().len(), 2);

    let dest = temp.path().join("moved");
    let (mut handle, pending) = start_paste(&dispatcher, &clipboard, &dest).unwrap();
    let events = handle.wait_terminal(TICK).await;
    assert!(matches!(terminal(&events), TaskEvent::Completed { .. }));
    assert!(pending.settle_all(&clipboard, &events));
    assert!(clipboard.is_empty());
    assert!(dest.join("a.txt").exists());
    assert!(!a.exists());
}

#[tokio::test]
async fn test_paste_keeps_newer_clipboard() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.txt");
    fs::write(&a, "a").unwrap();

    let clipboard = Clipboard::new();
    clipboard.set([a.clone()], ClipboardMode::Cut, TabId(1));
    let dispatcher = dispatcher();
    let (mut handle, pending) =
        start_paste(&dispatcher, &clipboard, &temp.path().join("dest")).unwrap();

    // Another tab cuts something else while the paste runs.
    clipboard.set([PathBuf::from("/elsewhere")], ClipboardMode::Cut, TabId(2));

    let events = handle.wait_terminal(TICK).await;
    assert!(matches!(terminal(&events), TaskEvent::Completed { .. }));
    assert!(!pending.settle_all(&clipboard, &events));
    assert_eq!(clipboard.get().unwrap().source_tab, TabId(2));
}

#[tokio::test]
async fn test_copy_paste_never_clears() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.txt");
    fs::write(&a, "a").unwrap();

    let clipboard = Clipboard::new();
    clipboard.set([a.clone()], ClipboardMode::Copy, TabId(1));
    let dispatcher = dispatcher();
    let (mut handle, pending) =
        start_paste(&dispatcher, &clipboard, &temp.path().join("dest")).unwrap();

    let events = handle.wait_terminal(TICK).await;
    assert!(!pending.settle_all(&clipboard, &events));
    assert!(!clipboard.is_empty());
    assert!(a.exists());
}

#[tokio::test]
async fn test_empty_clipboard_paste() {
    let temp = TempDir::new().unwrap();
    let result = start_paste(&dispatcher(), &Clipboard::new(), temp.path());
    assert!(matches!(result, Err(filedeck_tasks::PasteError::Empty)));
}

#[tokio::test]
async fn test_shutdown_refuses_new_tasks() {
    let temp = TempDir::new().unwrap();
    let dispatcher = dispatcher();
    dispatcher.shutdown();

    let err = dispatcher.submit(Task::search(temp.path(), "*")).unwrap_err();
    assert!(matches!(err, SubmitError::ShutDown));
}
