use als_recovery::config::ALP_MAGIC;
use als_recovery::scanner::parallel::orchestrate;
use als_recovery::types::EventSink;
use als_recovery::{
    Category, ParallelScanner, RecoveryConfig, RecoveryEvent, RecoveryPipeline, SignatureConfig, WorkerPool,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

fn keywords(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

/// 8 KiB file with the Live set marker after an XML prolog
fn als_bytes() -> Vec<u8> {
    let mut data = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Ableton Live Set MajorVersion=\"5\">".to_vec();
    data.resize(8 * 1024, b' ');
    data
}

fn zip_bytes() -> Vec<u8> {
    let mut data = ALP_MAGIC.to_vec();
    data.extend_from_slice(b"rest of the archive");
    data
}

fn build_scenario(src: &Path) {
    fs::create_dir_all(src.join("A")).unwrap();
    fs::create_dir_all(src.join("B")).unwrap();
    fs::create_dir_all(src.join("C")).unwrap();
    fs::write(src.join("A/song.als"), als_bytes()).unwrap();
    fs::write(src.join("B/mix.zip"), zip_bytes()).unwrap();
    fs::write(src.join("C/demo_somni.wav"), b"RIFF....WAVE").unwrap();
}

fn candidate_set(run: &als_recovery::ScanRun) -> BTreeSet<(PathBuf, PathBuf, Category)> {
    run.result
        .candidates()
        .map(|c| (c.source_path.clone(), c.destination_path.clone(), c.category))
        .collect()
}

#[test]
fn test_three_categories_are_recovered_with_structure() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let out = dir.path().join("out");
    build_scenario(&src);

    let config = RecoveryConfig::new(&src, &out)
        .with_keywords(["Somni"])
        .with_concurrency(3);
    let run = RecoveryPipeline::new(config).run().unwrap();

    let r = &run.scan.result;
    assert_eq!(r.als.len(), 1);
    assert_eq!(r.als[0].source_path, src.join("A/song.als"));
    assert_eq!(r.als[0].destination_path, out.join("A/song.als"));
    assert_eq!(r.alp.len(), 1);
    assert_eq!(r.alp[0].destination_path, out.join("B/mix.zip"));
    assert_eq!(r.keyword.len(), 1);
    assert_eq!(r.keyword[0].destination_path, out.join("C/demo_somni.wav"));

    assert_eq!(run.summary.als_found, 1);
    assert_eq!(run.summary.alp_found, 1);
    assert_eq!(run.summary.keyword_found, 1);
    assert_eq!(run.summary.copy_succeeded, 3);
    assert_eq!(run.summary.copy_failed, 0);
    assert!(!run.summary.interrupted);

    assert_eq!(fs::read(out.join("A/song.als")).unwrap(), als_bytes());
    assert_eq!(fs::read(out.join("B/mix.zip")).unwrap(), zip_bytes());
    assert_eq!(fs::read(out.join("C/demo_somni.wav")).unwrap(), b"RIFF....WAVE");
}

#[test]
fn test_marker_file_found_once_regardless_of_extension() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("backups")).unwrap();
    fs::write(src.join("backups/recovered_0001.chk"), als_bytes()).unwrap();
    fs::write(src.join("backups/Somni.chk"), als_bytes()).unwrap();

    let run = orchestrate(&src, Path::new("/out"), &keywords(&["somni"]), 2).unwrap();
    assert_eq!(run.result.total(), 2);
    assert_eq!(run.result.als.len(), 2);
    assert!(run.result.keyword.is_empty());
}

#[test]
fn test_rescan_is_idempotent_and_sequential_matches_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    build_scenario(&src);
    fs::create_dir_all(src.join("A/deeper/still")).unwrap();
    fs::write(src.join("A/deeper/still/old.alp"), b"pack").unwrap();
    fs::write(src.join("loose_somni.txt"), b"loose").unwrap();

    let kw = keywords(&["Somni"]);
    let first = orchestrate(&src, Path::new("/out"), &kw, 4).unwrap();
    let second = orchestrate(&src, Path::new("/out"), &kw, 4).unwrap();
    let sequential = orchestrate(&src, Path::new("/out"), &kw, 1).unwrap();

    assert_eq!(first.result.total(), 5);
    assert_eq!(candidate_set(&first), candidate_set(&second));
    assert_eq!(candidate_set(&first), candidate_set(&sequential));
}

#[test]
fn test_blocked_destinations_fail_without_stopping_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    let out = dir.path().join("out");
    fs::create_dir_all(src.join("A")).unwrap();
    fs::create_dir_all(src.join("B")).unwrap();
    for name in ["one.als", "two.als"] {
        fs::write(src.join("A").join(name), b"set").unwrap();
    }
    for name in ["three.als", "four.als", "five.als"] {
        fs::write(src.join("B").join(name), b"set").unwrap();
    }
    // out/B is a file, so nothing can be created beneath it
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("B"), b"in the way").unwrap();

    let report_path = dir.path().join("report.json");
    let config = RecoveryConfig::new(&src, &out)
        .with_concurrency(2)
        .with_report_path(&report_path);
    let run = RecoveryPipeline::new(config).run().unwrap();

    assert_eq!(run.summary.als_found, 5);
    assert_eq!(run.summary.copy_succeeded, 2);
    assert_eq!(run.summary.copy_failed, 3);
    let copy = run.copy.unwrap();
    assert_eq!(copy.succeeded + copy.failed, 5);
    assert!(out.join("A/one.als").exists());
    assert!(out.join("A/two.als").exists());

    let report = als_recovery::report::load_report(&report_path).unwrap();
    assert_eq!(report.failed_copies.len(), 3);
    assert!(report.failed_copies.iter().all(|f| f.source.starts_with(src.join("B"))));
}

#[test]
fn test_events_stream_discoveries() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    build_scenario(&src);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let scanner = ParallelScanner::new(SignatureConfig::default()).with_events(EventSink::new(tx));
    let run = scanner
        .scan(&WorkerPool::new(2).unwrap(), &src, Path::new("/out"), &keywords(&["somni"]))
        .unwrap();
    drop(scanner);

    let mut found = BTreeSet::new();
    let mut units = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            RecoveryEvent::CandidateFound(c) => {
                found.insert(c.source_path);
            }
            RecoveryEvent::UnitCompleted { .. } => units += 1,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(units, 3);
    assert_eq!(found.len(), run.result.total());
}

#[cfg(unix)]
#[test]
fn test_unreadable_subtree_is_contained() {
    use std::os::unix::fs::PermissionsExt;

    if unsafe { libc::geteuid() } == 0 {
        // permission bits do not apply to root
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    build_scenario(&src);
    fs::create_dir_all(src.join("Locked/inner")).unwrap();
    fs::write(src.join("Locked/inner/hidden.als"), als_bytes()).unwrap();
    fs::set_permissions(src.join("Locked"), fs::Permissions::from_mode(0o000)).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let scanner = ParallelScanner::new(SignatureConfig::default()).with_events(EventSink::new(tx));
    let run = scanner.scan(&WorkerPool::new(2).unwrap(), &src, Path::new("/out"), &keywords(&["Somni"]));
    drop(scanner);
    fs::set_permissions(src.join("Locked"), fs::Permissions::from_mode(0o755)).unwrap();
    let run = run.unwrap();

    assert_eq!(run.result.total(), 3);
    assert!(!run
        .result
        .candidates()
        .any(|c| c.source_path.starts_with(src.join("Locked"))));
    assert_eq!(run.result.dirs_skipped, 1);

    let mut warnings = 0;
    while let Ok(event) = rx.try_recv() {
        if let RecoveryEvent::PermissionDenied { path, is_dir } = event {
            assert!(is_dir);
            assert_eq!(path, src.join("Locked"));
            warnings += 1;
        }
    }
    assert_eq!(warnings, 1);
}

#[test]
fn test_sources_survive_output_pointing_at_scan_root() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("A")).unwrap();
    let mut contents = b"<Ableton Live Set".to_vec();
    contents.resize(32, b' ');
    fs::write(src.join("A/song.als"), &contents).unwrap();

    for output in [src.clone(), src.join("A/..")] {
        let config = RecoveryConfig::new(&src, &output).with_concurrency(2);
        assert!(RecoveryPipeline::new(config).run().is_err());
        assert_eq!(fs::read(src.join("A/song.als")).unwrap(), contents);
    }
}

#[test]
fn test_rerun_into_nested_output_finds_the_same_files() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    build_scenario(&src);
    let out = src.join("recovered");

    let first = RecoveryPipeline::new(RecoveryConfig::new(&src, &out).with_keywords(["Somni"]))
        .run()
        .unwrap();
    let second = RecoveryPipeline::new(RecoveryConfig::new(&src, &out).with_keywords(["Somni"]))
        .run()
        .unwrap();

    assert_eq!(first.summary.total_found(), 3);
    assert_eq!(first.summary, second.summary);
    assert!(!out.join("recovered").exists());
}
