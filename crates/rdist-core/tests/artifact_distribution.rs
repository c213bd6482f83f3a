//! Integration tests for artifact registration and staging.

use std::fs;
use std::path::PathBuf;

use rdist_core::{
    ArtifactKind, BackendConfig, DataSource, Error, ExecutorKind, MapReduce, Range, Session,
    TaskContext,
};
use tempfile::TempDir;

fn rayon_config(staging: &TempDir) -> BackendConfig {
    BackendConfig::new()
        .with_executor(ExecutorKind::Rayon)
        .with_max_threads(2)
        .with_staging_dir(staging.path())
}

#[test]
fn test_files_sent_before_backend_switch_are_staged() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    fs::create_dir_all(inputs.path().join("aux/nested")).unwrap();
    fs::write(inputs.path().join("aux/lumi.json"), "{}").unwrap();
    fs::write(inputs.path().join("aux/nested/pileup.txt"), "42").unwrap();

    let mut session = Session::new();
    let added = session.send_generic_files(inputs.path().join("aux")).unwrap();
    assert_eq!(added.len(), 2);

    session.use_backend("threads", &rayon_config(&staging)).unwrap();
    assert!(!staging.path().join("lumi.json").exists());

    let staged = MapReduce::new(
        |_: &Range, ctx: &TaskContext| {
            Ok(ctx.staged_file("pileup.txt").is_some() && ctx.staged_file("lumi.json").is_some())
        },
        |a: bool, b: bool| Ok(a && b),
    );
    assert!(session.execute(&DataSource::Entries(8), staged).unwrap());
    assert_eq!(fs::read_to_string(staging.path().join("pileup.txt")).unwrap(), "42");
}

#[test]
fn test_files_sent_on_distributed_backend_are_staged_immediately() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let file = inputs.path().join("weights.csv");
    fs::write(&file, "0.5").unwrap();

    let mut session = Session::new();
    session.use_backend("threads", &rayon_config(&staging)).unwrap();
    session.send_generic_files(&file).unwrap();

    assert!(staging.path().join("weights.csv").exists());
    assert_eq!(session.backend().staging_dir(), Some(staging.path()));
}

#[test]
fn test_registration_is_idempotent() {
    let inputs = TempDir::new().unwrap();
    let file = inputs.path().join("cuts.txt");
    fs::write(&file, "pt > 20").unwrap();

    let session = Session::new();
    assert_eq!(session.send_generic_files(&file).unwrap().len(), 1);
    assert!(session.send_generic_files(vec![file.clone(), file.clone()]).unwrap().is_empty());
    assert_eq!(session.registry().files().unwrap(), vec![file]);
}

#[test]
fn test_conflicting_names_rejected() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    fs::create_dir_all(inputs.path().join("a")).unwrap();
    fs::create_dir_all(inputs.path().join("b")).unwrap();
    fs::write(inputs.path().join("a/config.txt"), "a").unwrap();
    fs::write(inputs.path().join("b/config.txt"), "b").unwrap();

    let mut session = Session::new();
    session.use_backend("threads", &rayon_config(&staging)).unwrap();
    session.send_generic_files(inputs.path().join("a/config.txt")).unwrap();

    let result = session.send_generic_files(inputs.path().join("b/config.txt"));
    assert!(matches!(result, Err(Error::ArtifactConflict { name, .. }) if name == "config.txt"));
    assert_eq!(session.registry().files().unwrap().len(), 1);
}

#[test]
fn test_headers_declared_and_staged() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let header = inputs.path().join("selection.h");
    fs::write(&header, "bool pass(float pt);").unwrap();

    let mut session = Session::new();
    session.use_backend("threads", &rayon_config(&staging)).unwrap();
    session.include_headers(&header).unwrap();

    assert!(session.registry().contains(ArtifactKind::Header, &header).unwrap());
    assert!(staging.path().join("selection.h").exists());
}

#[test]
fn test_invalid_shared_library_is_not_registered() {
    let inputs = TempDir::new().unwrap();
    let library = inputs.path().join("libbroken.so");
    fs::write(&library, "not an ELF file").unwrap();

    let session = Session::new();
    let result = session.include_shared_libraries(&library);
    assert!(matches!(result, Err(Error::LibraryLoad(_))));
    assert!(session.registry().shared_libraries().unwrap().is_empty());
}

#[test]
fn test_missing_paths() {
    let session = Session::new();
    let missing = PathBuf::from("/nonexistent/rdist/header.h");
    assert!(matches!(
        session.include_headers(&missing),
        Err(Error::DistributionIo { path, .. }) if path == missing
    ));
}

#[test]
fn test_staged_file_survives_source_removal() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let file = inputs.path().join("calib.txt");
    fs::write(&file, "0123456789").unwrap();

    let mut session = Session::new();
    session
        .use_backend("threads", &rayon_config(&staging).with_npartitions(2))
        .unwrap();
    session.send_generic_files(&file).unwrap();

    let read_calib = || {
        MapReduce::new(
            |_: &Range, ctx: &TaskContext| {
                let path = ctx
                    .staged_file("calib.txt")
                    .ok_or_else(|| Error::Execution("calib.txt not staged".to_string()))?;
                Ok(fs::read_to_string(path)?.len())
            },
            |a: usize, _: usize| Ok(a),
        )
    };
    assert_eq!(session.execute(&DataSource::Entries(10), read_calib()).unwrap(), 10);

    fs::remove_file(&file).unwrap();
    assert_eq!(session.execute(&DataSource::Entries(10), read_calib()).unwrap(), 10);
}

#[test]
fn test_name_clash_on_local_backend_leaves_switch_usable() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    fs::create_dir_all(inputs.path().join("a")).unwrap();
    fs::create_dir_all(inputs.path().join("b")).unwrap();
    fs::write(inputs.path().join("a/config.h"), "a").unwrap();
    fs::write(inputs.path().join("b/config.h"), "b").unwrap();

    let mut session = Session::new();
    session.send_generic_files(inputs.path().join("a/config.h")).unwrap();
    assert!(matches!(
        session.send_generic_files(inputs.path().join("b/config.h")),
        Err(Error::ArtifactConflict { name, .. }) if name == "config.h"
    ));
    assert_eq!(session.registry().files().unwrap().len(), 1);

    session.use_backend("threads", &rayon_config(&staging)).unwrap();
    for _ in 0..2 {
        let count = MapReduce::new(
            |range: &Range, _: &TaskContext| Ok(range.len()),
            |a: u64, b: u64| Ok(a + b),
        );
        assert_eq!(session.execute(&DataSource::Entries(6), count).unwrap(), 6);
    }
    assert_eq!(fs::read_to_string(staging.path().join("config.h")).unwrap(), "a");
}

#[test]
fn test_nested_name_clash_stages_nothing() {
    let inputs = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    fs::create_dir_all(inputs.path().join("conf/a")).unwrap();
    fs::create_dir_all(inputs.path().join("conf/b")).unwrap();
    fs::write(inputs.path().join("conf/a/config.h"), "a").unwrap();
    fs::write(inputs.path().join("conf/b/config.h"), "b").unwrap();

    let mut session = Session::new();
    session.use_backend("threads", &rayon_config(&staging)).unwrap();
    let result = session.send_generic_files(inputs.path().join("conf"));

    assert!(matches!(result, Err(Error::ArtifactConflict { .. })));
    assert!(session.registry().is_empty().unwrap());
    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}
