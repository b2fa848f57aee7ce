use permsnap::accessor::HostAccessor;
use permsnap::apply::FixPolicy;
use permsnap::common::Mode;
use permsnap::engine::{CollectOptions, Engine};
use permsnap::fsx;
use permsnap::guard::SafetyGuard;
use permsnap::names::{current_ids, StaticNames};
use permsnap::report::MemorySink;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use walkdir::WalkDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn accessor() -> HostAccessor<StaticNames> {
    let (uid, gid) = current_ids();
    HostAccessor::new(StaticNames::new().with_user(uid, "alice").with_group(gid, "staff"))
}

fn open_guard() -> SafetyGuard {
    SafetyGuard::new(None, Vec::<PathBuf>::new())
}

/// (mode, uid, gid) of every entry under `root`, keyed by relative path.
fn tree_state(root: &Path) -> BTreeMap<PathBuf, (u32, u32, u32)> {
    WalkDir::new(root)
        .into_iter()
        .map(|e| {
            let e = e.unwrap();
            let st = fsx::stat_no_follow(e.path()).unwrap();
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, (st.mode.bits(), st.uid, st.gid))
        })
        .collect()
}

/// a/ (750) with a/f.txt (640) and b/ (700) with b/g.sh (755) plus a dangling symlink.
fn sample_tree(root: &Path) -> TestResult {
    fs::create_dir(root.join("a"))?;
    fs::write(root.join("a/f.txt"), b"hello")?;
    fs::create_dir(root.join("b"))?;
    fs::write(root.join("b/g.sh"), b"#!/bin/sh\n")?;
    std::os::unix::fs::symlink(root.join("nowhere"), root.join("b/dangling"))?;
    fsx::set_unix_permissions(root, Mode::new(0o755))?;
    fsx::set_unix_permissions(&root.join("a"), Mode::new(0o750))?;
    fsx::set_unix_permissions(&root.join("a/f.txt"), Mode::new(0o640))?;
    fsx::set_unix_permissions(&root.join("b"), Mode::new(0o700))?;
    fsx::set_unix_permissions(&root.join("b/g.sh"), Mode::new(0o755))?;
    Ok(())
}

#[test]
fn test_collect_scenario_lines() -> TestResult {
    let tree = tempdir()?;
    let out = tempdir()?;
    sample_tree(tree.path())?;
    let snapshot = out.path().join("perms.txt");

    let acc = accessor();
    let guard = open_guard();
    let summary = Engine::new(&acc, &guard, MemorySink::new()).collect(
        tree.path(),
        &snapshot,
        &CollectOptions::default(),
    )?;
    assert_eq!(summary.failed, 0);

    let text = fs::read_to_string(&snapshot)?;
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines.contains(&"a 750 alice staff"));
    assert!(lines.contains(&"a/f.txt 640 alice staff"));
    assert!(lines.contains(&". 755 alice staff"));
    assert!(lines.iter().any(|l| l.starts_with("b/dangling ")));
    assert!(lines.iter().all(|l| !l.starts_with('/')));
    assert_eq!(lines.len(), 6);
    Ok(())
}

#[test]
fn test_restore_onto_unmodified_tree_is_idempotent() -> TestResult {
    let tree = tempdir()?;
    let out = tempdir()?;
    sample_tree(tree.path())?;
    let snapshot = out.path().join("perms.txt");
    let before = tree_state(tree.path());

    let acc = accessor();
    let guard = open_guard();
    let mut engine = Engine::new(&acc, &guard, MemorySink::new());
    engine.collect(tree.path(), &snapshot, &CollectOptions::default())?;
    let summary = engine.restore(tree.path(), &snapshot, false)?;

    assert_eq!(summary.applied, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.unchanged, summary.recorded);
    assert_eq!(tree_state(tree.path()), before);
    Ok(())
}

#[test]
fn test_restore_reestablishes_modes_and_dry_run_only_simulates() -> TestResult {
    let tree = tempdir()?;
    let out = tempdir()?;
    sample_tree(tree.path())?;
    let snapshot = out.path().join("perms.txt");

    let acc = accessor();
    let guard = open_guard();
    let mut engine = Engine::new(&acc, &guard, MemorySink::new());
    engine.collect(tree.path(), &snapshot, &CollectOptions::default())?;
    let original = tree_state(tree.path());

    // Drift: everything wide open.
    for rel in ["a", "a/f.txt", "b", "b/g.sh"] {
        fsx::set_unix_permissions(&tree.path().join(rel), Mode::new(0o777))?;
    }
    let drifted = tree_state(tree.path());

    let dry = engine.restore(tree.path(), &snapshot, true)?;
    assert_eq!(dry.applied, 4);
    assert_eq!(tree_state(tree.path()), drifted);

    let real = engine.restore(tree.path(), &snapshot, false)?;
    assert_eq!(real.applied, 4);
    assert_eq!(tree_state(tree.path()), original);

    let sink = engine.into_sink();
    assert_eq!(
        sink.messages()
            .filter(|m| m.starts_with("dry-run: would update"))
            .count(),
        4
    );
    Ok(())
}

#[test]
fn test_restore_skips_deleted_entries() -> TestResult {
    let tree = tempdir()?;
    let out = tempdir()?;
    sample_tree(tree.path())?;
    let snapshot = out.path().join("perms.txt");

    let acc = accessor();
    let guard = open_guard();
    let mut engine = Engine::new(&acc, &guard, MemorySink::new());
    engine.collect(tree.path(), &snapshot, &CollectOptions::default())?;

    fs::remove_file(tree.path().join("a/f.txt"))?;
    fsx::set_unix_permissions(&tree.path().join("b/g.sh"), Mode::new(0o600))?;

    let summary = engine.restore(tree.path(), &snapshot, false)?;
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(fsx::stat_no_follow(&tree.path().join("b/g.sh"))?.mode, Mode::new(0o755));
    assert!(engine
        .into_sink()
        .messages()
        .any(|m| m.contains("a/f.txt") && m.contains("no longer exists")));
    Ok(())
}

#[test]
fn test_restore_does_not_follow_symlinked_parent() -> TestResult {
    let tree = tempdir()?;
    let out = tempdir()?;
    let outside = tempdir()?;
    fs::create_dir(tree.path().join("d"))?;
    fs::write(tree.path().join("d/secret"), b"x")?;
    fsx::set_unix_permissions(&tree.path().join("d/secret"), Mode::new(0o644))?;
    let snapshot = out.path().join("perms.txt");

    let acc = accessor();
    let guard = open_guard();
    let mut engine = Engine::new(&acc, &guard, MemorySink::new());
    engine.collect(tree.path(), &snapshot, &CollectOptions::default())?;

    // Swap the directory for a link to a file the snapshot never covered.
    let foreign = outside.path().join("secret");
    fs::write(&foreign, b"x")?;
    fsx::set_unix_permissions(&foreign, Mode::new(0o600))?;
    fs::remove_dir_all(tree.path().join("d"))?;
    std::os::unix::fs::symlink(outside.path(), tree.path().join("d"))?;

    let summary = engine.restore(tree.path(), &snapshot, false)?;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(fsx::stat_no_follow(&foreign)?.mode, Mode::new(0o600));
    assert!(engine
        .into_sink()
        .messages()
        .any(|m| m.contains("d/secret") && m.contains("is a symlink")));
    Ok(())
}

#[test]
fn test_records_beneath_followed_link_are_not_restored_through_it() -> TestResult {
    let tree = tempdir()?;
    let out = tempdir()?;
    let outside = tempdir()?;
    let target = outside.path().join("secret");
    fs::write(&target, b"x")?;
    fsx::set_unix_permissions(&target, Mode::new(0o600))?;
    std::os::unix::fs::symlink(outside.path(), tree.path().join("link"))?;
    let snapshot = out.path().join("perms.txt");

    let acc = accessor();
    let guard = open_guard();
    let mut engine = Engine::new(&acc, &guard, MemorySink::new());
    let options = CollectOptions { follow_symlinks: true, ..Default::default() };
    engine.collect(tree.path(), &snapshot, &options)?;
    assert!(fs::read_to_string(&snapshot)?.contains("link/secret 600 "));

    fsx::set_unix_permissions(&target, Mode::new(0o644))?;
    let summary = engine.restore(tree.path(), &snapshot, false)?;
    assert_eq!(summary.failed, 1);
    assert_eq!(fsx::stat_no_follow(&target)?.mode, Mode::new(0o644));
    Ok(())
}

#[test]
fn test_restore_onto_relocated_tree() -> TestResult {
    let original = tempdir()?;
    let copy = tempdir()?;
    let out = tempdir()?;
    sample_tree(original.path())?;
    sample_tree(copy.path())?;
    fsx::set_unix_permissions(&copy.path().join("a/f.txt"), Mode::new(0o666))?;
    let snapshot = out.path().join("perms.txt");

    let acc = accessor();
    let guard = open_guard();
    let mut engine = Engine::new(&acc, &guard, MemorySink::new());
    engine.collect(original.path(), &snapshot, &CollectOptions::default())?;
    let summary = engine.restore(copy.path(), &snapshot, false)?;

    assert_eq!(summary.applied, 1);
    assert_eq!(fsx::stat_no_follow(&copy.path().join("a/f.txt"))?.mode, Mode::new(0o640));
    Ok(())
}

#[test]
fn test_fix_dry_run_has_no_side_effect() -> TestResult {
    let tree = tempdir()?;
    sample_tree(tree.path())?;
    let before = tree_state(tree.path());

    let acc = accessor();
    let guard = open_guard();
    let summary = Engine::new(&acc, &guard, MemorySink::new()).fix(
        tree.path(),
        &FixPolicy::for_current_user(),
        true,
    )?;

    assert!(summary.applied > 0);
    assert_eq!(tree_state(tree.path()), before);
    Ok(())
}

#[test]
fn test_fix_leaves_symlinks_alone() -> TestResult {
    let tree = tempdir()?;
    let outside = tempdir()?;
    let target = outside.path().join("target.txt");
    fs::write(&target, b"x")?;
    fsx::set_unix_permissions(&target, Mode::new(0o600))?;
    std::os::unix::fs::symlink(&target, tree.path().join("link"))?;

    let acc = accessor();
    let guard = open_guard();
    Engine::new(&acc, &guard, MemorySink::new()).fix(
        tree.path(),
        &FixPolicy::for_current_user(),
        false,
    )?;

    assert_eq!(fsx::stat_no_follow(&target)?.mode, Mode::new(0o600));
    Ok(())
}
