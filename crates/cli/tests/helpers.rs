use std::fs;

use matchcheck::canonicalize_or_current;
use matchcheck::commands::percent;
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(canonicalize_or_current(".").expect("canonicalize"), cwd);
}

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");

    let result = canonicalize_or_current(subdir.to_str().unwrap()).expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path() {
    let cwd = std::env::current_dir().expect("cwd");
    let result = canonicalize_or_current("does/not/exist").expect("fallback");
    assert_eq!(result, cwd.join("does/not/exist"));
}

#[test]
fn percent_handles_zero_total() {
    assert_eq!(percent(10, 0), 0.0);
    assert_eq!(percent(1, 4), 25.0);
}
