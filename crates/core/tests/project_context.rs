use std::path::Path;

use matchcheck_core::project::{
    discover_objects, load_config, load_project_config, ConfigError, ContextError, ProjectContext,
    ProjectLayout, VerifyConfig, DEFAULT_TEXT_SIZE,
};
use matchcheck_core::registry::ParseMode;
use matchcheck_core::services::equivalence::MaskPolicy;
use matchcheck_core::services::extract::default_backend_registry;
use matchcheck_core::services::verify::{Outcome, SkipReason};

mod common;
use common::*;

/// Lay out a small project: two matching functions, one mismatch, one
/// hardware stub, and one function nobody rebuilt.
fn write_project(root: &Path) {
    std::fs::create_dir_all(root.join("config")).unwrap();
    std::fs::create_dir_all(root.join("elf")).unwrap();
    std::fs::create_dir_all(root.join("build/src")).unwrap();

    std::fs::write(
        root.join("config/decompiled.txt"),
        "# registry\n\
         foo = 0x0, 0xC;\n\
         bar = 0xC, 0x8;\n\
         baz = 0x14, 0x8;\n\
         dma = 0x1C, 0x8; // HARDWARE\n\
         qux = 0x24, 0x8;\n",
    )
    .unwrap();
    std::fs::write(
        root.join("elf/SLUS_204.69"),
        mips_elf(&[
            ("foo", &[ADDIU_SP, JAL_A, JR_RA]),
            ("bar", &[LW_V0, JR_RA]),
            ("baz", &[LW_V0, JR_RA]),
            ("dma", &[NOP, JR_RA]),
            ("qux", &[NOP, JR_RA]),
        ]),
    )
    .unwrap();
    std::fs::write(
        root.join("build/src/a.o"),
        mips_elf(&[("foo", &[ADDIU_SP, JAL_B, JR_RA]), ("bar", &[LW_V0, JR_RA])]),
    )
    .unwrap();
    std::fs::write(root.join("build/src/b.o"), mips_elf_split(&[("baz", &[SW_V0, JR_RA])]))
        .unwrap();
    std::fs::write(root.join("build/src/notes.txt"), "not an object").unwrap();
}

#[test]
fn verifies_a_project_with_default_layout() {
    let temp = tempfile::tempdir().unwrap();
    write_project(temp.path());

    let layout = ProjectLayout::new(temp.path());
    let config = load_project_config(&layout).unwrap();
    assert_eq!(config, VerifyConfig::default());

    let ctx = ProjectContext::open(layout, config, &default_backend_registry()).expect("context");
    assert_eq!(ctx.resolver.len(), 2);
    assert!(ctx.object_errors.is_empty());

    let report = ctx.run().expect("run");
    assert_eq!(report.get("foo").unwrap().outcome, Outcome::Matched);
    assert_eq!(report.get("bar").unwrap().outcome, Outcome::Matched);
    assert_eq!(report.get("baz").unwrap().outcome, Outcome::Failed);
    assert_eq!(report.get("dma").unwrap().outcome, Outcome::Hardware);
    assert_eq!(
        report.get("qux").unwrap().outcome,
        Outcome::Skipped(SkipReason::NoObjectFile)
    );
    assert_eq!(report.totals.matched_bytes, 20);
    assert_eq!(report.text_size, DEFAULT_TEXT_SIZE);
    assert_eq!(report.summary_line(), "2 passed, 1 failed, 1 hardware, 5 total");
}

#[test]
fn yaml_config_overrides_paths_and_policy() {
    let temp = tempfile::tempdir().unwrap();
    write_project(temp.path());
    std::fs::rename(temp.path().join("build/src"), temp.path().join("out")).unwrap();
    std::fs::write(
        temp.path().join("matchcheck.yaml"),
        "objects: out\ntext_size: 64\nmasking:\n  policy: raw\njobs: 2\n",
    )
    .unwrap();

    let layout = ProjectLayout::new(temp.path());
    let config = load_project_config(&layout).unwrap();
    assert_eq!(config.masking.policy, MaskPolicy::Raw);
    assert_eq!(config.jobs, Some(2));
    assert_eq!(config.registry_mode, ParseMode::Strict);

    let ctx = ProjectContext::open(layout, config, &default_backend_registry()).unwrap();
    let report = ctx.run().unwrap();
    // Raw comparison no longer tolerates the differing call target.
    assert_eq!(report.get("foo").unwrap().outcome, Outcome::Failed);
    assert_eq!(report.totals.matched_bytes, 8);
    assert_eq!(report.match_ratio, 0.125);
}

#[test]
fn json_config_is_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("matchcheck.json");
    std::fs::write(&path, r#"{"registry_mode": "lenient", "diagnostic_words": 4}"#).unwrap();
    let config = load_config(&path).unwrap();
    assert_eq!(config.registry_mode, ParseMode::Lenient);
    assert_eq!(config.diagnostic_words, 4);
    assert_eq!(config.backend, "elf");
}

#[test]
fn empty_yaml_means_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("matchcheck.yml");
    std::fs::write(&path, "\n").unwrap();
    assert_eq!(load_config(&path).unwrap(), VerifyConfig::default());
}

#[test]
fn unsupported_config_extension_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("matchcheck.toml");
    std::fs::write(&path, "").unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"));
}

#[test]
fn unknown_backend_lists_available_ones() {
    let temp = tempfile::tempdir().unwrap();
    write_project(temp.path());
    let config = VerifyConfig { backend: "ghidra".into(), ..VerifyConfig::default() };
    let err = ProjectContext::open(ProjectLayout::new(temp.path()), config, &default_backend_registry())
        .err()
        .expect("unknown backend");
    assert!(matches!(err, ContextError::UnknownBackend { .. }));
    assert!(err.to_string().contains("elf"), "{err}");
}

#[test]
fn missing_objects_directory_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    write_project(temp.path());
    std::fs::remove_dir_all(temp.path().join("build")).unwrap();
    let err = ProjectContext::open(
        ProjectLayout::new(temp.path()),
        VerifyConfig::default(),
        &default_backend_registry(),
    )
    .err()
    .expect("missing objects dir");
    assert!(matches!(err, ContextError::ObjectsDir { .. }));
}

#[test]
fn missing_registry_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    write_project(temp.path());
    std::fs::remove_file(temp.path().join("config/decompiled.txt")).unwrap();
    let err = ProjectContext::open(
        ProjectLayout::new(temp.path()),
        VerifyConfig::default(),
        &default_backend_registry(),
    )
    .err()
    .expect("missing registry");
    assert!(matches!(err, ContextError::Registry(_)));
}

#[test]
fn objects_are_discovered_in_name_order() {
    let temp = tempfile::tempdir().unwrap();
    for name in ["zeta.o", "alpha.o", "mid.o", "skip.c"] {
        std::fs::write(temp.path().join(name), b"").unwrap();
    }
    std::fs::create_dir(temp.path().join("nested.o")).unwrap();
    let found = discover_objects(temp.path(), "o").unwrap();
    let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
    assert_eq!(names, ["alpha.o", "mid.o", "zeta.o"]);
}

#[test]
fn layout_keeps_absolute_paths() {
    let temp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(temp.path());
    assert_eq!(layout.resolve("config/x.txt"), temp.path().join("config/x.txt"));
    assert_eq!(layout.resolve(temp.path()), temp.path());
}
