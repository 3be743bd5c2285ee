//! Drives the `coveron` binary.

use assert_cmd::prelude::*;
use indoc::indoc;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const SOURCE: &str = "int f(int a, int b) {\n    if (a && b) return 1;\n    return 0;\n}\n";

fn coveron(dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_coveron"));
    command.current_dir(dir).env_remove("RUST_LOG");
    command
}

fn stdout_of(command: &mut Command) -> String {
    let output = command.output().unwrap();
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_instrument_writes_output_and_cid() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.c"), SOURCE).unwrap();

    coveron(dir.path())
        .args(["instrument", "main.c", "-o", "out"])
        .assert()
        .success();

    let entries: Vec<String> = fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().any(|name| name.starts_with("main_") && name.ends_with(".c")));
    assert!(entries.iter().any(|name| name.starts_with("main_") && name.ends_with(".cid")));
}

#[test]
fn test_second_run_reports_up_to_date() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.c"), SOURCE).unwrap();

    let first = stdout_of(coveron(dir.path()).args(["instrument", "main.c"]));
    assert!(first.contains("1 instrumented, 0 up to date, 0 failed"));

    let second = stdout_of(coveron(dir.path()).args(["instrument", "main.c"]));
    assert!(second.contains("0 instrumented, 1 up to date, 0 failed"));

    let forced = stdout_of(coveron(dir.path()).args(["instrument", "--force", "main.c"]));
    assert!(forced.contains("1 instrumented, 0 up to date, 0 failed"));
}

#[test]
fn test_failed_file_gives_non_zero_exit() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("good.c"), SOURCE).unwrap();
    fs::write(dir.path().join("bad.c"), "int broken( {\n").unwrap();

    let output = coveron(dir.path())
        .args(["instrument", "good.c", "bad.c"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 instrumented, 0 up to date, 1 failed"));
}

#[test]
fn test_strip_restores_instrumented_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.c"), SOURCE).unwrap();
    coveron(dir.path())
        .args(["instrument", "main.c", "-o", "out"])
        .assert()
        .success();

    let instrumented = fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|ext| ext == "c"))
        .unwrap();
    coveron(dir.path())
        .arg("strip")
        .arg(&instrumented)
        .args(["-o", "restored.c"])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(dir.path().join("restored.c")).unwrap(), SOURCE);
}

#[test]
fn test_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();

    coveron(dir.path()).arg("init").assert().success();
    assert!(dir.path().join(".coveron.toml").is_file());

    coveron(dir.path()).arg("init").assert().failure();
    coveron(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn test_config_file_sets_output_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.c"), SOURCE).unwrap();
    fs::write(dir.path().join(".coveron.toml"), "output_dir = \"instrumented\"\n").unwrap();

    coveron(dir.path())
        .args(["instrument", "main.c"])
        .assert()
        .success();
    assert!(dir.path().join("instrumented").is_dir());
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.c"), SOURCE).unwrap();
    fs::write(dir.path().join(".coveron.toml"), "unknown_key = 1\n").unwrap();

    coveron(dir.path())
        .args(["instrument", "main.c"])
        .assert()
        .failure();
}

fn have_c_compiler() -> bool {
    Command::new("cc")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

#[test]
fn test_compiles_source_with_sibling_header() {
    if !have_c_compiler() {
        eprintln!("skipping: no `cc` on PATH");
        return;
    }
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("util.h"), "#define LIMIT 3\n").unwrap();
    fs::write(
        src.join("coveron_helper.h"),
        "void __coveron_checkpoint(unsigned id);\nint __coveron_evaluation(unsigned id, int value);\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("coveron_helper.c"),
        indoc! {"
            void __coveron_checkpoint(unsigned id) { (void)id; }
            int __coveron_evaluation(unsigned id, int value) { (void)id; return value; }
        "},
    )
    .unwrap();
    fs::write(
        src.join("m.c"),
        indoc! {r#"
            #include "util.h"
            int main(void) {
                int x = LIMIT;
                if (x > 1 && x < 5) x = 0;
                return x;
            }
        "#},
    )
    .unwrap();

    coveron(dir.path())
        .args([
            "instrument",
            "src/m.c",
            "--compiler",
            "cc",
            "--runtime-source",
            "coveron_helper.c",
            "--",
            "-o",
            "prog",
        ])
        .assert()
        .success();

    let status = Command::new(dir.path().join("prog")).status().unwrap();
    assert!(status.success());
}

#[test]
fn test_missing_runtime_source_fails_compile_step() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.c"), SOURCE).unwrap();

    let output = coveron(dir.path())
        .args([
            "instrument",
            "main.c",
            "--compiler",
            "cc",
            "--runtime-source",
            "missing_helper.c",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("runtime helper not found"));
}
