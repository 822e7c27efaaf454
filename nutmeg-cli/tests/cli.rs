use std::fs;
use std::path::Path;

use assert_cmd::Command;
use nutmeg_core::Bundle;
use predicates::prelude::*;
use tempfile::tempdir;

fn nutmeg() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nutmeg"))
}

fn stdout_of(args: &[&str], stdin: &str) -> String {
    let output = nutmeg().args(args).write_stdin(stdin).output().expect("runs");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).expect("utf8")
}

fn load_bundle(path: &Path) -> Bundle {
    Bundle::from_json(&fs::read_to_string(path).expect("read bundle")).expect("bundle")
}

fn names<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    items.collect()
}

#[test]
fn parses_stdin_to_json_lines() {
    let trees = stdout_of(&["parse"], "x := 1\nprintln(x)\n");
    let lines: Vec<_> = trees.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("{\"kind\":\"binding\""));
    assert!(lines[1].starts_with("{\"kind\":\"call\""));
}

#[test]
fn stages_chain_through_pipes() {
    let trees = stdout_of(&["parse"], "def f(x): println(x) enddef\n");
    let trees = stdout_of(&["resolve"], &trees);
    assert!(trees.contains("\"scope\":\"local\""));
    let trees = stdout_of(&["optimize"], &trees);
    assert!(trees.contains("\"kind\":\"syscall\""));
    let trees = stdout_of(&["codegen"], &trees);
    assert!(trees.contains("\"nargs\":1"));
    assert!(trees.contains("\"slot\":0"));
}

#[test]
fn parse_reads_and_writes_files() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.nutmeg");
    fs::write(&input_path, "assert true").expect("write input");
    let output_path = dir.path().join("out").join("trees.jsonl");

    nutmeg()
        .arg("parse")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let trees = fs::read_to_string(&output_path).expect("read trees");
    assert!(trees.contains("input.nutmeg"));
}

#[test]
fn parse_picks_a_reader_by_extension() {
    let dir = tempdir().expect("tempdir");
    let text_path = dir.path().join("motto.txt");
    fs::write(&text_path, "keep it simple").expect("write text");

    nutmeg()
        .arg("parse")
        .arg("--input")
        .arg(&text_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reftype\":\"const\""))
        .stdout(predicate::str::contains("\"name\":\"motto\""))
        .stdout(predicate::str::contains("keep it simple"));

    let image_path = dir.path().join("logo.png");
    fs::write(&image_path, "").expect("write image");
    nutmeg()
        .arg("parse")
        .arg("--input")
        .arg(&image_path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("MISHAP: No parser found for file"));
}

#[test]
fn explicit_unit_overrides_file_name() {
    nutmeg()
        .args(["parse", "--unit", "checks"])
        .write_stdin("assert true")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"checks\""));
}

#[test]
fn reports_mishaps_with_culprits() {
    nutmeg()
        .arg("resolve")
        .write_stdin(stdout_of(&["parse"], "def f(): x := 1; x := 2 enddef"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("MISHAP: Trying to re-declare the same variable"))
        .stderr(predicate::str::contains("binding"));
}

#[test]
fn developer_mode_adds_debug_form() {
    nutmeg()
        .args(["--developer", "parse"])
        .write_stdin("def (: enddef")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MISHAP:"))
        .stderr(predicate::str::contains("Mishap {"));
}

#[test]
fn reports_unreadable_interchange() {
    nutmeg()
        .arg("optimize")
        .write_stdin("{\"kind\": \"nonsense\"}\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot read code-tree"));
}

#[test]
fn reports_missing_input_file() {
    let dir = tempdir().expect("tempdir");
    nutmeg()
        .arg("parse")
        .arg("--input")
        .arg(dir.path().join("missing.nutmeg"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read input file"));
}

#[test]
fn compiles_files_into_a_bundle() {
    let dir = tempdir().expect("tempdir");
    let main_path = dir.path().join("main.nutmeg");
    let lib_path = dir.path().join("lib.nutmeg");
    let text_path = dir.path().join("banner.txt");
    fs::write(&main_path, "@command\ndef main(): greet() enddef\n").expect("write main");
    fs::write(&lib_path, "def greet(): println(banner) enddef\ndef spare(): 0 enddef\n")
        .expect("write lib");
    fs::write(&text_path, "hi").expect("write banner");
    let bundle_path = dir.path().join("app.bundle.json");

    nutmeg()
        .arg("compile")
        .arg(&main_path)
        .arg(&lib_path)
        .arg(&text_path)
        .arg("--bundle")
        .arg(&bundle_path)
        .assert()
        .success();

    let bundle = load_bundle(&bundle_path);
    assert_eq!(names(bundle.entry_points()), vec!["main"]);
    let needs: Vec<_> = bundle.dependencies("main").expect("traced").iter().cloned().collect();
    assert_eq!(needs, vec!["banner".to_string(), "greet".to_string(), "main".to_string()]);
    assert_eq!(bundle.source_files().count(), 3);
}

#[test]
fn compiles_long_operator_chains() {
    let dir = tempdir().expect("tempdir");
    let main_path = dir.path().join("sum.nutmeg");
    let terms: Vec<String> = (0..100).map(|n| n.to_string()).collect();
    fs::write(&main_path, format!("@command def main(): {} enddef", terms.join(" + ")))
        .expect("write main");
    let bundle_path = dir.path().join("sum.bundle.json");

    nutmeg()
        .arg("compile")
        .arg(&main_path)
        .arg("-b")
        .arg(&bundle_path)
        .assert()
        .success();

    assert!(load_bundle(&bundle_path).binding("main").expect("readable").is_some());
}

#[test]
fn keep_extends_an_existing_bundle() {
    let dir = tempdir().expect("tempdir");
    let first = dir.path().join("first.nutmeg");
    let second = dir.path().join("second.nutmeg");
    fs::write(&first, "def helper(): 1 enddef").expect("write first");
    fs::write(&second, "def main(): helper() enddef").expect("write second");
    let bundle_path = dir.path().join("app.bundle.json");

    nutmeg()
        .arg("compile")
        .arg(&first)
        .arg("--bundle")
        .arg(&bundle_path)
        .assert()
        .success();
    nutmeg()
        .arg("compile")
        .arg(&second)
        .arg("--bundle")
        .arg(&bundle_path)
        .args(["--entry-point", "main", "--keep"])
        .assert()
        .success();

    let bundle = load_bundle(&bundle_path);
    assert_eq!(names(bundle.binding_names()), vec!["helper", "main"]);
    assert_eq!(bundle.dependencies("main").map(|d| d.len()), Some(2));
}

#[test]
fn undefined_globals_fail_compilation() {
    let dir = tempdir().expect("tempdir");
    let main_path = dir.path().join("main.nutmeg");
    fs::write(&main_path, "def main(): nowhere() enddef").expect("write main");

    nutmeg()
        .arg("compile")
        .arg(&main_path)
        .arg("--bundle")
        .arg(dir.path().join("app.bundle.json"))
        .args(["--entry-point", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Global variable is referenced but not defined"))
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn bundle_then_trace_builds_dependencies() {
    let dir = tempdir().expect("tempdir");
    let bundle_path = dir.path().join("app.bundle.json");
    let trees = stdout_of(&["parse"], "def main(): helper() enddef\ndef helper(): 2 enddef\n");
    let trees = stdout_of(&["resolve"], &trees);

    nutmeg()
        .arg("bundle")
        .arg("--bundle")
        .arg(&bundle_path)
        .args(["-e", "main"])
        .write_stdin(trees)
        .assert()
        .success();

    let bundle = load_bundle(&bundle_path);
    assert_eq!(names(bundle.binding_names()), vec!["helper", "main"]);
    assert_eq!(names(bundle.entry_points()), vec!["main"]);
    assert!(bundle.dependencies("main").is_none());

    nutmeg().arg("trace").arg("--bundle").arg(&bundle_path).assert().success();

    let bundle = load_bundle(&bundle_path);
    assert_eq!(bundle.dependencies("main").map(|d| d.len()), Some(2));
}

#[test]
fn bundle_rejects_unresolved_trees() {
    let dir = tempdir().expect("tempdir");
    nutmeg()
        .arg("bundle")
        .arg("--bundle")
        .arg(dir.path().join("app.bundle.json"))
        .write_stdin(stdout_of(&["parse"], "x := 1"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Only global bindings can be bundled"));
}
