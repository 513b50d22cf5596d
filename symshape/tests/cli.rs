// CLI tests for symc.
//
// Run the built binary against the .sym files under demos/ and check exit
// codes and output for each --emit target.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn symc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_symc"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demo(name: &str) -> PathBuf {
    project_root().join("demos").join(name)
}

fn symc(args: &[&str], source: &Path) -> Output {
    Command::new(symc_binary())
        .args(args)
        .arg(source)
        .output()
        .expect("failed to run symc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn default_emit_prints_symbols() {
    let output = symc(&[], &demo("shared_subgraph.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("graph main\n"), "stdout: {out}");
    assert!(out.contains("graph scale\n"));
    assert!(out.contains("  x: call scale  shape=[s0, 128]"));
}

#[test]
fn emit_exprs_lists_flattened_dim() {
    let output = symc(&["--emit", "exprs"], &demo("reshape.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Mul("), "stdout: {out}");
}

#[test]
fn emit_redundant_reports_no_effect_reshape() {
    let output = symc(&["--emit", "redundant"], &demo("reshape.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("no-effect same (Reshape)"));
}

#[test]
fn emit_json_is_valid() {
    let output = symc(&["--emit", "json"], &demo("shared_subgraph.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["entry"], "main");
    assert_eq!(v["stats"]["subgraphs_entered"], 1);
}

#[test]
fn emit_graph_prints_resolved_program() {
    let output = symc(&["--emit", "graph"], &demo("shared_subgraph.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("graph scale(t: f32[?, 128]) {\n"), "stdout: {out}");
    assert!(out.contains("  r = Relu(t) : f32[?, 128]\n"));
    assert!(out.contains("graph main(a: f32[?, 128], b: f32[?, 128]) {\n"));
    assert!(out.contains("  x = call scale(a) : f32[?, 128]\n"));
    assert!(!out.contains("shape="), "graph output carries no symbols: {out}");
}

#[test]
fn emit_ast_parses_only() {
    // Parsing alone accepts the recursive demo; only the build rejects it.
    let output = symc(&["--emit", "ast"], &demo("recursive.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("GraphDef"));
}

#[test]
fn emit_build_info_prints_hashes() {
    let output = symc(&["--emit", "build-info"], &demo("reshape.sym"));
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["source_hash"].as_str().unwrap().len(), 64);
    assert_eq!(v["rules_fingerprint"].as_str().unwrap().len(), 64);
}

#[test]
fn entry_flag_selects_graph() {
    let output = symc(&["--entry", "scale"], &demo("shared_subgraph.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("graph scale\n"));
    assert!(!out.contains("graph main"));
}

#[test]
fn recursive_program_exits_1() {
    let output = symc(&[], &demo("recursive.sym"));
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("error[E0200]"), "stderr: {err}");
    assert!(err.contains("recursive call into graph 'loop'"));
}

#[test]
fn unknown_entry_exits_1() {
    let output = symc(&["--entry", "nope"], &demo("shared_subgraph.sym"));
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("E0106"));
}

#[test]
fn missing_file_exits_2() {
    let output = symc(&[], &project_root().join("demos/does_not_exist.sym"));
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).starts_with("symc: error:"));
}

#[test]
fn verbose_reports_each_pass() {
    let output = symc(&["--verbose", "--emit", "redundant"], &demo("reshape.sym"));
    assert!(output.status.success());
    let err = stderr(&output);
    for pass in ["resolve", "build", "redundancy"] {
        assert!(
            err.contains(&format!("symc: {pass} complete")),
            "missing {pass} in: {err}"
        );
    }
}

#[test]
fn emit_infer_resolves_input_shapes() {
    let output = symc(&["--emit", "infer", "--input", "5,4,8"], &demo("reshape.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("graph main\n  x: [5, 4, 8]\n"), "stdout: {out}");
    assert!(out.contains("  y: [5, 4, 8]\n"));
    assert!(out.contains("graph flatten\n"));
    assert!(out.contains("  flat: [160]\n"));
}

#[test]
fn emit_infer_rejects_wrong_input() {
    let output = symc(&["--emit", "infer", "--input", "5,3,8"], &demo("reshape.sym"));
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("axis 1 must be 4, given 3"));

    let output = symc(&["--emit", "infer", "--input", "5,x"], &demo("reshape.sym"));
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("bad dimension 'x'"));
}

#[test]
fn switch_demo_joins_branches() {
    let output = symc(&[], &demo("switch.sym"));
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let shape_of = |name: &str| {
        out.lines()
            .find(|l| l.starts_with(&format!("  {name}: ")))
            .and_then(|l| l.split("shape=").nth(1))
            .and_then(|rest| rest.split("  ").next())
            .map(str::to_string)
    };
    assert!(out.contains("  s: switch  shape="), "stdout: {out}");
    assert_eq!(shape_of("s"), shape_of("x"), "stdout: {out}");
    assert!(out.contains("graph add\n"));
    assert!(out.contains("graph first\n"));
}
