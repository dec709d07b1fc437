//! CLI end-to-end tests.
//!
//! These drive the real `lotusc` binary. Everything runs with `-S` or
//! a dump flag so no external gcc is required.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn lotusc() -> Command {
    Command::cargo_bin("lotusc").expect("lotusc binary")
}

fn write_source(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write source");
    path
}

#[test]
fn test_version() {
    lotusc()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lotusc"));
}

#[test]
fn test_no_input_is_cli_error() {
    lotusc()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no input file"));
}

#[test]
fn test_unknown_flag_is_cli_error() {
    lotusc().arg("--frobnicate").assert().code(2);
}

#[test]
fn test_docs_prints_modules() {
    lotusc()
        .arg("-docs")
        .assert()
        .success()
        .stdout(predicate::str::contains("collections"))
        .stdout(predicate::str::contains("map_put"));
}

#[test]
fn test_docs_section_filters() {
    lotusc()
        .args(["-docs-section", "net"])
        .assert()
        .success()
        .stdout(predicate::str::contains("connect_ipv4"))
        .stdout(predicate::str::contains("socket"));
}

#[test]
fn test_docs_unknown_section() {
    lotusc().args(["-docs-section", "nosuch"]).assert().code(2);
}

#[test]
fn test_token_dump() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "t.lts", "int x = 42;\n");

    lotusc()
        .arg("-td")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Int"))
        .stdout(predicate::str::contains("IntLit \"42\""))
        .stdout(predicate::str::contains("Eof"));
}

#[test]
fn test_ast_dump() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "t.lts", "fn int main() { ret 0; }\n");

    lotusc()
        .arg("--ast-dump")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("FunctionDef"))
        .stdout(predicate::str::contains("main"));
}

#[test]
fn test_emit_asm_hello_world() {
    let dir = TempDir::new().unwrap();
    let input = write_source(
        &dir,
        "hello.lts",
        "use \"io\";\nfn int main() { println(\"Hello, World!\"); ret 0; }\n",
    );
    let output = dir.path().join("hello.out");

    lotusc()
        .arg("-S")
        .arg("-o")
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let asm_path = output.with_extension("s");
    assert!(asm_path.exists(), "assembly file should exist");
    let asm = std::fs::read_to_string(&asm_path).unwrap();
    assert!(asm.contains(".asciz \"Hello, World!\""));
    assert!(asm.contains("call .main"));
    assert!(asm.contains("syscall"));
}

#[test]
fn test_emit_asm_empty_source_exits_zero() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "empty.lts", "");
    let output = dir.path().join("empty.bin");

    lotusc()
        .arg("-S")
        .arg("-o")
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let asm = std::fs::read_to_string(output.with_extension("s")).unwrap();
    assert!(asm.contains("movq $60, %rax"));
    // exit status 0: the zeroed %rdi survives the peephole as xor
    assert!(asm.contains("xorq %rdi, %rdi") || asm.contains("movq $0, %rdi"));
}

#[test]
fn test_arithmetic_folds_to_constant() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "arith.lts", "int x = 2 + 3 * 4;\nret x;\n");
    let output = dir.path().join("arith.bin");

    lotusc()
        .arg("-S")
        .arg("-o")
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let asm = std::fs::read_to_string(output.with_extension("s")).unwrap();
    // after optimization the initializer is a single constant
    assert!(asm.contains("movq $14, %rax"));
    assert!(!asm.contains("imulq"));
}

#[test]
fn test_lexical_error_fails_with_diagnostic() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "bad.lts", "int @x = 1;\n");

    lotusc()
        .arg("-S")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unexpected character"));
}

#[test]
fn test_parse_error_has_location_and_caret() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "bad.lts", "int x = 1\nint y = 2;\n");

    lotusc()
        .arg("-S")
        .arg("--no-color")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error[E0204]"))
        .stderr(predicate::str::contains("bad.lts"))
        .stderr(predicate::str::contains("^"));
}

#[test]
fn test_undeclared_variable_suggestion() {
    let dir = TempDir::new().unwrap();
    let input = write_source(
        &dir,
        "typo.lts",
        "fn int main() { int counter = 1; ret countr; }\n",
    );

    lotusc()
        .arg("-S")
        .arg("--no-color")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("undeclared"))
        .stderr(predicate::str::contains("did you mean `counter`?"));
}

#[test]
fn test_shadow_warning_only_with_flag() {
    let source = "fn int main() {\n    int x = 1;\n    if x > 0 {\n        int x = 2;\n        x = x + 1;\n    }\n    ret x;\n}\n";

    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "shadow.lts", source);
    let output = dir.path().join("shadow.bin");

    // With -Wshadow: exactly one shadow warning, still succeeds.
    let assert = lotusc()
        .arg("-S")
        .arg("-Wshadow")
        .arg("--no-color")
        .arg("-o")
        .arg(&output)
        .arg(&input)
        .assert()
        .success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert_eq!(stderr.matches("shadows an outer declaration").count(), 1);
    assert!(stderr.contains("line 2"));

    // Without: silence.
    let assert = lotusc()
        .arg("-S")
        .arg("--no-color")
        .arg("-o")
        .arg(&output)
        .arg(&input)
        .assert()
        .success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(!stderr.contains("shadow"));
}

#[test]
fn test_werror_promotes_warning_to_failure() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "unused.lts", "fn int main() { int idle = 1; ret 0; }\n");

    lotusc()
        .arg("-S")
        .arg("-Wunused")
        .arg("-Werror")
        .arg(&input)
        .assert()
        .code(1);

    // Same source without -Werror compiles.
    lotusc()
        .arg("-S")
        .arg("-Wunused")
        .arg("-o")
        .arg(dir.path().join("unused.bin"))
        .arg(&input)
        .assert()
        .success();
}

#[test]
fn test_suppress_all_warnings() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "w.lts", "fn int main() { int idle = 1; ret 0; }\n");

    let assert = lotusc()
        .arg("-S")
        .arg("-Wall")
        .arg("-w")
        .arg("-o")
        .arg(dir.path().join("w.bin"))
        .arg(&input)
        .assert()
        .success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(!stderr.contains("unused"));
}

#[test]
fn test_stats_output() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "s.lts", "int x = 1;\nret x;\n");

    lotusc()
        .arg("-S")
        .arg("--stats")
        .arg("-o")
        .arg(dir.path().join("s.bin"))
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("tokens:"))
        .stdout(predicate::str::contains("ast nodes:"))
        .stdout(predicate::str::contains("assembly lines:"));
}

#[test]
fn test_try_throw_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_source(
        &dir,
        "try.lts",
        "fn int main() { try { ret 1; } catch { ret 2; } ret 0; }\n",
    );

    lotusc()
        .arg("-S")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not supported"));
}

#[test]
fn test_peephole_applies_to_output() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "p.lts", "fn int main() { int x = 0; ret x; }\n");
    let output = dir.path().join("p.bin");

    lotusc()
        .arg("-S")
        .arg("-o")
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let asm = std::fs::read_to_string(output.with_extension("s")).unwrap();
    // the zero store went through the xor rewrite
    assert!(asm.contains("xorq %rax, %rax"));
    // no store/reload pair survives for the ret
    assert!(!asm.contains("movq %rax, %rax"));
}
