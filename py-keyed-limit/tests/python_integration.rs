//! Builds `py_keyed_limit` into a local virtualenv with maturin and runs the pytest
//! suite in `tests/` against it. The extension module cannot be linked into a Rust
//! test binary, so this is the only way its bindings get exercised.
//!
//! Needs python3 and network access: `cargo test -p py-keyed-limit -- --ignored`

use std::process::Command;

const VENV: &str = ".venv";

fn run(program: &str, args: &[&str]) {
    let status = Command::new(program)
        .args(args)
        .status()
        .unwrap_or_else(|err| panic!("failed to spawn {program}: {err}"));
    assert!(status.success(), "{program} {args:?} exited with {status}");
}

fn venv_bin(tool: &str) -> String {
    format!("{VENV}/bin/{tool}")
}

#[test]
#[ignore = "builds the extension module with maturin"]
fn bindings_pass_pytest_suite() {
    // Relative to the py-keyed-limit directory, where cargo runs the test.
    run("python3", &["-m", "venv", VENV]);
    run(&venv_bin("pip"), &["install", "--quiet", "maturin", "pytest"]);
    run(&venv_bin("maturin"), &["develop", "--release"]);
    run(&venv_bin("pytest"), &["--quiet", "tests/test_limiters.py"]);
}
