use assert_cmd::Command;
use dockspec::test_utils::SpecDir;
use predicates::prelude::*;

/// Binary isolated from the user's configuration and credentials.
fn dockspec(specs: &SpecDir) -> Command {
    let mut cmd = Command::cargo_bin("dockspec").unwrap();
    cmd.env("DOCKSPEC_CONFIG", specs.path().join("no-config.toml"))
        .env_remove("DOCKSPEC_SPECS")
        .env_remove("DOCKSPEC_GIT_LOGIN")
        .env_remove("DOCKSPEC_GIT_PASSWORD")
        .env_remove("RUST_LOG")
        .arg("--spec-dir")
        .arg(specs.path());
    cmd
}

fn fixture() -> SpecDir {
    let specs = SpecDir::new().unwrap();
    specs.write("base", "FROM ubuntu:22.04\nAPT curl\n").unwrap();
    specs.write("app", "PARENT base\nCONDA numpy;conda-forge\nPIP tqdm\n").unwrap();
    specs
}

#[test]
fn test_generate_writes_dockerfile() {
    let specs = fixture();
    let out = specs.scratch("ctx").unwrap();

    dockspec(&specs)
        .args(["generate", "app", "--skip-tos", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated").and(predicate::str::contains("app -> base")));

    let dockerfile = std::fs::read_to_string(out.join("Dockerfile")).unwrap();
    assert!(dockerfile.starts_with("FROM ubuntu:22.04\n"));
    assert!(dockerfile.contains("apt-get install -y curl"));
    assert!(dockerfile.contains("RUN conda install -y -c conda-forge numpy\n"));
    assert!(dockerfile.ends_with("RUN pip install tqdm\n"));
    assert!(!dockerfile.contains("tos accept"));
    assert!(!out.join("dockspec_staging").exists());
}

#[test]
fn test_generate_custom_dockerfile_name() {
    let specs = fixture();
    let out = specs.scratch("ctx").unwrap();

    dockspec(&specs)
        .args(["generate", "base", "--dockerfile", "Dockerfile.base", "--no-conda-update", "-o"])
        .arg(&out)
        .assert()
        .success();

    let dockerfile = std::fs::read_to_string(out.join("Dockerfile.base")).unwrap();
    assert!(!dockerfile.contains("conda update"));
}

#[test]
fn test_generate_missing_spec_fails() {
    let specs = fixture();
    let out = specs.scratch("ctx").unwrap();

    dockspec(&specs)
        .args(["generate", "nope", "-o"])
        .arg(&out)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nope.docker_spec"));
    assert!(!out.join("Dockerfile").exists());
}

#[test]
fn test_login_without_password_fails() {
    let specs = fixture();
    let out = specs.scratch("ctx").unwrap();

    dockspec(&specs)
        .args(["generate", "app", "--login", "alice", "-o"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DOCKSPEC_GIT_PASSWORD"));
}

#[test]
fn test_list_specs() {
    let specs = fixture();
    dockspec(&specs)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::diff("app\nbase\n"));
}

#[test]
fn test_show_json() {
    let specs = fixture();
    let output = dockspec(&specs).args(["show", "app", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["chain"], serde_json::json!(["app", "base"]));
}

#[test]
fn test_show_text() {
    let specs = fixture();
    dockspec(&specs)
        .args(["show", "app"])
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("FROM ubuntu:22.04")
                .and(predicate::str::contains("CONDA numpy[conda-forge]"))
                .and(predicate::str::contains("PIP tqdm")),
        );
}

#[test]
fn test_unknown_flag_suggests_keyword() {
    let specs = SpecDir::new().unwrap();
    specs.write("typo", "FROM ubuntu:22.04\nCONDAA numpy\n").unwrap();

    dockspec(&specs)
        .args(["show", "typo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONDAA"));
}
