use assert_cmd::Command;
use predicates::prelude::*;

fn sandtree(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("sandtree").expect("binary exists");
    cmd.env("SANDTREE_DATA_DIR", data_dir)
        .env("SANDTREE_LOG", "off");
    cmd
}

#[test]
fn help_displays_usage() {
    Command::cargo_bin("sandtree")
        .expect("binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("snapshot"));
}

#[test]
fn snapshot_prints_tree_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/index.js"), "console.log(1)").unwrap();

    sandtree(dir.path())
        .arg("snapshot")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"src":{"directory":{"index.js":{"file":{"contents":"console.log(1)"}}}}}"#,
        ));
}

#[test]
fn templates_can_be_created_listed_and_deleted() {
    let data = tempfile::tempdir().unwrap();

    let output = sandtree(data.path())
        .args(["templates", "new", "demo", "--kind", "python", "--owner", "u1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8(output.stdout).unwrap().trim().to_owned();
    assert!(!id.is_empty());

    sandtree(data.path())
        .args(["templates", "list", "--owner", "u1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(id.as_str())
                .and(predicate::str::contains("\tpython\t"))
                .and(predicate::str::contains("\tprivate\n")),
        );

    sandtree(data.path())
        .args(["templates", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("print('Hello WebContainers!')"));

    sandtree(data.path())
        .args(["templates", "delete", &id])
        .assert()
        .success();

    sandtree(data.path())
        .args(["templates", "show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
