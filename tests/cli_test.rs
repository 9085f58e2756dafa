use assert_cmd::Command;
use predicates::prelude::*;

fn pd_deal() -> Command {
    let mut cmd = Command::cargo_bin("pd-deal").unwrap();
    cmd.env_remove("PDTOKEN").env_remove("RUST_LOG");
    cmd
}

#[test]
fn filter_and_ids_are_mutually_exclusive() {
    pd_deal()
        .args(["--token", "t", "--filter", "3", "674"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "filter and explicit dealIDs are mutually exclusive",
        ));
}

#[test]
fn missing_token_exits_with_one() {
    pd_deal()
        .arg("674")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("PDTOKEN"));
}

#[test]
fn bad_deal_ids_exit_with_one() {
    pd_deal()
        .args(["--token", "t", "12", "abc"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid deal id 'abc'"));

    pd_deal()
        .args(["--token", "t", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("DealID 0 not allowed"));
}

#[test]
fn bad_template_exits_with_one() {
    pd_deal()
        .args(["--token", "t", "--template", "{{.id", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unclosed action"));
}

#[test]
fn unknown_flag_exits_with_one() {
    pd_deal().arg("--bogus").assert().code(1);
}

#[test]
fn touch_requires_deal_ids() {
    Command::cargo_bin("pd-touch")
        .unwrap()
        .env_remove("PDTOKEN")
        .args(["--token", "t"])
        .assert()
        .code(1);
}

#[test]
fn flow_rejects_zero_workers() {
    Command::cargo_bin("pd-flow")
        .unwrap()
        .env_remove("PDTOKEN")
        .args(["--token", "t", "--pipeline", "Sales", "--workers", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("workers must be > 0"));
}

#[test]
fn invalid_config_file_exits_with_one() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("config.yaml");
    std::fs::write(&path, "fetch:\n  workers: 0\n").unwrap();
    Command::cargo_bin("pd-fields")
        .unwrap()
        .env_remove("PDTOKEN")
        .args(["--token", "t", "--config"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("fetch.workers"));
}
