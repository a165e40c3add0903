use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn bridge_cmd(root: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("bridge").expect("binary built");
    cmd.arg("--project-root").arg(root);
    cmd
}

#[test]
fn doctor_json_reports_a_status_field() {
    let td = tempdir().unwrap();
    let mut cmd = bridge_cmd(td.path());
    cmd.args(["doctor", "--json"]);
    let output = cmd.output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"status\""));
}

#[test]
fn state_get_without_an_existing_bridge_fails() {
    let td = tempdir().unwrap();
    let mut cmd = bridge_cmd(td.path());
    cmd.args(["state", "get", "metrics.sprints_executed"]);
    cmd.assert().failure();
}

#[test]
fn vision_list_on_an_empty_registry_says_so() {
    let td = tempdir().unwrap();
    let mut cmd = bridge_cmd(td.path());
    cmd.args(["vision", "list"]);
    cmd.assert().success().stdout(contains("no visions captured yet"));
}

#[test]
fn guard_check_blocks_unknown_command_in_autonomous_mode() {
    let td = tempdir().unwrap();
    let mut cmd = bridge_cmd(td.path());
    cmd.env("LOA_RUN_MODE", "autonomous");
    cmd.args(["guard", "rm -rf /"]);
    cmd.assert().failure().stdout(contains("\"decision\": \"BLOCK\""));
}

#[test]
fn guard_check_warns_and_allows_unknown_command_interactively() {
    let td = tempdir().unwrap();
    let mut cmd = bridge_cmd(td.path());
    cmd.env_remove("LOA_RUN_MODE");
    cmd.env_remove("CLAWDBOT_GATEWAY_TOKEN");
    cmd.env_remove("LOA_OPERATOR");
    cmd.args(["guard", "ls -la"]);
    cmd.assert().success().stdout(contains("\"decision\": \"WARN\""));
}

#[test]
fn completions_emit_a_script_for_bash() {
    let td = tempdir().unwrap();
    let mut cmd = bridge_cmd(td.path());
    cmd.args(["completions", "bash"]);
    cmd.assert().success().stdout(contains("bridge"));
}
