use std::process::Command;

fn crew_run() -> Command {
    Command::new(env!("CARGO_BIN_EXE_crew-run"))
}

#[test]
fn dry_run_describes_without_running() {
    let output = crew_run()
        .args([
            "--dry-run",
            "-C",
            "/nowhere",
            "-e",
            "A=1",
            "-e",
            "B=2",
            "--",
            "bash",
            "-c",
            "echo side-effect",
        ])
        .output()
        .expect("spawn crew-run");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("DRY: bash -c echo side-effect"), "{err}");
    assert!(err.contains("\t- executing from directory: /nowhere"), "{err}");
    assert!(err.contains("\t- overriding 2 environment variables"), "{err}");
}

#[test]
fn verbose_logs_and_runs() {
    let output = crew_run()
        .args(["-v", "--", "bash", "-c", "echo ran"])
        .output()
        .expect("spawn crew-run");
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "ran\n");
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("LOG: bash -c echo ran"), "{err}");
}

#[test]
fn fatal_policy_exits_one_with_a_diagnostic() {
    let output = crew_run()
        .args(["bash", "-c", "exit 7"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("failed with non-zero exit status: 7"), "{err}");
}

#[test]
fn return_policy_propagates_the_exit_code() {
    let output = crew_run()
        .args(["--on-error", "return", "bash", "-c", "exit 7"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(7));
    assert!(output.stderr.is_empty());
}

#[test]
fn pty_mode_merges_the_child_streams() {
    let output = crew_run()
        .args(["--pty", "bash", "-c", "echo two 1>&2; echo one"])
        .output()
        .expect("spawn crew-run");
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "two\r\none\r\n");
    assert!(output.stderr.is_empty());
}

#[test]
fn exec_mode_replaces_the_process() {
    let output = crew_run()
        .args(["--exec", "bash", "-c", "echo hi; exit 5"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(5));
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "hi\n");
}

#[test]
fn env_overrides_apply_last_write_wins() {
    let output = crew_run()
        .args([
            "-e",
            "CREW_CLI_VALUE=a",
            "-e",
            "CREW_CLI_VALUE=b",
            "--",
            "bash",
            "-c",
            "printf '%s' \"$CREW_CLI_VALUE\"",
        ])
        .output()
        .expect("spawn crew-run");
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "b");
}

#[test]
fn unknown_option_is_rejected() {
    let output = crew_run()
        .args(["--bogus", "true"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("unknown option: --bogus"), "{err}");
}

#[test]
fn missing_command_is_rejected() {
    let output = crew_run().arg("--dry-run").output().expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("no command given"), "{err}");
}

#[test]
fn conflicting_run_modes_are_rejected() {
    let output = crew_run()
        .args(["--pty", "--exec", "true"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("mutually exclusive"), "{err}");
}

#[test]
fn malformed_env_override_is_rejected() {
    let output = crew_run()
        .args(["-e", "NOEQUALS", "true"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.contains("expected K=V"), "{err}");
}

#[test]
fn double_dash_passes_flag_like_arguments_through() {
    let output = crew_run()
        .args(["--on-error", "return", "--", "bash", "-c", "exit 0"])
        .output()
        .expect("spawn crew-run");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn help_prints_usage() {
    let output = crew_run().arg("--help").output().expect("spawn crew-run");
    assert!(output.status.success());
    let out = String::from_utf8(output.stdout).unwrap();
    assert!(out.contains("usage: crew-run"), "{out}");
}
