use std::process::Command;

#[test]
fn demo_battle_prints_one_line_per_tick() {
    let output = Command::new(env!("CARGO_BIN_EXE_skirmish"))
        .args(["--ticks", "12", "--seed", "7"])
        .output()
        .expect("failed to run skirmish binary");

    assert!(output.status.success(), "skirmish exited with {}", output.status);
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    let ticks = stdout.lines().filter(|line| line.starts_with("tick ")).count();
    assert_eq!(ticks, 12);
    assert!(stdout.contains("final state at tick 12:"));
}

#[test]
fn missing_config_file_is_reported() {
    let output = Command::new(env!("CARGO_BIN_EXE_skirmish"))
        .args(["--config", "does/not/exist.json"])
        .output()
        .expect("failed to run skirmish binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does/not/exist.json"), "stderr: {stderr}");
}
