//! CLI smoke tests.
//!
//! Every test runs in its own temporary directory, so the default
//! `addons/init.lua` lookup never touches a real install.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

#[allow(deprecated)]
fn bbmod(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bbmod").expect("bbmod binary should be built");
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("BBMOD_CONFIG")
        .env_remove("BBMOD_LOG_LEVEL")
        .args(["--log-level", "warn"]);
    cmd
}

fn workspace_with_init(init_lua: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("addons")).unwrap();
    std::fs::write(tmp.path().join("addons/init.lua"), init_lua).unwrap();
    tmp
}

#[test]
fn version_prints_bridge_version() {
    let tmp = TempDir::new().unwrap();
    bbmod(tmp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bbmod v3.6.0"));
}

#[test]
fn version_json_has_components() {
    let tmp = TempDir::new().unwrap();
    let output = bbmod(tmp.path())
        .args(["version", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version_string"], "v3.6.0");
    assert_eq!(value["major"], 3);
    assert_eq!(value["minor"], 6);
    assert_eq!(value["patch"], 0);
}

#[test]
fn require_version_exit_codes() {
    let tmp = TempDir::new().unwrap();
    bbmod(tmp.path())
        .args(["require-version", "3", "5", "9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
    bbmod(tmp.path())
        .args(["require-version", "3", "7", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("older than required"));
}

#[test]
fn run_prints_script_output_and_key_events() {
    let tmp = workspace_with_init(
        r#"
        print("hello from init")
        function pso.on_key_pressed(code) print("pressed", code) end
        function pso.on_key_released(code) print("released", code) end
        "#,
    );
    bbmod(tmp.path())
        .args(["run", "--frames", "2", "--frame-ms", "0", "--press", "65", "--release", "65"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("hello from init")
                .and(predicate::str::contains("pressed\t65"))
                .and(predicate::str::contains("released\t65")),
        );
}

#[test]
fn run_reports_script_errors_and_keeps_going() {
    let tmp = workspace_with_init("function pso.on_present() error('present failed') end");
    bbmod(tmp.path())
        .args(["run", "--frames", "3", "--frame-ms", "0"])
        .assert()
        .success()
        .stderr(predicate::str::contains("uncaught error").and(predicate::str::contains("present failed")));
}

#[test]
fn broken_entry_script_exits_with_status_1() {
    let tmp = workspace_with_init("error('cannot start')");
    bbmod(tmp.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Lua error: Failed to load init.lua"));
}

#[test]
fn broken_script_on_reload_exits_with_status_1() {
    let tmp = workspace_with_init(
        r#"
        function pso.on_present()
            local f = assert(io.open("addons/init.lua", "w"))
            f:write("error('broken on reload')")
            f:close()
            pso.reload()
        end
        "#,
    );
    bbmod(tmp.path())
        .args(["run", "--frames", "3", "--frame-ms", "0"])
        .assert()
        .code(1)
        .stderr(
            predicate::str::contains("Lua error: Failed to load init.lua")
                .and(predicate::str::contains("broken on reload")),
        );
}

#[test]
fn missing_entry_script_exits_with_status_1() {
    let tmp = TempDir::new().unwrap();
    bbmod(tmp.path()).arg("run").assert().code(1);
}

#[test]
fn addons_lists_directories_and_fonts() {
    let tmp = workspace_with_init("");
    for dir in ["addons/Timer", "addons/Chat", "addons/fonts", "addons/customdlls"] {
        std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
    }
    std::fs::write(tmp.path().join("addons/fonts/mono.ttf"), b"").unwrap();

    bbmod(tmp.path())
        .arg("addons")
        .assert()
        .success()
        .stdout("addon\tChat\naddon\tTimer\nfont\tmono.ttf\n");
}

#[test]
fn config_file_moves_addons_dir() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("mods/Radar")).unwrap();
    std::fs::write(tmp.path().join("bbmod.toml"), "[addons]\ndir = \"mods\"\n").unwrap();

    bbmod(tmp.path())
        .arg("addons")
        .assert()
        .success()
        .stdout(predicate::str::contains("addon\tRadar"));
}

#[test]
fn invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("bbmod.toml"), "[host]\nlanguage = \"\"\n").unwrap();

    bbmod(tmp.path())
        .arg("version")
        .assert()
        .failure()
        .stderr(predicate::str::contains("host.language"));
}
