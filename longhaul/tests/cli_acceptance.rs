use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    work: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let work = base.join("work");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&work).expect("failed to create working directory");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_session_fixture(&work.join("analysis_sessions"));

        Self {
            _temp_dir: temp_dir,
            home,
            work,
            xdg_config,
            xdg_state,
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.work.join("analysis_sessions")
    }
}

fn seed_session_fixture(dir: &Path) {
    fs::create_dir_all(dir).expect("failed to create sessions dir");
    let session = serde_json::json!({
        "session_id": "20241101_192023",
        "task": "Estimate the maintenance cost of tidal turbines",
        "iterations": [
            {
                "timestamp": "2024-11-01T19:21:05.482913",
                "type": "analysis",
                "content": "## First pass\n\n- corrosion\n- **biofouling**"
            },
            {
                "timestamp": "2024-11-01T19:22:40.000100",
                "type": "system_prompt_update",
                "content": "focus on Y"
            }
        ],
        "start_time": "2024-11-01T19:20:23.104512",
        "status": "in_progress"
    });
    fs::write(
        dir.join("20241101_192023.json"),
        serde_json::to_string_pretty(&session).expect("serialize fixture"),
    )
    .expect("failed to write session fixture");
}

fn run_bin(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> Output {
    let bin_path = match bin_name {
        "longhaul-report" => PathBuf::from(assert_cmd::cargo::cargo_bin!("longhaul-report")),
        "longhaul-server" => PathBuf::from(assert_cmd::cargo::cargo_bin!("longhaul-server")),
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    let mut command = Command::new(bin_path);

    command
        .args(args)
        .current_dir(&env.work)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute {bin_name}: {e}"))
}

fn assert_success(bin_name: &str, args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "{bin_name} {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn report_renders_session_file() {
    let env = CliTestEnv::new();
    let session_file = env.sessions_dir().join("20241101_192023.json");
    let session_arg = session_file.to_string_lossy().into_owned();
    let args = [session_arg.as_str(), "--output", "tides.html"];

    let output = run_bin(&env, "longhaul-report", &args);
    assert_success("longhaul-report", &args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("(2 iterations, 1 analyses) generated at: tides.html"),
        "unexpected stdout:\n{stdout}"
    );

    let html = fs::read_to_string(env.work.join("tides.html")).expect("report written");
    assert!(html.contains("<strong>Session ID:</strong> 20241101_192023"));
    assert!(html.contains("<strong>Start Time:</strong> 2024-11-01 19:20:23"));
    assert!(html.contains("2024-11-01 19:21:05"));
    assert!(html.contains("<h2>First pass</h2>"));
    assert!(html.contains("<strong>biofouling</strong>"));
    assert!(html.contains("<p>focus on Y</p>"));
}

#[test]
fn report_by_session_id_uses_default_output() {
    let env = CliTestEnv::new();
    let args = ["--session-id", "20241101_192023"];

    let output = run_bin(&env, "longhaul-report", &args);
    assert_success("longhaul-report", &args, &output);

    assert!(env.work.join("analysis_report.html").exists());
}

#[test]
fn report_lists_sessions() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, "longhaul-report", &["--list"]);
    assert_success("longhaul-report", &["--list"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "20241101_192023");
}

#[test]
fn report_unknown_session_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, "longhaul-report", &["--session-id", "19990101_000000"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("session not found"), "stderr:\n{stderr}");
    assert!(!env.work.join("analysis_report.html").exists());
}

#[test]
fn server_refuses_to_start_without_api_key() {
    let env = CliTestEnv::new();
    let args = ["--bind", "127.0.0.1:0"];

    let output = run_bin(&env, "longhaul-server", &args);
    assert!(!output.status.success(), "server should exit without a key");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("ANTHROPIC_API_KEY"),
        "expected missing key message, got:\n{stderr}"
    );
}
