//! End-to-end runs of the porch-deploy binary against fake tools.
#![cfg(unix)]

mod common;

use common::{stderr, FakeEnv};
use regex::Regex;
use serde_yaml::Value;
use std::fs;

const ALL_TOOLS: [&str; 3] = ["kpt", "yq", "kind"];

fn controllers_env(env: &FakeEnv) -> Vec<(String, String)> {
    let doc: Value =
        serde_yaml::from_str(&env.read_package_file("9-controllers.yaml")).expect("parse yaml");
    doc["spec"]["template"]["spec"]["containers"][0]["env"]
        .as_sequence()
        .expect("env list")
        .iter()
        .map(|entry| {
            (
                entry["name"].as_str().unwrap_or_default().to_string(),
                entry["value"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[test]
fn missing_destination_prints_usage() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let args: Vec<String> = env.required_args().into_iter().skip(2).collect();
    let output = env.run(&args);

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("--destination"), "stderr: {stderr}");
    assert!(stderr.contains("Usage:"), "stderr: {stderr}");
    assert!(env.tool_calls().is_empty());
}

#[test]
fn unknown_flag_is_rejected() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&["--bogus", "value"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--bogus"));
    assert!(!env.destination.exists());
}

#[test]
fn parse_errors_are_reported_by_clap_with_exit_one() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&["--skip-kind-load", "maybe"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.starts_with("error:"), "stderr: {stderr}");
    assert!(stderr.contains("maybe"), "stderr: {stderr}");
    assert!(env.tool_calls().is_empty());
}

#[test]
fn empty_required_value_prints_usage() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let mut args = env.required_args();
    args[3] = String::new();
    let output = env.run(&args);
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("--server-image must not be empty"), "stderr: {stderr}");
    assert!(stderr.contains("Usage:"));
}

#[test]
fn missing_required_tool_fails_before_side_effects() {
    let env = FakeEnv::with_tools(&["yq", "kind"]);
    let output = env.run_with(&[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not found on PATH: kpt"));
    assert!(env.tool_calls().is_empty());
    assert!(!env.destination.exists());
}

#[test]
fn default_run_skips_kind_load() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&["--patch-backend", "local"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("skipping kind image load"));
    let calls = env.tool_calls();
    assert!(calls.iter().all(|call| !call.starts_with("kind ")), "{calls:?}");
}

#[test]
fn image_load_without_kind_fails_at_load_step() {
    let env = FakeEnv::with_tools(&["kpt", "yq"]);
    let output = env.run_with(&[
        "--skip-kind-load",
        "false",
        "--test-git-server-image",
        "myrepo/test-git-server:custom",
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("kind not found on PATH"));
    assert!(env.tool_calls().is_empty(), "fetch must not run after a failed load");
}

#[test]
fn images_load_in_order_before_fetch() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&[
        "--skip-kind-load=false",
        "--test-git-server-image",
        "myrepo/test-git-server:custom",
        "--kind-context",
        "porch-test",
        "--patch-backend",
        "local",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let calls = env.tool_calls();
    let expected_loads: Vec<String> = [
        "myrepo/server:custom",
        "myrepo/controllers:custom",
        "myrepo/function-runner:custom",
        "myrepo/wrapper-server:custom",
        "myrepo/test-git-server:custom",
    ]
    .iter()
    .map(|image| format!("kind load docker-image {image} --name porch-test"))
    .collect();
    assert_eq!(&calls[..5], expected_loads.as_slice());
    assert!(calls[5].starts_with("kpt pkg get "), "{calls:?}");
}

#[test]
fn kind_load_failure_aborts_pipeline() {
    let env = FakeEnv::with_tools(&ALL_TOOLS).fail_on("kind load docker-image");
    let output = env.run_with(&[
        "--skip-kind-load",
        "false",
        "--test-git-server-image",
        "myrepo/test-git-server:custom",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(env.tool_calls().len(), 1);
    assert!(!env.package_dir().exists());
}

#[test]
fn local_backend_patches_package() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&["--enabled-reconcilers=a,b", "--patch-backend", "local"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert_eq!(
        controllers_env(&env),
        vec![
            ("ENABLE_A".to_string(), "true".to_string()),
            ("ENABLE_B".to_string(), "true".to_string()),
        ]
    );

    let server = env.read_package_file("3-porch-server.yaml");
    assert!(server.contains("myrepo/server:custom"));
    assert!(server.contains("--cache-type=CR"));
    assert!(!server.contains("wait-for-postgres"));
    assert!(!server.contains("envFrom"));
    assert!(server.contains("cache-type: CR"));

    let runner = env.read_package_file("2-function-runner.yaml");
    assert!(runner.contains("myrepo/function-runner:custom"));
    assert!(runner.contains("--wrapper-server-image=myrepo/wrapper-server:custom"));

    let upstream = Regex::new(r"docker\.io/nephio/porch-[a-z-]+:(latest|v3\.0\.0)").expect("regex");
    for (name, bytes) in env.snapshot() {
        let content = String::from_utf8_lossy(&bytes);
        assert!(!upstream.is_match(&content), "{name} still references upstream images");
    }
    assert!(!env.package_dir().join("4-porch-postgres.yaml").exists());

    let calls = env.tool_calls();
    assert_eq!(
        calls.last().map(String::as_str),
        Some(format!("kpt fn render {}", env.package_dir().display()).as_str())
    );
}

#[test]
fn stale_postgres_manifests_do_not_survive() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    fs::create_dir_all(env.package_dir()).expect("create stale package");
    fs::write(
        env.package_dir().join("old-porch-postgres-pvc.yaml"),
        "kind: PersistentVolumeClaim\n",
    )
    .expect("write stale file");

    let output = env.run_with(&["--patch-backend", "local"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let leftovers: Vec<String> = env
        .snapshot()
        .into_keys()
        .filter(|name| name.contains("porch-postgres") && name.ends_with(".yaml"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn rerun_produces_identical_package() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let args = ["--enabled-reconcilers", "a,b", "--patch-backend", "local"];

    let first = env.run_with(&args);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let once = env.snapshot();

    let second = env.run_with(&args);
    assert!(second.status.success(), "stderr: {}", stderr(&second));
    assert_eq!(env.snapshot(), once);
}

#[test]
fn kpt_backend_runs_functions_then_renders() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let calls = env.tool_calls();
    let evals: Vec<&String> = calls
        .iter()
        .filter(|call| call.starts_with("kpt fn eval "))
        .collect();
    assert_eq!(evals.len(), 7, "{calls:?}");
    assert!(evals[0].contains("--match-name porch-controllers"));
    assert!(evals[0].contains("gcr.io/kpt-fn/starlark"));
    assert!(evals[1].contains("--match-name porch-server-config"));
    assert!(evals[2].contains("--match-name porch-server "));
    assert!(evals[3].contains("gcr.io/kpt-fn/search-replace"));
    assert!(evals[3].contains("put-value=${1}myrepo/server:custom${2}"));
    assert!(calls
        .last()
        .is_some_and(|call| call.starts_with("kpt fn render ")));

    // File removal runs in-process with either backend.
    assert!(!env.package_dir().join("4-porch-postgres.yaml").exists());
}

#[test]
fn tool_failure_exits_non_zero() {
    let env = FakeEnv::with_tools(&ALL_TOOLS).fail_on("kpt fn render");
    let output = env.run_with(&["--patch-backend", "local"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("render package"), "stderr: {stderr}");
    assert!(stderr.contains("kpt: injected failure"), "stderr: {stderr}");
}

#[test]
fn live_apply_initializes_and_applies() {
    let env = FakeEnv::with_tools(&ALL_TOOLS);
    let output = env.run_with(&["--patch-backend", "local", "--live-apply", "true"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let calls = env.tool_calls();
    let tail: Vec<&str> = calls
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|call| call.split_whitespace().take(3).collect::<Vec<_>>().join(" "))
        .map(|call| match call.as_str() {
            "kpt fn render" => "render",
            "kpt live init" => "init",
            "kpt live apply" => "apply",
            _ => "other",
        })
        .collect();
    assert_eq!(tail, vec!["render", "init", "apply"]);
}
