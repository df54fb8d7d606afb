//! Shared test infrastructure for integration tests.
//!
//! Each test gets a private PATH holding shell-script stand-ins for `kpt`,
//! `yq` and `kind`. The scripts log their argv and `kpt pkg get` copies the
//! fixture package into place, so the real binary runs end to end offline.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FAKE_TOOL: &str = r#"#!/bin/sh
PATH=/usr/bin:/bin
export PATH
printf '%s\n' "__TOOL__ $*" >> "$FAKE_TOOL_LOG"
if [ -n "$FAKE_FAIL" ] && [ "$FAKE_FAIL" = "__TOOL__ $1 $2" ]; then
  echo "__TOOL__: injected failure" >&2
  exit 3
fi
if [ "__TOOL__ $1 $2" = "kpt pkg get" ]; then
  mkdir -p "$4"
  cp -R "$FAKE_PACKAGE"/. "$4"/
fi
exit 0
"#;

/// Isolated workspace with fake tools and a destination directory.
pub struct FakeEnv {
    _temp: TempDir,
    pub bin_dir: PathBuf,
    pub log: PathBuf,
    pub destination: PathBuf,
    fail: Option<String>,
}

impl FakeEnv {
    /// Create a workspace exposing only the named tools on PATH.
    pub fn with_tools(tools: &[&str]) -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        let bin_dir = temp.path().join("bin");
        fs::create_dir_all(&bin_dir).expect("create bin dir");
        for tool in tools {
            let path = bin_dir.join(tool);
            fs::write(&path, FAKE_TOOL.replace("__TOOL__", tool)).expect("write fake tool");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("mark fake tool executable");
        }
        let log = temp.path().join("tools.log");
        let destination = temp.path().join("deploy");
        Self {
            _temp: temp,
            bin_dir,
            log,
            destination,
            fail: None,
        }
    }

    /// Make the fake tool invocation `"<tool> <arg1> <arg2>"` exit non-zero.
    pub fn fail_on(mut self, invocation: &str) -> Self {
        self.fail = Some(invocation.to_string());
        self
    }

    pub fn package_dir(&self) -> PathBuf {
        self.destination.join("porch")
    }

    /// Required flags with test image references.
    pub fn required_args(&self) -> Vec<String> {
        vec![
            "--destination".to_string(),
            self.destination.display().to_string(),
            "--server-image".to_string(),
            "myrepo/server:custom".to_string(),
            "--controllers-image".to_string(),
            "myrepo/controllers:custom".to_string(),
            "--function-image".to_string(),
            "myrepo/function-runner:custom".to_string(),
            "--wrapper-server-image".to_string(),
            "myrepo/wrapper-server:custom".to_string(),
        ]
    }

    pub fn run(&self, args: &[String]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_porch-deploy"));
        command
            .args(args)
            .env("PATH", &self.bin_dir)
            .env("RUST_LOG", "info")
            .env("FAKE_TOOL_LOG", &self.log)
            .env("FAKE_PACKAGE", fixture_package());
        match &self.fail {
            Some(invocation) => command.env("FAKE_FAIL", invocation),
            None => command.env_remove("FAKE_FAIL"),
        };
        command.output().expect("run porch-deploy")
    }

    /// Run with the required flags followed by `extra`.
    pub fn run_with(&self, extra: &[&str]) -> Output {
        let mut args = self.required_args();
        args.extend(extra.iter().map(|arg| arg.to_string()));
        self.run(&args)
    }

    /// Fake tool invocations in call order.
    pub fn tool_calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Relative path to bytes for every file in the fetched package.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let root = self.package_dir();
        let mut files = BTreeMap::new();
        collect_files(&root, &root, &mut files);
        files
    }

    pub fn read_package_file(&self, name: &str) -> String {
        fs::read_to_string(self.package_dir().join(name))
            .unwrap_or_else(|err| panic!("read {name}: {err}"))
    }
}

pub fn fixture_package() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
        .join("tests")
        .join("fixtures")
        .join("porch-pkg")
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn collect_files(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(dir).expect("read package dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect_files(root, &path, files);
        } else {
            let relative = path
                .strip_prefix(root)
                .expect("path under root")
                .display()
                .to_string();
            files.insert(relative, fs::read(&path).expect("read package file"));
        }
    }
}
