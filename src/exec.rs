//! External process execution.
//!
//! Every delegated operation goes through `ToolRunner` so orchestration can be
//! exercised with a recording fake instead of real binaries.
use crate::util::display_command;
use anyhow::{anyhow, Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Command;

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn display(&self) -> String {
        display_command(&self.program, &self.args)
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

pub trait ToolRunner {
    /// Run the command to completion, failing on a non-zero exit.
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Runs commands as child processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        tracing::debug!(command = %invocation.display(), "running external command");
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .with_context(|| format!("spawn {}", invocation.program_name()))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {status}", invocation.program_name()));
        }
        Ok(())
    }
}
