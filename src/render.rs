//! Rendering the patched package and, on request, applying it live.
use crate::bundle::Bundle;
use crate::exec::{Invocation, ToolRunner};
use anyhow::{Context, Result};
use std::path::Path;

/// Inventory file written by `kpt live init`.
pub const INVENTORY_FILE: &str = "resourcegroup.yaml";
pub const RECONCILE_TIMEOUT: &str = "2m";

/// Run the package's function pipeline in place without touching a cluster.
pub fn render_package(runner: &dyn ToolRunner, kpt: &Path, bundle: &Bundle) -> Result<()> {
    let invocation = Invocation::new(kpt)
        .args(["fn", "render"])
        .arg(bundle.root());
    runner
        .run(&invocation)
        .with_context(|| format!("render package {}", bundle.root().display()))
}

/// Apply the package to the current kube context, creating its inventory first.
pub fn apply_live(runner: &dyn ToolRunner, kpt: &Path, bundle: &Bundle) -> Result<()> {
    if bundle.root().join(INVENTORY_FILE).is_file() {
        tracing::info!("package inventory already initialized");
    } else {
        let init = Invocation::new(kpt)
            .args(["live", "init"])
            .arg(bundle.root());
        runner
            .run(&init)
            .with_context(|| format!("initialize inventory for {}", bundle.root().display()))?;
    }

    let apply = Invocation::new(kpt)
        .args(["live", "apply"])
        .arg(bundle.root())
        .arg(format!("--reconcile-timeout={RECONCILE_TIMEOUT}"))
        .arg("--output=table");
    runner
        .run(&apply)
        .with_context(|| format!("apply package {}", bundle.root().display()))
}
