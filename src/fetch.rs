//! Fetching the upstream package into the destination.
use crate::bundle::Bundle;
use crate::exec::{Invocation, ToolRunner};
use crate::util::remove_dir_if_present;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Replace `package_dir` with a fresh copy of `package_url`.
///
/// Any previous fetch is removed first so repeated runs start from the same
/// upstream bytes. The parent directory is created when missing.
pub fn fetch_package(
    runner: &dyn ToolRunner,
    kpt: &Path,
    package_url: &str,
    package_dir: &Path,
) -> Result<Bundle> {
    if let Some(parent) = package_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create destination {}", parent.display()))?;
    }
    if remove_dir_if_present(package_dir)
        .with_context(|| format!("remove previous package {}", package_dir.display()))?
    {
        tracing::info!(path = %package_dir.display(), "removed previously fetched package");
    }

    let invocation = Invocation::new(kpt)
        .args(["pkg", "get", package_url])
        .arg(package_dir);
    runner
        .run(&invocation)
        .with_context(|| format!("fetch package {package_url}"))?;
    Ok(Bundle::new(package_dir))
}
