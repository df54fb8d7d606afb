//! Validated deployment configuration.
//!
//! `DeployConfig` is built once from parsed flags and never mutated afterwards.
use crate::cli::{PatchBackend, RootArgs};
use crate::images::{ImageRole, ImageSet};
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Name of the directory the package lands in under the destination.
pub const PACKAGE_DIR_NAME: &str = "porch";

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub destination: PathBuf,
    pub images: ImageSet,
    pub reconcilers: Vec<String>,
    pub kind_context: String,
    pub skip_kind_load: bool,
    pub package_url: String,
    pub patch_backend: PatchBackend,
    pub live_apply: bool,
}

impl DeployConfig {
    pub fn from_args(args: RootArgs) -> Result<Self> {
        if args.destination.as_os_str().is_empty() {
            return Err(anyhow!("--destination must not be empty"));
        }
        let images = ImageSet {
            server: require_value("--server-image", args.server_image)?,
            controllers: require_value("--controllers-image", args.controllers_image)?,
            function_runner: require_value("--function-image", args.function_image)?,
            wrapper_server: require_value("--wrapper-server-image", args.wrapper_server_image)?,
            test_git_server: args
                .test_git_server_image
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        };
        if !args.skip_kind_load && images.test_git_server.is_none() {
            return Err(anyhow!(
                "--test-git-server-image is required unless --skip-kind-load is true"
            ));
        }
        let kind_context = require_value("--kind-context", args.kind_context)?;
        let package_url = require_value("--package-url", args.package_url)?;

        Ok(Self {
            destination: args.destination,
            images,
            reconcilers: parse_reconcilers(&args.enabled_reconcilers),
            kind_context,
            skip_kind_load: args.skip_kind_load,
            package_url,
            patch_backend: args.patch_backend,
            live_apply: args.live_apply,
        })
    }

    /// Root of the fetched package inside the destination.
    pub fn package_dir(&self) -> PathBuf {
        self.destination.join(PACKAGE_DIR_NAME)
    }

    /// Images pushed into kind, in load order.
    pub fn images_to_load(&self) -> Vec<(ImageRole, &str)> {
        ImageRole::LOAD_ORDER
            .iter()
            .filter_map(|role| self.images.get(*role).map(|image| (*role, image)))
            .collect()
    }
}

fn require_value(flag: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{flag} must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Split a comma-separated reconciler list, dropping blank items.
pub fn parse_reconcilers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
