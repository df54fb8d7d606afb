//! Porch image roles, their upstream references, and loading into kind.
use crate::exec::{Invocation, ToolRunner};
use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// Release tag the upstream package pins besides `latest`.
pub const UPSTREAM_RELEASE_TAG: &str = "v3.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Server,
    Controllers,
    FunctionRunner,
    WrapperServer,
    TestGitServer,
}

impl ImageRole {
    /// Order images are pushed into the cluster.
    pub const LOAD_ORDER: [ImageRole; 5] = [
        ImageRole::Server,
        ImageRole::Controllers,
        ImageRole::FunctionRunner,
        ImageRole::WrapperServer,
        ImageRole::TestGitServer,
    ];

    /// Roles whose upstream references are rewritten in the package, in order.
    pub const SUBSTITUTED: [ImageRole; 4] = [
        ImageRole::Server,
        ImageRole::Controllers,
        ImageRole::FunctionRunner,
        ImageRole::WrapperServer,
    ];

    /// Regex matching the upstream reference for this role, if the package carries one.
    pub fn upstream_pattern(self) -> Option<String> {
        let repository = match self {
            ImageRole::Server => "porch-server",
            ImageRole::Controllers => "porch-controllers",
            ImageRole::FunctionRunner => "porch-function-runner",
            ImageRole::WrapperServer => "porch-wrapper-server",
            ImageRole::TestGitServer => return None,
        };
        Some(format!(
            r"docker\.io/nephio/{repository}:(latest|{})",
            regex::escape(UPSTREAM_RELEASE_TAG)
        ))
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImageRole::Server => "server",
            ImageRole::Controllers => "controllers",
            ImageRole::FunctionRunner => "function-runner",
            ImageRole::WrapperServer => "wrapper-server",
            ImageRole::TestGitServer => "test-git-server",
        };
        f.write_str(label)
    }
}

/// Operator-supplied image references.
#[derive(Debug, Clone)]
pub struct ImageSet {
    pub server: String,
    pub controllers: String,
    pub function_runner: String,
    pub wrapper_server: String,
    pub test_git_server: Option<String>,
}

impl ImageSet {
    pub fn get(&self, role: ImageRole) -> Option<&str> {
        match role {
            ImageRole::Server => Some(&self.server),
            ImageRole::Controllers => Some(&self.controllers),
            ImageRole::FunctionRunner => Some(&self.function_runner),
            ImageRole::WrapperServer => Some(&self.wrapper_server),
            ImageRole::TestGitServer => self.test_git_server.as_deref(),
        }
    }
}

/// Push each image into the named kind cluster, stopping at the first failure.
pub fn load_into_kind(
    runner: &dyn ToolRunner,
    kind: &Path,
    cluster: &str,
    images: &[(ImageRole, &str)],
) -> Result<()> {
    for (role, image) in images {
        tracing::info!(%role, image, cluster, "loading image into kind");
        let invocation = Invocation::new(kind)
            .args(["load", "docker-image"])
            .arg(image)
            .args(["--name", cluster]);
        runner
            .run(&invocation)
            .with_context(|| format!("load {role} image {image} into kind cluster {cluster}"))?;
    }
    Ok(())
}
