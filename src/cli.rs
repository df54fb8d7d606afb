//! CLI argument parsing for the Porch deployment workflow.
//!
//! Every flag takes exactly one value. Defaults mirror the local kind setup
//! used for Porch development.
use clap::{ArgAction, CommandFactory, Parser, ValueEnum};
use std::path::PathBuf;

/// Upstream location of the Porch kpt package.
pub const DEFAULT_PACKAGE_URL: &str =
    "https://github.com/nephio-project/catalog.git/nephio/core/porch@main";

/// Reconcilers enabled in the controllers Deployment unless overridden.
pub const DEFAULT_RECONCILERS: &str = "packagevariants,packagevariantsets";

/// Name of the kind cluster images are loaded into.
pub const DEFAULT_KIND_CONTEXT: &str = "kind";

/// How structured edits are applied to the fetched package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PatchBackend {
    /// Run kpt functions (starlark, search-replace) against the package
    #[default]
    Kpt,
    /// Edit the package YAML in-process
    Local,
}

#[derive(Parser, Debug)]
#[command(
    name = "porch-deploy",
    version,
    about = "Fetch, patch and render the Porch kpt package",
    after_help = "Examples:\n  porch-deploy --destination /tmp/deploy \\\n    --server-image example.com/porch-server:dev \\\n    --controllers-image example.com/porch-controllers:dev \\\n    --function-image example.com/porch-function-runner:dev \\\n    --wrapper-server-image example.com/porch-wrapper-server:dev\n\n  porch-deploy ... --skip-kind-load false --test-git-server-image example.com/test-git-server:dev"
)]
pub struct RootArgs {
    /// Directory the porch package is fetched into
    #[arg(long, value_name = "DIR")]
    pub destination: PathBuf,

    /// Image reference for the Porch API server
    #[arg(long, value_name = "IMAGE")]
    pub server_image: String,

    /// Image reference for the Porch controllers
    #[arg(long, value_name = "IMAGE")]
    pub controllers_image: String,

    /// Image reference for the function runner
    #[arg(long, value_name = "IMAGE")]
    pub function_image: String,

    /// Image reference for the function wrapper server
    #[arg(long, value_name = "IMAGE")]
    pub wrapper_server_image: String,

    /// Image reference for the test git server (loaded into kind only)
    #[arg(long, value_name = "IMAGE")]
    pub test_git_server_image: Option<String>,

    /// Comma-separated reconcilers to enable in the controllers Deployment
    #[arg(long, value_name = "LIST", default_value = DEFAULT_RECONCILERS)]
    pub enabled_reconcilers: String,

    /// kind cluster name used when loading images
    #[arg(long, value_name = "NAME", default_value = DEFAULT_KIND_CONTEXT)]
    pub kind_context: String,

    /// Skip loading images into the kind cluster
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub skip_kind_load: bool,

    /// kpt package source to fetch
    #[arg(long, value_name = "URL", default_value = DEFAULT_PACKAGE_URL)]
    pub package_url: String,

    /// Mechanism used to patch the fetched package
    #[arg(long, value_name = "BACKEND", value_enum, default_value_t = PatchBackend::Kpt)]
    pub patch_backend: PatchBackend,

    /// Apply the rendered package to the current cluster
    #[arg(long, value_name = "BOOL", default_value_t = false, action = ArgAction::Set)]
    pub live_apply: bool,
}

/// One-line usage text printed alongside validation failures.
pub fn usage() -> String {
    RootArgs::command().render_usage().to_string()
}
