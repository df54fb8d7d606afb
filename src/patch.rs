//! The ordered edits that turn the upstream Porch package into a dev deployment.
use crate::bundle::{BundleMutator, CacheRewrite, EnvVar, FileMatcher, ResourceSelector};
use crate::config::DeployConfig;
use crate::images::ImageRole;
use anyhow::{anyhow, Context, Result};
use regex::Regex;

pub const PORCH_NAMESPACE: &str = "porch-system";
pub const CONTROLLERS_DEPLOYMENT: &str = "porch-controllers";
pub const SERVER_DEPLOYMENT: &str = "porch-server";
pub const SERVER_CONFIG_MAP: &str = "porch-server-config";
pub const CACHE_TYPE_KEY: &str = "cache-type";
/// Cache backed by custom resources instead of a database.
pub const CR_CACHE_TYPE: &str = "CR";
pub const DB_WAIT_INIT_CONTAINER: &str = "wait-for-postgres";
pub const POSTGRES_FILE_NEEDLE: &str = "porch-postgres";

const RECONCILER_ENV_PREFIX: &str = "ENABLE_";

#[derive(Debug, Clone)]
pub enum PatchStep {
    /// Replace the controllers' env with one `ENABLE_<NAME>=true` per reconciler.
    EnableReconcilers(Vec<String>),
    /// Switch Porch from the database cache to the CR cache.
    UseCrCache,
    ReplaceImage {
        role: ImageRole,
        pattern: Regex,
        replacement: String,
    },
}

impl PatchStep {
    pub fn describe(&self) -> String {
        match self {
            PatchStep::EnableReconcilers(names) => {
                format!("enable reconcilers [{}]", names.join(","))
            }
            PatchStep::UseCrCache => format!("set cache type {CR_CACHE_TYPE}"),
            PatchStep::ReplaceImage {
                role, replacement, ..
            } => format!("set {role} image {replacement}"),
        }
    }

    pub fn apply(&self, mutator: &mut dyn BundleMutator) -> Result<()> {
        match self {
            PatchStep::EnableReconcilers(names) => mutator.set_container_env(
                &controllers_deployment(),
                &reconciler_env(names),
            ),
            PatchStep::UseCrCache => {
                let server_config = ResourceSelector::new("ConfigMap", SERVER_CONFIG_MAP)
                    .in_namespace(PORCH_NAMESPACE);
                mutator.set_config_value(&server_config, CACHE_TYPE_KEY, CR_CACHE_TYPE)?;

                let server = ResourceSelector::new("Deployment", SERVER_DEPLOYMENT)
                    .in_namespace(PORCH_NAMESPACE);
                let rewrite = CacheRewrite {
                    init_container: DB_WAIT_INIT_CONTAINER.to_string(),
                    cache_type: CR_CACHE_TYPE.to_string(),
                };
                mutator.rewrite_cache_wiring(&server, &rewrite)?;

                let removed = mutator.remove_files(&postgres_files())?;
                tracing::debug!(removed, pattern = %postgres_files(), "removed database manifests");
                Ok(())
            }
            PatchStep::ReplaceImage {
                pattern,
                replacement,
                ..
            } => mutator.replace_values(pattern, replacement),
        }
    }
}

fn controllers_deployment() -> ResourceSelector {
    ResourceSelector::new("Deployment", CONTROLLERS_DEPLOYMENT).in_namespace(PORCH_NAMESPACE)
}

fn postgres_files() -> FileMatcher {
    FileMatcher {
        contains: POSTGRES_FILE_NEEDLE.to_string(),
        extension: "yaml".to_string(),
    }
}

/// Env entries enabling each named reconciler.
pub fn reconciler_env(names: &[String]) -> Vec<EnvVar> {
    names
        .iter()
        .map(|name| EnvVar {
            name: format!("{RECONCILER_ENV_PREFIX}{}", name.to_uppercase()),
            value: "true".to_string(),
        })
        .collect()
}

/// Build the fixed step sequence for a configuration.
pub fn pipeline(config: &DeployConfig) -> Result<Vec<PatchStep>> {
    let mut steps = vec![
        PatchStep::EnableReconcilers(config.reconcilers.clone()),
        PatchStep::UseCrCache,
    ];
    for role in ImageRole::SUBSTITUTED {
        let pattern = role
            .upstream_pattern()
            .ok_or_else(|| anyhow!("no upstream image pattern for {role}"))?;
        let replacement = config
            .images
            .get(role)
            .ok_or_else(|| anyhow!("no {role} image configured"))?;
        steps.push(PatchStep::ReplaceImage {
            role,
            pattern: Regex::new(&pattern).with_context(|| format!("compile {role} pattern"))?,
            replacement: replacement.to_string(),
        });
    }
    Ok(steps)
}

/// Apply steps in order; the first failure stops the rest.
pub fn apply_all(steps: &[PatchStep], mutator: &mut dyn BundleMutator) -> Result<()> {
    for step in steps {
        let description = step.describe();
        tracing::info!(step = %description, "patching package");
        step.apply(mutator)
            .with_context(|| format!("patch step failed: {description}"))?;
    }
    Ok(())
}
