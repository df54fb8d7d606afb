//! Package edits performed by kpt functions.
use super::{Bundle, BundleMutator, CacheRewrite, EnvVar, FileMatcher, ResourceSelector};
use crate::exec::{Invocation, ToolRunner};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::io::Write;
use std::path::PathBuf;

pub const STARLARK_IMAGE: &str = "gcr.io/kpt-fn/starlark:v0.4.3";
pub const SEARCH_REPLACE_IMAGE: &str = "gcr.io/kpt-fn/search-replace:v0.2.0";

// starlark-go only accepts `for` and `if` inside a function, so each program
// defines one and calls it once on the selected items.
const SET_ENV_SOURCE: &str = r#"def set_env(items, params):
  for resource in items:
    containers = resource["spec"]["template"]["spec"]["containers"]
    containers[0]["env"] = params["env"]

set_env(ctx.resource_list["items"], ctx.resource_list["functionConfig"]["params"])
"#;

const SET_CONFIG_SOURCE: &str = r#"def set_config_value(items, params):
  for resource in items:
    if resource.get("data") == None:
      resource["data"] = {}
    resource["data"][params["key"]] = params["value"]

set_config_value(ctx.resource_list["items"], ctx.resource_list["functionConfig"]["params"])
"#;

const CACHE_WIRING_SOURCE: &str = r#"def rewrite_cache_wiring(items, params):
  prefix = "--cache-type="
  pinned = prefix + params["cacheType"]
  for resource in items:
    pod = resource["spec"]["template"]["spec"]
    init = [c for c in pod.get("initContainers", []) if c["name"] != params["initContainer"]]
    if init:
      pod["initContainers"] = init
    elif "initContainers" in pod:
      pod.pop("initContainers")
    for container in pod["containers"]:
      if "envFrom" in container:
        container.pop("envFrom")
      if "args" in container:
        container["args"] = [pinned if a.startswith(prefix) else a for a in container["args"]]

rewrite_cache_wiring(ctx.resource_list["items"], ctx.resource_list["functionConfig"]["params"])
"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StarlarkRun<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: StarlarkMetadata<'a>,
    params: Mapping,
    source: &'a str,
}

#[derive(Serialize)]
struct StarlarkMetadata<'a> {
    name: &'a str,
}

/// Applies edits with `kpt fn eval`.
pub struct KptMutator<'a> {
    runner: &'a dyn ToolRunner,
    kpt: PathBuf,
    bundle: Bundle,
}

impl<'a> KptMutator<'a> {
    pub fn new(runner: &'a dyn ToolRunner, kpt: impl Into<PathBuf>, bundle: Bundle) -> Self {
        Self {
            runner,
            kpt: kpt.into(),
            bundle,
        }
    }

    fn eval(&self) -> Invocation {
        Invocation::new(&self.kpt)
            .args(["fn", "eval"])
            .arg(self.bundle.root())
    }

    /// Run an inline Starlark program against the resources `target` selects.
    fn run_starlark(
        &self,
        name: &str,
        target: &ResourceSelector,
        source: &str,
        params: Mapping,
    ) -> Result<()> {
        let config = StarlarkRun {
            api_version: "fn.kpt.dev/v1alpha1",
            kind: "StarlarkRun",
            metadata: StarlarkMetadata { name },
            params,
            source,
        };
        let rendered = serde_yaml::to_string(&config).context("serialize starlark config")?;
        let mut fn_config = tempfile::Builder::new()
            .prefix(name)
            .suffix(".yaml")
            .tempfile()
            .context("create starlark config file")?;
        fn_config
            .write_all(rendered.as_bytes())
            .context("write starlark config file")?;

        let mut invocation = self
            .eval()
            .args(["--image", STARLARK_IMAGE])
            .args(["--match-kind", target.kind.as_str()])
            .args(["--match-name", target.name.as_str()]);
        if let Some(namespace) = &target.namespace {
            invocation = invocation.args(["--match-namespace", namespace.as_str()]);
        }
        let invocation = invocation.arg("--fn-config").arg(fn_config.path());
        self.runner
            .run(&invocation)
            .with_context(|| format!("{name} on {target}"))
    }
}

fn params<const N: usize>(entries: [(&str, Value); N]) -> Mapping {
    entries
        .into_iter()
        .map(|(key, value)| (Value::from(key), value))
        .collect()
}

/// Wrap a pattern so search-replace can rewrite it inside a longer value.
fn embedded_value_regex(pattern: &Regex) -> String {
    format!("(.*?)(?:{})(.*)", pattern.as_str())
}

/// Escape `$` for Go's template expansion and splice around the capture groups.
fn embedded_put_value(replacement: &str) -> String {
    format!("${{1}}{}${{2}}", replacement.replace('$', "$$"))
}

impl BundleMutator for KptMutator<'_> {
    fn set_container_env(&mut self, target: &ResourceSelector, env: &[EnvVar]) -> Result<()> {
        let env = serde_yaml::to_value(env).context("serialize env list")?;
        self.run_starlark("set-container-env", target, SET_ENV_SOURCE, params([("env", env)]))
    }

    fn set_config_value(
        &mut self,
        target: &ResourceSelector,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.run_starlark(
            "set-config-value",
            target,
            SET_CONFIG_SOURCE,
            params([("key", Value::from(key)), ("value", Value::from(value))]),
        )
    }

    fn rewrite_cache_wiring(
        &mut self,
        target: &ResourceSelector,
        rewrite: &CacheRewrite,
    ) -> Result<()> {
        self.run_starlark(
            "rewrite-cache-wiring",
            target,
            CACHE_WIRING_SOURCE,
            params([
                ("initContainer", Value::from(rewrite.init_container.as_str())),
                ("cacheType", Value::from(rewrite.cache_type.as_str())),
            ]),
        )
    }

    fn replace_values(&mut self, pattern: &Regex, replacement: &str) -> Result<()> {
        let invocation = self
            .eval()
            .args(["--image", SEARCH_REPLACE_IMAGE, "--"])
            .arg(format!("by-value-regex={}", embedded_value_regex(pattern)))
            .arg(format!("put-value={}", embedded_put_value(replacement)));
        self.runner
            .run(&invocation)
            .with_context(|| format!("replace values matching {}", pattern.as_str()))
    }

    fn remove_files(&mut self, matcher: &FileMatcher) -> Result<usize> {
        Ok(self.bundle.remove_files(matcher)?.len())
    }
}
