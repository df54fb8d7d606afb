//! Package edits applied in-process to the YAML files.
//!
//! Multi-document files are supported. Only files containing a changed
//! resource are rewritten, so untouched files keep their original bytes.
use super::{Bundle, BundleMutator, CacheRewrite, EnvVar, FileMatcher, ResourceSelector};
use crate::util::display_path;
use anyhow::{anyhow, Context, Result};
use regex::{NoExpand, Regex};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use std::fs;

const CACHE_TYPE_FLAG: &str = "--cache-type=";

pub struct LocalMutator {
    bundle: Bundle,
}

impl LocalMutator {
    pub fn new(bundle: Bundle) -> Self {
        Self { bundle }
    }

    /// Apply `edit` to every resource `target` selects, returning the match count.
    fn edit_resources<F>(&self, target: &ResourceSelector, mut edit: F) -> Result<usize>
    where
        F: FnMut(&mut Value) -> Result<bool>,
    {
        let mut matched = 0;
        for path in self.bundle.yaml_files()? {
            let text =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            let mut documents =
                parse_documents(&text).with_context(|| format!("parse {}", path.display()))?;
            let mut changed = false;
            for document in documents.iter_mut().filter(|doc| selects(target, doc)) {
                matched += 1;
                changed |= edit(document)
                    .with_context(|| format!("edit {target} in {}", path.display()))?;
            }
            if changed {
                let rendered = render_documents(&documents)
                    .with_context(|| format!("serialize {}", path.display()))?;
                fs::write(&path, rendered).with_context(|| format!("write {}", path.display()))?;
                tracing::debug!(
                    file = %display_path(&path, Some(self.bundle.root())),
                    %target,
                    "rewrote resource"
                );
            }
        }
        if matched == 0 {
            tracing::warn!(%target, "no matching resource in package");
        }
        Ok(matched)
    }
}

fn parse_documents(text: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        documents.push(Value::deserialize(document)?);
    }
    Ok(documents)
}

fn render_documents(documents: &[Value]) -> Result<String> {
    let mut rendered = Vec::with_capacity(documents.len());
    for document in documents.iter().filter(|doc| !doc.is_null()) {
        rendered.push(serde_yaml::to_string(document)?);
    }
    Ok(rendered.join("---\n"))
}

fn metadata_field<'a>(resource: &'a Value, key: &str) -> Option<&'a str> {
    resource.get("metadata")?.get(key)?.as_str()
}

fn selects(target: &ResourceSelector, resource: &Value) -> bool {
    let namespace_matches = match target.namespace.as_deref() {
        Some(namespace) => metadata_field(resource, "namespace") == Some(namespace),
        None => true,
    };
    resource.get("kind").and_then(Value::as_str) == Some(target.kind.as_str())
        && metadata_field(resource, "name") == Some(target.name.as_str())
        && namespace_matches
}

fn pod_spec_mut(resource: &mut Value) -> Option<&mut Mapping> {
    resource
        .get_mut("spec")?
        .get_mut("template")?
        .get_mut("spec")?
        .as_mapping_mut()
}

impl BundleMutator for LocalMutator {
    fn set_container_env(&mut self, target: &ResourceSelector, env: &[EnvVar]) -> Result<()> {
        let env = serde_yaml::to_value(env).context("serialize env list")?;
        self.edit_resources(target, |resource| {
            let container = pod_spec_mut(resource)
                .and_then(|pod| pod.get_mut("containers"))
                .and_then(Value::as_sequence_mut)
                .and_then(|containers| containers.first_mut())
                .and_then(Value::as_mapping_mut)
                .ok_or_else(|| anyhow!("resource has no containers"))?;
            let previous = container.insert(Value::from("env"), env.clone());
            Ok(previous.as_ref() != Some(&env))
        })?;
        Ok(())
    }

    fn set_config_value(
        &mut self,
        target: &ResourceSelector,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.edit_resources(target, |resource| {
            let mapping = resource
                .as_mapping_mut()
                .ok_or_else(|| anyhow!("resource is not a mapping"))?;
            if matches!(mapping.get("data"), None | Some(Value::Null)) {
                mapping.insert(Value::from("data"), Value::Mapping(Mapping::new()));
            }
            let data = mapping
                .get_mut("data")
                .and_then(Value::as_mapping_mut)
                .ok_or_else(|| anyhow!("data is not a mapping"))?;
            let previous = data.insert(Value::from(key), Value::from(value));
            Ok(previous.as_ref().and_then(Value::as_str) != Some(value))
        })?;
        Ok(())
    }

    fn rewrite_cache_wiring(
        &mut self,
        target: &ResourceSelector,
        rewrite: &CacheRewrite,
    ) -> Result<()> {
        let pinned = format!("{CACHE_TYPE_FLAG}{}", rewrite.cache_type);
        self.edit_resources(target, |resource| {
            let pod = pod_spec_mut(resource).ok_or_else(|| anyhow!("resource has no pod spec"))?;
            let mut changed = false;

            if let Some(Value::Sequence(init)) = pod.get_mut("initContainers") {
                let before = init.len();
                init.retain(|container| {
                    container.get("name").and_then(Value::as_str)
                        != Some(rewrite.init_container.as_str())
                });
                changed |= init.len() != before;
            }
            if matches!(pod.get("initContainers"), Some(Value::Sequence(init)) if init.is_empty()) {
                pod.shift_remove("initContainers");
                changed = true;
            }

            if let Some(Value::Sequence(containers)) = pod.get_mut("containers") {
                for container in containers.iter_mut().filter_map(Value::as_mapping_mut) {
                    changed |= container.shift_remove("envFrom").is_some();
                    let Some(Value::Sequence(args)) = container.get_mut("args") else {
                        continue;
                    };
                    for arg in args.iter_mut() {
                        let stale = arg
                            .as_str()
                            .is_some_and(|arg| arg.starts_with(CACHE_TYPE_FLAG) && arg != pinned);
                        if stale {
                            *arg = Value::from(pinned.as_str());
                            changed = true;
                        }
                    }
                }
            }
            Ok(changed)
        })?;
        Ok(())
    }

    fn replace_values(&mut self, pattern: &Regex, replacement: &str) -> Result<()> {
        let mut rewritten = 0usize;
        for path in self.bundle.yaml_files()? {
            let text =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            if let Cow::Owned(updated) = pattern.replace_all(&text, NoExpand(replacement)) {
                if updated != text {
                    fs::write(&path, updated)
                        .with_context(|| format!("write {}", path.display()))?;
                    rewritten += 1;
                }
            }
        }
        tracing::debug!(pattern = pattern.as_str(), files = rewritten, "replaced values");
        Ok(())
    }

    fn remove_files(&mut self, matcher: &FileMatcher) -> Result<usize> {
        Ok(self.bundle.remove_files(matcher)?.len())
    }
}
