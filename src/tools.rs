//! Discovery of the external tools the workflow delegates to.
use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub const KPT: &str = "kpt";
pub const KIND: &str = "kind";
pub const YQ: &str = "yq";

/// Resolved locations of the tools required before anything touches disk.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub kpt: PathBuf,
    /// Only checked for presence; package edits never call it directly.
    pub yq: PathBuf,
}

impl Toolchain {
    /// Resolve `kpt` and `yq`, reporting every missing tool at once.
    pub fn discover() -> Result<Self> {
        match (which::which(KPT), which::which(YQ)) {
            (Ok(kpt), Ok(yq)) => {
                tracing::debug!(kpt = %kpt.display(), yq = %yq.display(), "resolved tools");
                Ok(Self { kpt, yq })
            }
            (kpt, yq) => {
                let missing: Vec<&str> = [(KPT, kpt.is_err()), (YQ, yq.is_err())]
                    .into_iter()
                    .filter(|(_, is_missing)| *is_missing)
                    .map(|(tool, _)| tool)
                    .collect();
                Err(anyhow!(
                    "required tool(s) not found on PATH: {}",
                    missing.join(", ")
                ))
            }
        }
    }
}

/// Resolve `kind` on demand; only the image-load step needs it.
pub fn locate_kind() -> Result<PathBuf> {
    which::which(KIND).map_err(|_| anyhow!("{KIND} not found on PATH; required to load images"))
}
