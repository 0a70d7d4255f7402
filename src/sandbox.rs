//! The directory the agent is allowed to read and write.
//!
//! Tools address files with virtual paths: `/` is the sandbox root and every
//! path is resolved below it. Anything that could leave the root (`..`,
//! drive prefixes, `~`) is rejected before touching the filesystem.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path escapes the sandbox: {0}")]
    PathEscape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Open (creating if needed) the sandbox rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        tracing::debug!("Sandbox root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to a real path inside the sandbox.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf, SandboxError> {
        let trimmed = virtual_path.trim();
        if trimmed.starts_with('~') {
            return Err(SandboxError::PathEscape(virtual_path.to_string()));
        }

        let mut resolved = self.root.clone();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(SandboxError::PathEscape(virtual_path.to_string()));
                }
            }
        }

        // Symlinks inside the sandbox must not point outside it. The target may
        // not exist yet, so check the deepest existing ancestor.
        if let Some(existing) = resolved.ancestors().find(|p| p.exists()) {
            let real = existing.canonicalize()?;
            if !real.starts_with(&self.root) {
                return Err(SandboxError::PathEscape(virtual_path.to_string()));
            }
        }

        Ok(resolved)
    }

    /// Map a real path under the root back to its virtual form.
    pub fn to_virtual(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        format!("/{}", parts.join("/"))
    }
}
