use std::path::{Component, Path, PathBuf};

use crate::{ToolError, is_sidecar_path};

/// Resolves a tool-supplied path against `root`. The result is lexically
/// normalized and never leaves `root`.
pub(super) fn resolve(root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::Validation("path must not be empty".to_string()));
    }

    let root = normalize(root).ok_or_else(|| ToolError::OutsideWorkingDirectory(raw.to_string()))?;
    let candidate = Path::new(trimmed);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved =
        normalize(&joined).ok_or_else(|| ToolError::OutsideWorkingDirectory(raw.to_string()))?;
    if !resolved.starts_with(&root) {
        return Err(ToolError::OutsideWorkingDirectory(raw.to_string()));
    }
    Ok(resolved)
}

/// Like [`resolve`], and additionally refuses ledger sidecar files.
pub(super) fn resolve_for_mutation(root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let resolved = resolve(root, raw)?;
    if is_sidecar_path(&resolved) {
        return Err(ToolError::SidecarPath(raw.to_string()));
    }
    Ok(resolved)
}

pub(super) fn resolve_or_root(root: &Path, raw: Option<&str>) -> Result<PathBuf, ToolError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => resolve(root, raw),
        _ => resolve(root, "."),
    }
}

/// Path as shown to the model: relative to the working directory.
pub(super) fn display(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.to_string_lossy().replace('\\', "/")
    }
}

fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Some(normalized)
}
