//! Path sandboxing for filesystem tools.
//!
//! Containment is computed by canonicalization plus a relative-to check
//! against the allowed roots (working directory, agent home); never by string
//! prefix comparison. Symlinks are resolved before the check, so a link
//! pointing outside the sandbox is rejected even when its own path is inside.

use std::path::{Component, Path, PathBuf};

use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;

/// Normalizes `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut buf = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(p) => buf = PathBuf::from(p.as_os_str()),
            Component::RootDir => buf.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                buf.pop();
            }
            Component::Normal(s) => buf.push(s),
        }
    }
    buf
}

/// Resolves the deepest existing ancestor via the filesystem (following
/// symlinks), then re-appends the non-existing remainder.
fn canonicalize_deepest(path: &Path) -> Result<PathBuf, ToolError> {
    let normalized = normalize(path);
    if normalized.exists() {
        return normalized
            .canonicalize()
            .map_err(|e| ToolError::system(format!("failed to resolve {}: {}", path.display(), e)));
    }

    let mut existing = normalized.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }
    let mut resolved = if existing.as_os_str().is_empty() {
        normalized
    } else {
        existing
            .canonicalize()
            .map_err(|e| ToolError::system(format!("failed to resolve {}: {}", path.display(), e)))?
    };
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Allowed sandbox roots for this context, canonicalized where they exist.
fn sandbox_roots(ctx: &ExecutionContext) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(root) = ctx.working_dir.canonicalize() {
        roots.push(root);
    } else {
        roots.push(normalize(&ctx.working_dir));
    }
    let home = ctx.agent_home();
    if let Ok(root) = home.canonicalize() {
        roots.push(root);
    } else {
        roots.push(normalize(&home));
    }
    roots
}

/// Resolves an absolute path parameter and enforces sandbox containment.
///
/// The default policy rejects any path that does not resolve into the
/// caller's working directory or the agent's home directory;
/// `allow_outside` skips the containment check (paths are still resolved).
pub fn resolve_sandboxed(
    raw: &str,
    ctx: &ExecutionContext,
    allow_outside: bool,
) -> Result<PathBuf, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ToolError::missing_required("path"));
    }
    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(ToolError::validation(
            "path",
            format!("path must be absolute, got: {}", raw),
        ));
    }

    let resolved = canonicalize_deepest(path)?;
    if allow_outside {
        return Ok(resolved);
    }

    let contained = sandbox_roots(ctx)
        .iter()
        .any(|root| resolved.strip_prefix(root).is_ok());
    if !contained {
        return Err(ToolError::validation(
            "path",
            format!(
                "path is outside the working directory and the agent home: {}",
                raw
            ),
        ));
    }
    Ok(resolved)
}
