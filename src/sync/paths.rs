//! Sandbox path math.
//!
//! Everything the synchronizer reads or mirrors is checked here first.
//! Containment is decided on lexically resolved absolute paths, compared
//! component by component, so `/sandbox-evil/x` is never inside `/sandbox`.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized form without touching the
/// filesystem. `.` is dropped and `..` pops a component (never past the root).
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved.parent().is_some() {
                    resolved.pop();
                }
            }
        }
    }
    Ok(resolved)
}

/// Whether `candidate` is `root` itself or lies strictly inside it.
pub fn is_safe_path(candidate: &Path, root: &Path) -> bool {
    match (resolve(candidate), resolve(root)) {
        (Ok(candidate), Ok(root)) => candidate.starts_with(&root),
        _ => false,
    }
}

/// Path of `candidate` relative to `root`, with `/` separators.
///
/// `None` when the candidate is outside the root or is the root itself.
pub fn relative_path(candidate: &Path, root: &Path) -> Option<String> {
    let candidate = resolve(candidate).ok()?;
    let root = resolve(root).ok()?;
    let relative = candidate.strip_prefix(&root).ok()?;

    let segments: Vec<&str> = relative
        .components()
        .map(|component| match component {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    (!segments.is_empty()).then(|| segments.join("/"))
}

/// Destination object key of a mirrored file.
pub fn storage_key(store_id: &str, relative_path: &str) -> String {
    format!("templates/{store_id}/{}", relative_path.replace('\\', "/"))
}

/// Whether any segment of a relative path is hidden (dot-prefixed).
pub fn is_hidden(relative_path: &str) -> bool {
    relative_path
        .split(['/', '\\'])
        .any(|segment| segment.starts_with('.') && segment != "." && segment != "..")
}

/// Whether a mirrored file affects every page of a store.
pub fn is_global_template(relative_path: &str) -> bool {
    relative_path.contains("layout/") || relative_path.contains("config/")
}
