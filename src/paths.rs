//! Confinement of client-supplied file names to the served root.

use anyhow::{anyhow, bail, Result};
use std::path::{Component, Path, PathBuf};

/// Resolve `name` to a path that is guaranteed to sit under `root`.
/// Rejects NUL bytes, absolute paths and `..`; symlinks are resolved
/// before the containment check.
pub fn resolve_under_root(root: &Path, name: &str) -> Result<PathBuf> {
    use Component::{CurDir, Normal, ParentDir, Prefix, RootDir};

    if name.contains('\0') {
        bail!("path contains NUL byte");
    }

    let mut safe = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            CurDir => {}
            Normal(s) => safe.push(s),
            ParentDir | RootDir | Prefix(_) => {
                bail!("path contains disallowed component: {:?}", component);
            }
        }
    }
    if safe.as_os_str().is_empty() {
        bail!("empty path");
    }

    let root = root
        .canonicalize()
        .map_err(|e| anyhow!("failed to canonicalize root {:?}: {}", root, e))?;
    let joined = root.join(&safe);
    // A target that does not exist yet cannot be canonicalised. It is joined
    // onto the canonical root as is; with `..` and absolute components gone
    // it cannot leave the root.
    let final_path = if joined.exists() {
        joined
            .canonicalize()
            .map_err(|e| anyhow!("failed to canonicalize {:?}: {}", joined, e))?
    } else {
        joined
    };

    if !final_path.starts_with(&root) {
        bail!("path {:?} escapes root {:?}", name, root);
    }
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn safe_names_resolve_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("subdir")).unwrap();
        fs::write(root.join("subdir/file.txt"), "test").unwrap();

        let result = resolve_under_root(root, "subdir/file.txt").unwrap();
        assert_eq!(result, root.join("subdir/file.txt").canonicalize().unwrap());

        let result = resolve_under_root(root, "./subdir/./file.txt").unwrap();
        assert!(result.ends_with("subdir/file.txt"));
    }

    #[test]
    fn missing_file_still_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let result = resolve_under_root(temp_dir.path(), "ghost.txt").unwrap();
        assert!(result.ends_with("ghost.txt"));
        assert!(!result.exists());
    }

    #[test]
    fn traversal_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        assert!(resolve_under_root(root, "../etc/passwd").is_err());
        assert!(resolve_under_root(root, "subdir/../../etc/passwd").is_err());
        assert!(resolve_under_root(root, "/etc/passwd").is_err());
        assert!(resolve_under_root(root, "file\0.txt").is_err());
        assert!(resolve_under_root(root, ".").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_rejected() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), "x").unwrap();
        let temp_dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), temp_dir.path().join("link"))
            .unwrap();
        assert!(resolve_under_root(temp_dir.path(), "link").is_err());
    }
}
