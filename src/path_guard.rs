//! Path resolution against an allow-list of root directories
//!
//! Every path supplied by a caller goes through [`PathGuard::resolve`] before
//! any filesystem access. Resolution is:
//!
//! 1. make the path absolute (relative paths are taken from the working directory),
//! 2. remove `.` and `..` lexically,
//! 3. canonicalize the longest existing ancestor so symlinks are followed,
//! 4. require the result to sit under one of the [`AllowedRoots`],
//! 5. sanitize the final filename component, leaving the directory untouched.
//!
//! The allow-list is the invariant: an absolute path that is not under a
//! configured root is rejected, whatever it looks like.
//!
//! ```rust
//! use markdown_workbench::path_guard::{AllowedRoots, PathGuard};
//!
//! let root = tempfile::tempdir().unwrap();
//! let guard = PathGuard::new(AllowedRoots::new([root.path()]).unwrap());
//!
//! let resolved = guard.resolve(&format!("{}/notes/../draft.md", root.path().display())).unwrap();
//! assert!(resolved.as_path().ends_with("draft.md"));
//! assert!(guard.resolve("/etc/passwd").is_err());
//! ```

use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::FileError;

/// Longest filename (in bytes) produced by the sanitizer
const MAX_FILENAME_BYTES: usize = 255;

/// Immutable set of canonical root directories
#[derive(Debug, Clone)]
pub struct AllowedRoots {
    roots: Vec<PathBuf>,
}

impl AllowedRoots {
    /// Canonicalize each root. Roots that do not exist are dropped with a
    /// warning; at least one must survive.
    pub fn new<I, P>(roots: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut canonical: Vec<PathBuf> = Vec::new();

        for root in roots {
            let root = root.as_ref();
            match fs::canonicalize(root) {
                Ok(path) if path.is_dir() => {
                    if !canonical.contains(&path) {
                        canonical.push(path);
                    }
                }
                Ok(path) => warn!("Ignoring allowed root {}: not a directory", path.display()),
                Err(e) => warn!("Ignoring allowed root {}: {}", root.display(), e),
            }
        }

        if canonical.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "none of the configured allowed roots exist",
            ));
        }

        debug!("Allowed roots: {:?}", canonical);
        Ok(Self { roots: canonical })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    /// Component-wise containment check (`/home/al` does not contain `/home/alice`)
    pub fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }
}

/// An absolute, canonical path known to lie under an allowed root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Sibling `<path>.backup`
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.0.clone().into_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Resolves caller-supplied paths against [`AllowedRoots`]
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: AllowedRoots,
}

impl PathGuard {
    pub fn new(roots: AllowedRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &AllowedRoots {
        &self.roots
    }

    /// Resolve `raw` to a [`ResolvedPath`] or fail with `AccessDenied`/`InvalidPath`.
    ///
    /// No filesystem mutation happens here; only metadata lookups.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, FileError> {
        if raw.trim().is_empty() {
            return Err(invalid(raw, "path is empty"));
        }
        if raw.contains('\0') {
            return Err(invalid(raw, "path contains a NUL byte"));
        }

        let absolute = absolutize(Path::new(raw)).map_err(|e| FileError::io(raw, e))?;
        let normalized = normalize_lexically(&absolute);
        let canonical = canonicalize_existing_prefix(&normalized)
            .map_err(|e| FileError::io(&normalized, e))?;

        if !self.roots.contains(&canonical) {
            warn!("Rejected path outside allowed roots: {}", raw);
            return Err(FileError::AccessDenied { path: canonical });
        }

        let (parent, name) = match (canonical.parent(), canonical.file_name()) {
            (Some(parent), Some(name)) => (parent, name.to_string_lossy()),
            _ => return Err(invalid(raw, "path has no filename component")),
        };

        let sanitized = sanitize_filename(&name);
        if sanitized.is_empty() {
            return Err(invalid(raw, "filename is empty after sanitizing"));
        }

        let mut resolved = parent.join(&sanitized);
        if sanitized != name {
            debug!("Sanitized filename {:?} -> {:?}", name, sanitized);
            // The sanitized name may itself be an existing symlink
            if fs::symlink_metadata(&resolved).is_ok() {
                resolved = fs::canonicalize(&resolved).map_err(|e| FileError::io(&resolved, e))?;
                if !self.roots.contains(&resolved) {
                    warn!("Rejected path outside allowed roots: {}", raw);
                    return Err(FileError::AccessDenied { path: resolved });
                }
            }
        }

        debug!("Resolved {} -> {}", raw, resolved.display());
        Ok(ResolvedPath(resolved))
    }
}

fn invalid(raw: &str, reason: &str) -> FileError {
    FileError::InvalidPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Remove `.` and `..` without touching the filesystem. `..` at the root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Canonicalize the deepest ancestor that exists and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();

    loop {
        match fs::canonicalize(existing) {
            Ok(canonical) => {
                let mut result = canonical;
                for part in missing.iter().rev() {
                    result.push(part);
                }
                return Ok(result);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_illegal_char(c: char) -> bool {
    matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"')
        || c.is_ascii_control()
        || ('\u{80}'..='\u{9f}').contains(&c)
}

/// `CON`, `PRN`, `AUX`, `NUL`, `COM0`-`COM9`, `LPT0`-`LPT9`, with or without extension
fn is_windows_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or_default().to_ascii_lowercase();
    match stem.as_str() {
        "con" | "prn" | "aux" | "nul" => true,
        _ => {
            stem.len() == 4
                && (stem.starts_with("com") || stem.starts_with("lpt"))
                && stem.ends_with(|c: char| c.is_ascii_digit())
        }
    }
}

/// Strip characters that are illegal or dangerous in a filename.
///
/// Removes path separators, `?<>\:*|"`, control characters, names made only
/// of dots, Windows device names (`CON`, `nul.txt`, `COM1`, ...) and trailing
/// dots/spaces, then truncates to 255 bytes. Returns an empty string when
/// nothing usable is left.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned: String = name.chars().filter(|c| !is_illegal_char(*c)).collect();

    if cleaned.chars().all(|c| c == '.') || is_windows_reserved(&cleaned) {
        return String::new();
    }

    let trimmed_len = cleaned.trim_end_matches(['.', ' ']).len();
    cleaned.truncate(trimmed_len);

    if cleaned.len() > MAX_FILENAME_BYTES {
        let mut end = MAX_FILENAME_BYTES;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn guard_for(dir: &TempDir) -> PathGuard {
        PathGuard::new(AllowedRoots::new([dir.path()]).expect("root exists"))
    }

    fn canonical_root(dir: &TempDir) -> PathBuf {
        fs::canonicalize(dir.path()).expect("canonical root")
    }

    #[test]
    fn test_sanitize_filename_strips_illegal_characters() {
        assert_eq!(sanitize_filename("re:port?.md"), "report.md");
        assert_eq!(sanitize_filename("a<b>c|d\"e*.txt"), "abcde.txt");
        assert_eq!(sanitize_filename("back\\slash.md"), "backslash.md");
        assert_eq!(sanitize_filename("ctrl\u{1}\u{7f}.md"), "ctrl.md");
    }

    #[test]
    fn test_sanitize_filename_reserved_names() {
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("..."), "");
        assert_eq!(sanitize_filename("CON"), "");
        assert_eq!(sanitize_filename("nul.txt"), "");
        assert_eq!(sanitize_filename("com1"), "");
        assert_eq!(sanitize_filename("console.md"), "console.md");
    }

    #[test]
    fn test_sanitize_filename_trailing_dots_and_length() {
        assert_eq!(sanitize_filename("notes. . "), "notes");
        let long = "é".repeat(200);
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= MAX_FILENAME_BYTES);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("/../../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_resolve_inside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard_for(&dir);
        let raw = format!("{}/doc.md", dir.path().display());

        let resolved = guard.resolve(&raw).expect("inside root");
        assert_eq!(resolved.as_path(), canonical_root(&dir).join("doc.md"));
    }

    #[test]
    fn test_resolve_rejects_outside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard_for(&dir);

        match guard.resolve("/etc/passwd") {
            Err(FileError::AccessDenied { .. }) => {}
            other => panic!("Expected AccessDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_rejects_traversal_escape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard_for(&dir);
        let raw = format!("{}/../../../../etc/passwd", dir.path().display());

        assert!(matches!(
            guard.resolve(&raw),
            Err(FileError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_sibling_with_shared_prefix() {
        let parent = tempfile::tempdir().expect("tempdir");
        let root = parent.path().join("docs");
        let sibling = parent.path().join("docs-private");
        fs::create_dir(&root).expect("create root");
        fs::create_dir(&sibling).expect("create sibling");

        let guard = PathGuard::new(AllowedRoots::new([&root]).expect("root exists"));
        let raw = format!("{}/secret.md", sibling.display());
        assert!(matches!(
            guard.resolve(&raw),
            Err(FileError::AccessDenied { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_follows_symlink_out_of_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), root.path().join("escape"))
            .expect("create symlink");

        let guard = guard_for(&root);
        let raw = format!("{}/escape/file.md", root.path().display());
        assert!(matches!(
            guard.resolve(&raw),
            Err(FileError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_resolve_sanitizes_only_filename() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard_for(&dir);
        let raw = format!("{}/sub dir/what?.md", dir.path().display());

        let resolved = guard.resolve(&raw).expect("inside root");
        assert_eq!(
            resolved.as_path(),
            canonical_root(&dir).join("sub dir").join("what.md")
        );
    }

    #[test]
    fn test_resolve_invalid_inputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = guard_for(&dir);

        assert!(matches!(guard.resolve(""), Err(FileError::InvalidPath { .. })));
        assert!(matches!(guard.resolve("   "), Err(FileError::InvalidPath { .. })));
        assert!(matches!(
            guard.resolve("/tmp/a\0b"),
            Err(FileError::InvalidPath { .. })
        ));
        let reserved = format!("{}/CON", dir.path().display());
        assert!(matches!(
            guard.resolve(&reserved),
            Err(FileError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_backup_path_is_sibling() {
        let resolved = ResolvedPath(PathBuf::from("/tmp/notes.md"));
        assert_eq!(resolved.backup_path(), PathBuf::from("/tmp/notes.md.backup"));
        assert_eq!(resolved.file_name(), "notes.md");
    }

    #[test]
    fn test_allowed_roots_drop_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("does-not-exist");
        let roots = AllowedRoots::new([dir.path(), missing.as_path(), dir.path()])
            .expect("one root exists");
        assert_eq!(roots.iter().count(), 1);

        assert!(AllowedRoots::new([missing]).is_err());
    }

    // Property: whatever traversal segments are used, a successful resolution
    // never leaves the root.
    proptest! {
        #[test]
        fn prop_resolution_stays_within_root(
            segments in prop::collection::vec(
                prop::sample::select(vec!["..", ".", "a", "b", "c.md", "..", "x y"]),
                1..8,
            ),
        ) {
            let dir = tempfile::tempdir().expect("tempdir");
            let guard = guard_for(&dir);
            let root = canonical_root(&dir);
            let raw = format!("{}/{}", dir.path().display(), segments.join("/"));

            match guard.resolve(&raw) {
                Ok(resolved) => prop_assert!(resolved.as_path().starts_with(&root)),
                Err(FileError::AccessDenied { .. }) | Err(FileError::InvalidPath { .. }) => {}
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }
    }
}
