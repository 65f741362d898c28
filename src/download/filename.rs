//! Filename and path helpers for the download worker.
//!
//! The spec derives a descriptor's filename directly from its
//! `target_path`'s last path segment; there is no Content-Disposition or
//! resolver-metadata-driven naming here.

use std::path::{Component, Path, PathBuf};

/// Returns the last path segment of `target_path`, falling back to
/// `download.bin` when the path has no file name component.
#[must_use]
pub fn filename_from_target_path(target_path: &Path) -> String {
    target_path
        .file_name()
        .and_then(|s| s.to_str())
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download.bin".to_string())
}

/// Sanitizes a filename for filesystem safety, replacing characters that
/// are invalid on common filesystems: `/ \ : * ? " < > |` and control
/// characters.
#[must_use]
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Normalizes a queue name: `Path::clean()`-style normalization, returning
/// `None` if the input is empty, too long, or not already in clean form
/// (contains `..`, repeated separators, or otherwise isn't a single clean
/// path component).
#[must_use]
pub fn normalize_queue_name(name: &str, max_len: usize) -> Option<String> {
    if name.is_empty() || name.len() > max_len {
        return None;
    }
    let cleaned = clean_path(name);
    (cleaned == name).then_some(cleaned)
}

/// Minimal `Path::clean()`-equivalent: collapses repeated separators and
/// resolves `.`/`..` components lexically, without touching the filesystem.
fn clean_path(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in input.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|p| *p != "..") {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    let joined = out.join("/");
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Resolves a unique file path under `dir`, adding a numeric suffix if a
/// file with `filename` already exists.
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/') || sanitized.contains('\\') || sanitized.trim_matches('_').is_empty() {
            "download.bin".to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filename_from_target_path_uses_last_segment() {
        let path = Path::new("/downloads/papers/thesis.pdf");
        assert_eq!(filename_from_target_path(path), "thesis.pdf");
    }

    #[test]
    fn test_filename_from_target_path_missing_name_falls_back() {
        let path = Path::new("/");
        assert_eq!(filename_from_target_path(path), "download.bin");
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file:name.pdf"), "file_name.pdf");
    }

    #[test]
    fn test_normalize_queue_name_accepts_clean_name() {
        assert_eq!(normalize_queue_name("nightly", 50), Some("nightly".to_string()));
    }

    #[test]
    fn test_normalize_queue_name_rejects_empty() {
        assert_eq!(normalize_queue_name("", 50), None);
    }

    #[test]
    fn test_normalize_queue_name_rejects_too_long() {
        let long_name = "a".repeat(51);
        assert_eq!(normalize_queue_name(&long_name, 50), None);
    }

    #[test]
    fn test_normalize_queue_name_rejects_traversal() {
        assert_eq!(normalize_queue_name("../escape", 50), None);
        assert_eq!(normalize_queue_name("a//b", 50), None);
    }

    #[test]
    fn test_resolve_unique_path_no_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let path = resolve_unique_path(temp_dir.path(), "test.pdf");
        assert_eq!(path, temp_dir.path().join("test.pdf"));
    }

    #[test]
    fn test_resolve_unique_path_with_conflict() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("test.pdf"), b"existing").unwrap();
        let path = resolve_unique_path(temp_dir.path(), "test.pdf");
        assert_eq!(path, temp_dir.path().join("test_1.pdf"));
    }

    #[test]
    fn test_resolve_unique_path_protects_against_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        for malicious in ["../../etc/passwd", "subdir/../../../etc/passwd"] {
            let path = resolve_unique_path(base, malicious);
            assert!(path.starts_with(base));
        }
    }
}
