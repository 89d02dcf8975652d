//! Path utilities for upload naming and extension checks.
//!
//! Uploaded inputs live at `<upload_root>/<id><ext>` and encoded output at
//! `<output_root>/<id>/`. Extension comparisons are case-insensitive and
//! tolerate a leading `.` in the allow-list.

use std::path::{Path, PathBuf};

use crate::ids::JobId;

/// Extensions accepted for upload when no configuration overrides them.
pub const DEFAULT_UPLOAD_EXTENSIONS: &[&str] = &["mp4", "mkv", "flv", "avi", "mov"];

fn normalize(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// Lowercased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize)
        .filter(|ext| !ext.is_empty())
}

/// Check if a path carries one of the allowed extensions.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use encodeforge_common::paths::has_allowed_extension;
///
/// let allowed = vec!["mp4".to_string(), ".MKV".to_string()];
/// assert!(has_allowed_extension(Path::new("movie.mkv"), &allowed));
/// assert!(!has_allowed_extension(Path::new("notes.txt"), &allowed));
/// assert!(!has_allowed_extension(Path::new("mp4"), &allowed));
/// ```
pub fn has_allowed_extension(path: &Path, allowed: &[String]) -> bool {
    extension_of(path)
        .map(|ext| allowed.iter().any(|a| normalize(a) == ext))
        .unwrap_or(false)
}

/// Where an upload for `id` with extension `ext` is stored.
pub fn upload_path(upload_root: &Path, id: &JobId, ext: &str) -> PathBuf {
    let ext = normalize(ext);
    if ext.is_empty() {
        upload_root.join(id.as_str())
    } else {
        upload_root.join(format!("{}.{}", id, ext))
    }
}

/// Directory that receives the renditions for `id`.
pub fn output_dir(output_root: &Path, id: &JobId) -> PathBuf {
    output_root.join(id.as_str())
}

/// Locate an existing upload for `id`.
///
/// Tries the bare id first, then `<id>.<ext>` for each allowed extension.
pub fn find_upload(upload_root: &Path, id: &JobId, allowed: &[String]) -> Option<PathBuf> {
    let bare = upload_root.join(id.as_str());
    if bare.is_file() {
        return Some(bare);
    }
    allowed
        .iter()
        .map(|ext| upload_path(upload_root, id, ext))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        DEFAULT_UPLOAD_EXTENSIONS
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_has_allowed_extension() {
        let allowed = allowed();
        assert!(has_allowed_extension(Path::new("a.mp4"), &allowed));
        assert!(has_allowed_extension(Path::new("a.FLV"), &allowed));
        assert!(has_allowed_extension(Path::new("/x/y/a.mov"), &allowed));
        assert!(!has_allowed_extension(Path::new("a.webm"), &allowed));
        assert!(!has_allowed_extension(Path::new("a"), &allowed));
        assert!(!has_allowed_extension(Path::new("a."), &allowed));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("clip.MKV")), Some("mkv".to_string()));
        assert_eq!(extension_of(Path::new("clip")), None);
    }

    #[test]
    fn test_upload_and_output_paths() {
        let id = JobId::parse("abc").unwrap();
        let root = Path::new("/data/uploads");
        assert_eq!(
            upload_path(root, &id, ".mp4"),
            PathBuf::from("/data/uploads/abc.mp4")
        );
        assert_eq!(upload_path(root, &id, ""), PathBuf::from("/data/uploads/abc"));
        assert_eq!(
            output_dir(Path::new("/data/encoded"), &id),
            PathBuf::from("/data/encoded/abc")
        );
    }

    #[test]
    fn test_find_upload_prefers_bare_then_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let id = JobId::parse("job1").unwrap();

        assert_eq!(find_upload(dir, &id, &allowed()), None);

        std::fs::write(dir.join("job1.mkv"), b"x").unwrap();
        assert_eq!(find_upload(dir, &id, &allowed()), Some(dir.join("job1.mkv")));

        std::fs::write(dir.join("job1"), b"x").unwrap();
        assert_eq!(find_upload(dir, &id, &allowed()), Some(dir.join("job1")));
    }
}
