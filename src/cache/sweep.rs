use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lists every regular file under `root` that `keep` rejects.
///
/// Blocking; callers on the runtime wrap it in `spawn_blocking`.
pub fn find_orphans(root: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| !keep(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reports_only_rejected_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("YouTube")).unwrap();
        std::fs::write(dir.path().join("YouTube/keep.opus"), b"").unwrap();
        std::fs::write(dir.path().join("YouTube/stale.opus"), b"").unwrap();

        let orphans = find_orphans(dir.path(), |p| p.ends_with("keep.opus"));
        assert_eq!(orphans, vec![dir.path().join("YouTube/stale.opus")]);
    }

    #[test]
    fn missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        assert!(find_orphans(&dir.path().join("nope"), |_| false).is_empty());
    }
}
