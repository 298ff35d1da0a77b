use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

/// Discord caps autocomplete responses at 25 choices.
pub const MAX_CHOICES: usize = 25;

/// A single autocomplete suggestion: label shown to the user, value sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub name: String,
    pub value: String,
}

/// Snapshot of the jukebox and playlist folders, used for autocomplete.
#[derive(Debug, Clone, Default)]
pub struct LocalLibrary {
    /// Jukebox files relative to the jukebox root, forward slashes, sorted.
    files: Vec<String>,
    /// Every sub-folder name found under the jukebox root.
    folders: Vec<String>,
    /// Top-level playlist folder names, sorted.
    playlists: Vec<String>,
}

impl LocalLibrary {
    pub fn scan(jukebox_dir: &Path, playlists_dir: &Path) -> Self {
        let mut files = Vec::new();
        let mut folders = Vec::new();

        for entry in WalkDir::new(jukebox_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().is_dir() {
                folders.push(name);
            } else if entry.file_type().is_file() {
                if let Ok(relative) = entry.path().strip_prefix(jukebox_dir) {
                    files.push(normalize(relative));
                }
            }
        }
        files.sort();

        let mut playlists: Vec<String> = WalkDir::new(playlists_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        playlists.sort();

        info!(
            "📚 Biblioteca indexada: {} archivos de jukebox, {} carpetas, {} playlists",
            files.len(),
            folders.len(),
            playlists.len()
        );

        Self {
            files,
            folders,
            playlists,
        }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn playlists(&self) -> &[String] {
        &self.playlists
    }

    /// Prefix matches on full relative paths win; with none, falls back to
    /// substring matches on folder names and top-level files.
    pub fn autocomplete_jukebox(&self, query: &str) -> Vec<Choice> {
        let query = query.to_lowercase();
        let mut result = Vec::new();

        if !query.is_empty() {
            result.extend(
                self.files
                    .iter()
                    .filter(|f| f.to_lowercase().starts_with(&query))
                    .map(|f| Choice {
                        name: strip_extension(f).to_string(),
                        value: f.clone(),
                    }),
            );
        }

        if result.is_empty() {
            result.extend(
                self.folders
                    .iter()
                    .filter(|d| d.to_lowercase().contains(&query))
                    .map(|d| Choice {
                        name: format!("{}/", d),
                        value: d.clone(),
                    }),
            );
            result.extend(
                self.files
                    .iter()
                    .filter(|f| !f.contains('/') && f.to_lowercase().contains(&query))
                    .map(|f| Choice {
                        name: strip_extension(f).to_string(),
                        value: f.clone(),
                    }),
            );
        }

        result.truncate(MAX_CHOICES);
        result
    }

    pub fn autocomplete_playlists(&self, query: &str) -> Vec<Choice> {
        let query = query.to_lowercase();
        self.playlists
            .iter()
            .filter(|p| p.to_lowercase().contains(&query))
            .take(MAX_CHOICES)
            .map(|p| Choice {
                name: p.clone(),
                value: p.clone(),
            })
            .collect()
    }
}

/// Relative path with forward slashes regardless of platform.
pub fn normalize(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_extension(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn library() -> (tempfile::TempDir, LocalLibrary) {
        let dir = tempdir().unwrap();
        let jukebox = dir.path().join("jukebox");
        let playlists = dir.path().join("playlists");
        fs::create_dir_all(jukebox.join("memes")).unwrap();
        fs::create_dir_all(playlists.join("Road Trip")).unwrap();
        fs::create_dir_all(playlists.join("focus")).unwrap();
        fs::write(jukebox.join("airhorn.opus"), b"").unwrap();
        fs::write(jukebox.join("memes/bruh.opus"), b"").unwrap();
        fs::write(jukebox.join("memes/air raid.opus"), b"").unwrap();

        let lib = LocalLibrary::scan(&jukebox, &playlists);
        (dir, lib)
    }

    #[test]
    fn scan_lists_relative_forward_slash_paths() {
        let (_dir, lib) = library();
        assert_eq!(
            lib.files(),
            &["airhorn.opus", "memes/air raid.opus", "memes/bruh.opus"]
        );
        assert_eq!(lib.playlists(), &["Road Trip", "focus"]);
    }

    #[test]
    fn prefix_match_wins_over_substring_search() {
        let (_dir, lib) = library();
        let choices = lib.autocomplete_jukebox("memes/b");
        assert_eq!(
            choices,
            vec![Choice {
                name: "memes/bruh".into(),
                value: "memes/bruh.opus".into()
            }]
        );
    }

    #[test]
    fn substring_search_covers_folders_and_top_level_files() {
        let (_dir, lib) = library();
        let names: Vec<_> = lib
            .autocomplete_jukebox("m")
            .into_iter()
            .map(|c| c.name)
            .collect();
        // "memes/..." is a prefix hit, so only those come back.
        assert_eq!(names, vec!["memes/air raid", "memes/bruh"]);

        let names: Vec<_> = lib
            .autocomplete_jukebox("horn")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["airhorn"]);

        let names: Vec<_> = lib
            .autocomplete_jukebox("")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["memes/", "airhorn"]);
    }

    #[test]
    fn playlist_autocomplete_is_case_insensitive() {
        let (_dir, lib) = library();
        let choices = lib.autocomplete_playlists("road");
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].value, "Road Trip");
    }
}
