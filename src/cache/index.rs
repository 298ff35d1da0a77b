use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::IndexError;
use crate::sources::{library::normalize, Service, TrackIdentity};

/// One cached download, exactly as persisted in the index file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub title: String,
    pub id: String,
    /// Forward-slash path relative to the cache root.
    pub file: String,
    pub service: Service,
    /// Seconds.
    pub duration: u64,
    /// Last access, seconds since the epoch.
    pub timestamp: u64,
}

impl CacheEntry {
    pub fn matches(&self, identity: &TrackIdentity) -> bool {
        self.service == identity.service && self.id == identity.id
    }

    /// Absolute location of the cached file.
    pub fn path(&self, cache_root: &Path) -> PathBuf {
        cache_root.join(&self.file)
    }
}

/// Durable list of cached tracks.
///
/// The file is always rewritten whole; there is no partial update format.
#[derive(Debug)]
pub struct CacheIndex {
    path: PathBuf,
    cache_root: PathBuf,
    entries: Vec<CacheEntry>,
}

impl CacheIndex {
    /// Loads the index, degrading to empty on a missing or unreadable file.
    ///
    /// Entries whose file has disappeared are dropped and the cleaned index
    /// is written back.
    pub async fn load(path: PathBuf, cache_root: PathBuf) -> Self {
        let entries = match read_entries(&path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ {} - iniciando con un índice de caché vacío", e);
                Vec::new()
            }
        };

        let mut index = Self {
            path,
            cache_root,
            entries,
        };

        let purged = index.purge_missing_files().await;
        if purged > 0 {
            if let Err(e) = index.persist().await {
                error!("❌ No se pudo reescribir el índice tras la purga: {}", e);
            }
        }

        info!(
            "🗂️ Índice de caché cargado: {} entradas desde {}",
            index.entries.len(),
            index.path.display()
        );
        index
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn get(&self, identity: &TrackIdentity) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.matches(identity))
    }

    pub fn get_mut(&mut self, identity: &TrackIdentity) -> Option<&mut CacheEntry> {
        self.entries.iter_mut().find(|e| e.matches(identity))
    }

    /// Next access stamp: wall clock, but always above every stamp already in
    /// the index so the most recent touch is never tied with an older one.
    pub fn next_stamp(&self, now: u64) -> u64 {
        let highest = self.entries.iter().map(|e| e.timestamp).max();
        match highest {
            Some(max) if max >= now => max + 1,
            _ => now,
        }
    }

    /// Inserts or replaces the entry for the same identity.
    pub fn upsert(&mut self, entry: CacheEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.service == entry.service && e.id == entry.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Removes least-recently-used entries until at most `capacity` remain.
    ///
    /// Returns what was removed; deleting the files is the caller's job.
    pub fn evict_to(&mut self, capacity: usize) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => evicted.push(self.entries.remove(i)),
                None => break,
            }
        }
        evicted
    }

    /// Stores a path under the cache root in the persisted relative form.
    pub fn relative_file(&self, file: &Path) -> String {
        match file.strip_prefix(&self.cache_root) {
            Ok(relative) => normalize(relative),
            Err(_) => normalize(file),
        }
    }

    /// Rewrites the whole index file.
    ///
    /// Goes through a temporary sibling and a rename so a crash mid-write
    /// leaves the previous version intact.
    pub async fn persist(&self) -> Result<(), IndexError> {
        let io_err = |source: std::io::Error| IndexError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        debug!("💾 Índice de caché guardado ({} entradas)", self.entries.len());
        Ok(())
    }

    async fn purge_missing_files(&mut self) -> usize {
        let mut kept = Vec::with_capacity(self.entries.len());
        let mut purged = 0;

        for entry in self.entries.drain(..) {
            if fs::metadata(entry.path(&self.cache_root)).await.is_ok() {
                kept.push(entry);
            } else {
                error!(
                    "❌ La entrada {} apunta a un archivo inexistente {}, purgando",
                    entry.id, entry.file
                );
                purged += 1;
            }
        }

        self.entries = kept;
        purged
    }
}

async fn read_entries(path: &Path) -> Result<Vec<CacheEntry>, IndexError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(IndexError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&content).map_err(|source| IndexError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn entry(id: &str, timestamp: u64) -> CacheEntry {
        CacheEntry {
            title: format!("Track {id}"),
            id: id.to_string(),
            file: format!("YouTube/{id}.opus"),
            service: Service::YouTube,
            duration: 100,
            timestamp,
        }
    }

    #[tokio::test]
    async fn missing_empty_and_corrupt_files_load_as_empty() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("music");

        let index = CacheIndex::load(dir.path().join("absent.json"), root.clone()).await;
        assert!(index.is_empty());

        std::fs::write(dir.path().join("empty.json"), "").unwrap();
        let index = CacheIndex::load(dir.path().join("empty.json"), root.clone()).await;
        assert!(index.is_empty());

        std::fs::write(dir.path().join("bad.json"), "[{not json").unwrap();
        let index = CacheIndex::load(dir.path().join("bad.json"), root).await;
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn persisted_format_round_trips_and_drops_missing_files() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("music");
        std::fs::create_dir_all(root.join("YouTube")).unwrap();
        std::fs::write(root.join("YouTube/abc.opus"), b"x").unwrap();

        let path = dir.path().join("toc.json");
        std::fs::write(
            &path,
            r#"[
                {"title":"A","id":"abc","file":"YouTube/abc.opus","service":"YouTube","duration":10,"timestamp":100},
                {"title":"B","id":"gone","file":"YouTube/gone.opus","service":"YouTube","duration":10,"timestamp":90}
            ]"#,
        )
        .unwrap();

        let index = CacheIndex::load(path.clone(), root.clone()).await;
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].id, "abc");

        // The purge was written back.
        let reloaded = CacheIndex::load(path, root).await;
        assert_eq!(reloaded.entries(), index.entries());
    }

    #[test]
    fn evicts_smallest_timestamps_first() {
        let mut index = CacheIndex {
            path: "toc.json".into(),
            cache_root: "music".into(),
            entries: vec![entry("c", 30), entry("a", 10), entry("d", 40), entry("b", 20)],
        };

        let evicted: Vec<_> = index.evict_to(2).into_iter().map(|e| e.id).collect();
        assert_eq!(evicted, vec!["a", "b"]);
        let kept: Vec<_> = index.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(kept, vec!["c", "d"]);
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let index = CacheIndex {
            path: "toc.json".into(),
            cache_root: "music".into(),
            entries: vec![entry("a", 500)],
        };
        assert_eq!(index.next_stamp(200), 501);
        assert_eq!(index.next_stamp(900), 900);
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let index = CacheIndex {
            path: "toc.json".into(),
            cache_root: PathBuf::from("data").join("music"),
            entries: Vec::new(),
        };
        let file = PathBuf::from("data")
            .join("music")
            .join("SoundCloud")
            .join("u.t.opus");
        assert_eq!(index.relative_file(&file), "SoundCloud/u.t.opus");
    }
}
