//! # Cache Module
//!
//! Bounded on-disk cache of downloaded tracks.
//!
//! The [`CacheIndex`] is the single source of truth: a track is cached if and
//! only if it has an index entry, and every entry's file must exist. Files on
//! disk without an entry are orphans and get swept; entries without a file are
//! purged when the index is loaded.
//!
//! ## Capacity
//!
//! After every insert the index is trimmed back to `max_cached_tracks` by
//! removing the entries with the oldest access stamp and deleting their files.
//! Local jukebox/playlist files never enter the index, so they never count.
//!
//! ## Concurrency
//!
//! - All index mutations (refresh, insert, evict, persist) happen under one
//!   async mutex.
//! - Fetches run outside that lock and are single-flight per identity: a
//!   second request for a track that is already downloading awaits the same
//!   shared result instead of starting its own download.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use jukebot::cache::{CacheSettings, MediaCache};
//! # use jukebot::sources::{MediaFetcher, TrackIdentity, YtDlpFetcher};
//! # async fn example() -> anyhow::Result<()> {
//! let cache = MediaCache::open("data/toc.json".into(), "data/music".into(), CacheSettings::default()).await;
//! let fetcher: Arc<dyn MediaFetcher> = Arc::new(YtDlpFetcher::new("yt-dlp", 900));
//!
//! let identity = TrackIdentity::from_link("https://youtu.be/dQw4w9WgXcQ").unwrap();
//! let entry = cache.get_or_fetch(&identity, fetcher).await?;
//! println!("cached at {}", entry.file);
//! # Ok(())
//! # }
//! ```

pub mod index;
pub mod sweep;

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use index::{CacheEntry, CacheIndex};

use crate::{
    error::FetchError,
    sources::{MediaFetcher, TrackIdentity},
};

type SharedFetch = Shared<BoxFuture<'static, Result<CacheEntry, FetchError>>>;

/// Source of "now" for access stamps.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub max_cached_tracks: usize,
    /// Seconds; media this long or longer is refused.
    pub max_track_duration: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cached_tracks: 50,
            max_track_duration: 900,
        }
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    orphans_removed: AtomicU64,
}

/// Point-in-time counters, for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatistics {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub orphans_removed: u64,
}

impl CacheStatistics {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Index-backed media cache, cheap to clone and share across sessions.
#[derive(Clone)]
pub struct MediaCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    index: Mutex<CacheIndex>,
    cache_root: PathBuf,
    in_flight: DashMap<TrackIdentity, SharedFetch>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl MediaCache {
    /// Loads the index from `index_file` with the wall clock.
    pub async fn open(index_file: PathBuf, cache_root: PathBuf, settings: CacheSettings) -> Self {
        let index = CacheIndex::load(index_file, cache_root).await;
        Self::with_clock(index, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(index: CacheIndex, settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let cache_root = index.cache_root().to_path_buf();
        Self {
            inner: Arc::new(CacheInner {
                index: Mutex::new(index),
                cache_root,
                in_flight: DashMap::new(),
                settings,
                clock,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.inner.cache_root
    }

    pub fn settings(&self) -> CacheSettings {
        self.inner.settings
    }

    /// Looks an identity up without touching its access stamp.
    pub async fn lookup(&self, identity: &TrackIdentity) -> Option<CacheEntry> {
        self.inner.index.lock().await.get(identity).cloned()
    }

    /// Absolute path of a cached entry's file.
    pub fn file_path(&self, entry: &CacheEntry) -> PathBuf {
        entry.path(&self.inner.cache_root)
    }

    /// Serves `identity` from the cache, fetching it on a miss.
    ///
    /// A hit refreshes the access stamp and never re-fetches. A failed fetch
    /// leaves the index untouched.
    pub async fn get_or_fetch(
        &self,
        identity: &TrackIdentity,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Result<CacheEntry, FetchError> {
        if let Some(entry) = self.inner.refresh(identity).await {
            debug!("✅ Cache hit para {}", identity);
            return Ok(entry);
        }

        let fetch = match self.inner.in_flight.entry(identity.clone()) {
            Entry::Occupied(existing) => {
                debug!("⏳ Esperando la descarga en curso de {}", identity);
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let inner = self.inner.clone();
                let identity = identity.clone();
                let fetch = async move {
                    let result = inner.fetch_and_insert(&identity, fetcher).await;
                    inner.in_flight.remove(&identity);
                    result
                }
                .boxed()
                .shared();
                slot.insert(fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// Deletes files under the cache root that no index entry references.
    ///
    /// Downloads in progress are left alone.
    pub async fn sweep_orphans(&self) -> usize {
        let index = self.inner.index.lock().await;

        let referenced: Vec<PathBuf> = index
            .entries()
            .iter()
            .map(|e| e.path(&self.inner.cache_root))
            .collect();
        let downloading: Vec<String> = self
            .inner
            .in_flight
            .iter()
            .map(|f| {
                f.key()
                    .cache_destination(&self.inner.cache_root)
                    .with_extension("")
                    .to_string_lossy()
                    .to_string()
            })
            .collect();

        let root = self.inner.cache_root.clone();
        let orphans = tokio::task::spawn_blocking(move || {
            sweep::find_orphans(&root, |path| {
                referenced.iter().any(|r| r == path)
                    || downloading
                        .iter()
                        .any(|stem| path.to_string_lossy().starts_with(stem.as_str()))
            })
        })
        .await
        .unwrap_or_else(|e| {
            error!("❌ El escaneo de huérfanos falló: {}", e);
            Vec::new()
        });

        let mut removed = 0;
        for orphan in orphans {
            info!("🧹 Eliminando archivo huérfano: {}", orphan.display());
            match tokio::fs::remove_file(&orphan).await {
                Ok(()) => removed += 1,
                Err(e) => error!("Error al eliminar {}: {}", orphan.display(), e),
            }
        }

        // Held until here so nothing is inserted mid-sweep.
        drop(index);

        self.inner
            .stats
            .orphans_removed
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub async fn stats(&self) -> CacheStatistics {
        let entries = self.inner.index.lock().await.len();
        let stats = &self.inner.stats;
        CacheStatistics {
            entries,
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            evictions: stats.evictions.load(Ordering::Relaxed),
            orphans_removed: stats.orphans_removed.load(Ordering::Relaxed),
        }
    }
}

impl CacheInner {
    /// On a hit, bumps the access stamp and rewrites the index.
    async fn refresh(&self, identity: &TrackIdentity) -> Option<CacheEntry> {
        let mut index = self.index.lock().await;
        let stamp = index.next_stamp(self.clock.now());
        let entry = {
            let entry = index.get_mut(identity)?;
            entry.timestamp = stamp;
            entry.clone()
        };

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = index.persist().await {
            error!("❌ No se pudo guardar el índice de caché: {}", e);
        }
        Some(entry)
    }

    async fn fetch_and_insert(
        &self,
        identity: &TrackIdentity,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Result<CacheEntry, FetchError> {
        // A previous fetch may have landed between the caller's miss and now.
        if let Some(entry) = self.refresh(identity).await {
            return Ok(entry);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let destination = identity.cache_destination(&self.cache_root);
        let fetched = fetcher.fetch(identity, &destination).await?;

        if fetched.duration_secs >= self.settings.max_track_duration {
            warn!("⏱️ {} es demasiado largo ({}s), descartando", identity, fetched.duration_secs);
            if let Err(e) = tokio::fs::remove_file(&fetched.file).await {
                error!("Error al eliminar {}: {}", fetched.file.display(), e);
            }
            return Err(FetchError::TooLong {
                duration_secs: fetched.duration_secs,
                limit_secs: self.settings.max_track_duration,
            });
        }

        if fetched.canonical_id != identity.id {
            debug!(
                "El servicio reportó el id {} para {}, se mantiene el id del enlace",
                fetched.canonical_id, identity
            );
        }

        let mut index = self.index.lock().await;
        let entry = CacheEntry {
            title: fetched.title,
            id: identity.id.clone(),
            file: index.relative_file(&fetched.file),
            service: identity.service,
            duration: fetched.duration_secs,
            timestamp: index.next_stamp(self.clock.now()),
        };
        index.upsert(entry.clone());

        let evicted = index.evict_to(self.settings.max_cached_tracks);
        for old in &evicted {
            let path = old.path(&self.cache_root);
            info!("🗑️ Desalojando {} ({})", old.title, old.file);
            // Still under the index lock: a re-fetch of this identity cannot
            // write the same path until we are done.
            if let Err(e) = tokio::fs::remove_file(&path).await {
                error!("Error al eliminar {}: {}", path.display(), e);
            }
        }
        self.stats
            .evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);

        if let Err(e) = index.persist().await {
            error!("❌ No se pudo guardar el índice de caché: {}", e);
        }

        info!("💾 En caché: {} ({} de {})", entry.title, index.len(), self.settings.max_cached_tracks);
        Ok(entry)
    }
}

/// Periodic orphan sweep until `shutdown` fires.
pub fn spawn_maintenance(
    cache: MediaCache,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; startup already swept.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Mantenimiento de caché detenido");
                    break;
                }
                _ = interval.tick() => {
                    let removed = cache.sweep_orphans().await;
                    let stats = cache.stats().await;
                    info!(
                        "🧹 Mantenimiento: {} huérfanos eliminados, {} en caché, tasa de aciertos {:.0}%",
                        removed,
                        stats.entries,
                        stats.hit_ratio() * 100.0
                    );
                }
            }
        }
    })
}
