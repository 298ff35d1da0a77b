//! # Sources
//!
//! Turns what a user typed into something the player can queue:
//!
//! - remote links (YouTube, SoundCloud) become a [`TrackIdentity`] that the
//!   media cache serves or fetches,
//! - jukebox files and playlist folders resolve straight to local files that
//!   never enter the cache.
//!
//! The download itself sits behind [`MediaFetcher`]; [`ytdlp::YtDlpFetcher`]
//! is the production implementation.

pub mod library;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::error::{EnqueueError, FetchError};

pub use library::LocalLibrary;
pub use ytdlp::YtDlpFetcher;

static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?i)(?:.*youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?)/|.*[?&]v=)|.*youtu\.be/)([\w-]{11})"#,
    )
    .expect("youtube pattern compiles")
});

static SOUNDCLOUD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(?:https?://)?(?:www\.|m\.)?soundcloud\.com/([\w-]{1,23})/([\w-]{1,23})(?:/.*)?$")
        .expect("soundcloud pattern compiles")
});

/// Remote services the cache knows how to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    YouTube,
    SoundCloud,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::YouTube => "YouTube",
            Service::SoundCloud => "SoundCloud",
        }
    }

    fn hosts(&self) -> &'static [&'static str] {
        match self {
            Service::YouTube => &["youtube.com", "youtu.be", "youtube-nocookie.com"],
            Service::SoundCloud => &["soundcloud.com"],
        }
    }

    /// Rebuilds a fetchable link from a canonical id.
    pub fn canonical_link(&self, id: &str) -> String {
        match self {
            Service::YouTube => format!("https://www.youtube.com/watch?v={}", id),
            Service::SoundCloud => match id.split_once('.') {
                Some((user, track)) => format!("https://soundcloud.com/{}/{}", user, track),
                None => format!("https://soundcloud.com/{}", id),
            },
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity of a piece of remote media.
///
/// Only service and id are kept; the link a user typed is never fetched,
/// [`link`](Self::link) rebuilds the canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity {
    pub service: Service,
    pub id: String,
}

impl TrackIdentity {
    pub fn new(service: Service, id: impl Into<String>) -> Self {
        Self {
            service,
            id: id.into(),
        }
    }

    /// Matches a link against the supported services.
    pub fn from_link(link: &str) -> Option<Self> {
        let link = link.trim();

        if let Some(caps) = YOUTUBE_RE.captures(link) {
            return host_matches(link, Service::YouTube).then(|| Self::new(Service::YouTube, &caps[1]));
        }

        if let Some(caps) = SOUNDCLOUD_RE.captures(link) {
            let id = format!("{}.{}", &caps[1], &caps[2]);
            return Some(Self::new(Service::SoundCloud, id));
        }

        None
    }

    /// The link a fetcher should download from.
    pub fn link(&self) -> String {
        self.service.canonical_link(&self.id)
    }

    /// Where a fresh download for this identity should land.
    pub fn cache_destination(&self, cache_root: &Path) -> PathBuf {
        cache_root
            .join(self.service.as_str())
            .join(format!("{}.opus", self.id))
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.id)
    }
}

/// Whether the host of `link` belongs to `service`. Scheme-less links are
/// read as https.
fn host_matches(link: &str, service: Service) -> bool {
    let parsed = if link.contains("://") {
        Url::parse(link)
    } else {
        Url::parse(&format!("https://{link}"))
    };
    let Some(host) = parsed.ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) else {
        return false;
    };
    service
        .hosts()
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// What the fetch collaborator hands back after a successful download.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub title: String,
    pub canonical_id: String,
    pub file: PathBuf,
    pub duration_secs: u64,
}

/// Downloads remote media into the cache directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches `identity.link()` to (or next to) `destination`.
    async fn fetch(
        &self,
        identity: &TrackIdentity,
        destination: &Path,
    ) -> Result<FetchedMedia, FetchError>;
}

/// A request as issued by the command layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    Link(String),
    Jukebox(String),
    Playlist(String),
}

/// A file on disk outside the cache (jukebox or playlist entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub title: String,
    pub file: PathBuf,
    pub service: &'static str,
}

/// Outcome of resolving a [`SourceRequest`].
#[derive(Debug, Clone)]
pub enum Resolved {
    Remote(TrackIdentity),
    Local(LocalMedia),
    Playlist { name: String, tracks: Vec<LocalMedia> },
}

pub const JUKEBOX_LABEL: &str = "Jukebox";
pub const PLAYLIST_LABEL: &str = "Playlist";

/// Resolves requests against the supported services and the local folders.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    jukebox_dir: PathBuf,
    playlists_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(jukebox_dir: PathBuf, playlists_dir: PathBuf) -> Self {
        Self {
            jukebox_dir,
            playlists_dir,
        }
    }

    pub async fn resolve(&self, request: &SourceRequest) -> Result<Resolved, EnqueueError> {
        match request {
            SourceRequest::Link(link) => resolve_link(link).map(Resolved::Remote),
            SourceRequest::Jukebox(name) => self.resolve_jukebox(name).await,
            SourceRequest::Playlist(name) => self.resolve_playlist(name).await,
        }
    }

    /// Where a new jukebox file called `name` goes; `.opus` is added when
    /// missing.
    pub fn jukebox_destination(&self, name: &str) -> Result<(String, PathBuf), EnqueueError> {
        let name = name.trim();
        if name.trim_end_matches(".opus").is_empty() {
            return Err(EnqueueError::UnsupportedSource(name.to_string()));
        }
        let name = if name.ends_with(".opus") {
            name.to_string()
        } else {
            format!("{name}.opus")
        };
        let relative =
            safe_relative(&name).ok_or_else(|| EnqueueError::UnsupportedSource(name.clone()))?;
        let file = self.jukebox_dir.join(relative);
        Ok((name, file))
    }

    async fn resolve_jukebox(&self, name: &str) -> Result<Resolved, EnqueueError> {
        let relative = safe_relative(name)
            .ok_or_else(|| EnqueueError::UnsupportedSource(name.to_string()))?;
        let file = self.jukebox_dir.join(&relative);

        match fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => Ok(Resolved::Local(LocalMedia {
                title: name.to_string(),
                file,
                service: JUKEBOX_LABEL,
            })),
            _ => Err(EnqueueError::UnsupportedSource(name.to_string())),
        }
    }

    async fn resolve_playlist(&self, name: &str) -> Result<Resolved, EnqueueError> {
        let relative = safe_relative(name)
            .ok_or_else(|| EnqueueError::UnsupportedSource(name.to_string()))?;
        let folder = self.playlists_dir.join(relative);

        let mut entries = fs::read_dir(&folder)
            .await
            .map_err(|_| EnqueueError::UnsupportedSource(name.to_string()))?;

        let mut tracks = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_opus = path.extension().is_some_and(|ext| ext == "opus");
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !(is_opus && is_file) {
                continue;
            }
            let title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            tracks.push(LocalMedia {
                title,
                file: path,
                service: PLAYLIST_LABEL,
            });
        }

        if tracks.is_empty() {
            return Err(EnqueueError::EmptyPlaylist(name.to_string()));
        }

        tracks.sort_by(|a, b| a.file.cmp(&b.file));
        debug!("📂 Playlist {} resuelta a {} archivos", name, tracks.len());

        Ok(Resolved::Playlist {
            name: name.to_string(),
            tracks,
        })
    }
}

fn resolve_link(link: &str) -> Result<TrackIdentity, EnqueueError> {
    // Links without a scheme ("soundcloud.com/...") fail to parse and fall
    // through to the pattern match; anything with a non-web scheme is refused.
    if let Ok(parsed) = Url::parse(link.trim()) {
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EnqueueError::UnsupportedSource(link.to_string()));
        }
    }

    TrackIdentity::from_link(link).ok_or_else(|| EnqueueError::UnsupportedSource(link.to_string()))
}

/// Rejects absolute paths and `..` so lookups stay inside their root.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name.trim());
    if name.trim().is_empty() {
        return None;
    }
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| path.to_path_buf())
}
