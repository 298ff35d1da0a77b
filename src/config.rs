use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: u64,

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub index_file: PathBuf,
    pub jukebox_dir: PathBuf,
    pub playlists_dir: PathBuf,

    // Cache
    pub max_cached_tracks: usize,
    pub max_track_duration: u64, // seconds
    pub maintenance_interval: u64, // seconds

    // Runtime
    pub worker_threads: usize,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir: PathBuf = std::env::var("DATA_DIR")
            .unwrap_or_else(|_| "data".to_string())
            .into();

        let config = Self {
            // Discord (required, startup aborts without them)
            discord_token: std::env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN and GUILD_ID must be set"))?,
            guild_id: std::env::var("GUILD_ID")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN and GUILD_ID must be set"))?
                .parse()?,

            // Paths
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("music")),
            index_file: std::env::var("INDEX_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("toc.json")),
            jukebox_dir: std::env::var("JUKEBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("jukebox")),
            playlists_dir: std::env::var("PLAYLISTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("playlists")),
            data_dir,

            // Cache
            max_cached_tracks: std::env::var("MAX_CACHED_TRACKS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_track_duration: std::env::var("MAX_TRACK_DURATION")
                .unwrap_or_else(|_| "900".to_string()) // 15 minutes
                .parse()?,
            maintenance_interval: std::env::var("MAINTENANCE_INTERVAL")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,

            // Runtime
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;
        std::fs::create_dir_all(&config.jukebox_dir)?;
        std::fs::create_dir_all(&config.playlists_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and guild id are present
    /// - The cache must hold at least one track
    /// - The duration limit and maintenance interval must be non-zero
    /// - At least one worker thread
    /// - Index, jukebox and playlists stay outside the cache dir
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.guild_id == 0 {
            anyhow::bail!("GUILD_ID must be a valid guild id");
        }

        if self.max_cached_tracks == 0 {
            anyhow::bail!("Max cached tracks must be greater than 0");
        }

        if self.max_track_duration == 0 {
            anyhow::bail!("Max track duration must be greater than 0");
        }

        if self.maintenance_interval == 0 {
            anyhow::bail!("Maintenance interval must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        // The orphan sweep deletes anything under the cache dir it does not
        // know about.
        let cache_dir = lexical(&self.cache_dir);
        for (name, path) in [
            ("INDEX_FILE", &self.index_file),
            ("JUKEBOX_DIR", &self.jukebox_dir),
            ("PLAYLISTS_DIR", &self.playlists_dir),
        ] {
            if lexical(path).starts_with(&cache_dir) {
                anyhow::bail!(
                    "{} ({}) must not live inside CACHE_DIR ({})",
                    name,
                    path.display(),
                    self.cache_dir.display()
                );
            }
        }

        Ok(())
    }

    pub fn maintenance_period(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: guild {}\n  \
            Paths: data={}, cache={}, index={}\n  \
            Cache: {} tracks max, {}s max duration, sweep every {}s\n  \
            Runtime: {} workers, fetcher `{}`",
            self.guild_id,
            self.data_dir.display(),
            self.cache_dir.display(),
            self.index_file.display(),
            self.max_cached_tracks,
            self.max_track_duration,
            self.maintenance_interval,
            self.worker_threads,
            self.ytdlp_path,
        )
    }
}

/// Absolute form of `path` with `.` and `..` folded away, without touching
/// the filesystem.
fn lexical(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: 0,

            data_dir: "data".into(),
            cache_dir: "data/music".into(),
            index_file: "data/toc.json".into(),
            jukebox_dir: "data/jukebox".into(),
            playlists_dir: "data/playlists".into(),

            max_cached_tracks: 50,
            max_track_duration: 900,
            maintenance_interval: 3600,

            worker_threads: num_cpus::get(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
