use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{FetchedMedia, MediaFetcher, TrackIdentity};
use crate::error::FetchError;

/// Fields we read from `yt-dlp --dump-single-json`.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
}

/// Fetcher backed by the `yt-dlp` binary (with ffmpeg for opus extraction).
pub struct YtDlpFetcher {
    binary: String,
    max_duration: u64,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>, max_duration: u64) -> Self {
        Self {
            binary: binary.into(),
            max_duration,
        }
    }

    /// Checks that yt-dlp can run at all; used at startup for a clear warning.
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.binary, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `--` keeps a link starting with `-` from being read as an option.
    fn probe_command(&self, link: &str) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["--dump-single-json", "--no-playlist", "--no-warnings", "--"])
            .arg(link);
        command
    }

    fn download_command(&self, link: &str, destination: &Path) -> Command {
        // yt-dlp appends the extension itself after extraction.
        let template = destination.with_extension("%(ext)s");

        let mut command = Command::new(&self.binary);
        command
            .args([
                "--no-playlist",
                "--no-warnings",
                "--format",
                "bestaudio/best",
                "--max-filesize",
                "25M",
                "--extract-audio",
                "--audio-format",
                "opus",
                "--audio-quality",
                "192K",
                "--output",
            ])
            .arg(template)
            .arg("--")
            .arg(link);
        command
    }

    async fn probe(&self, link: &str) -> Result<YtDlpInfo, FetchError> {
        let output = self
            .probe_command(link)
            .output()
            .await
            .map_err(|e| FetchError::Metadata(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Metadata(stderr.trim().to_string()));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| FetchError::Metadata(e.to_string()))
    }

    /// Downloads `link` as opus to `destination`, whatever its extension.
    async fn download(&self, link: &str, destination: &Path) -> Result<PathBuf, FetchError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Download(e.to_string()))?;
        }

        let output = self
            .download_command(link, destination)
            .output()
            .await
            .map_err(|e| FetchError::Download(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Download(stderr.trim().to_string()));
        }

        let file = destination.with_extension("opus");
        if tokio::fs::metadata(&file).await.is_err() {
            return Err(FetchError::Download(format!(
                "yt-dlp finished but {} is missing",
                file.display()
            )));
        }
        Ok(file)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        identity: &TrackIdentity,
        destination: &Path,
    ) -> Result<FetchedMedia, FetchError> {
        let link = identity.link();
        info!("⬇️ Descargando {} desde {}", identity, link);

        let meta = self.probe(&link).await?;
        let duration_secs = meta.duration.unwrap_or(0.0).round() as u64;

        // Refuse before spending bandwidth on it.
        if duration_secs >= self.max_duration {
            warn!("⏱️ {} dura {}s, descarga rechazada", identity, duration_secs);
            return Err(FetchError::TooLong {
                duration_secs,
                limit_secs: self.max_duration,
            });
        }

        let file = self.download(&link, destination).await?;

        debug!("✅ Descargado {} ({}s) en {}", meta.title, duration_secs, file.display());

        Ok(FetchedMedia {
            title: meta.title,
            canonical_id: meta.id,
            file,
            duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_fields_it_needs() {
        let raw = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna","duration":212.0,"formats":[]}"#;
        let info: YtDlpInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.duration, Some(212.0));
    }

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn links_are_passed_after_the_option_terminator() {
        let fetcher = YtDlpFetcher::new("yt-dlp", 900);

        let probe = args(&fetcher.probe_command("-o/etc/passwd"));
        assert_eq!(probe[probe.len() - 2..].to_vec(), vec!["--", "-o/etc/passwd"]);

        let download = args(&fetcher.download_command(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            Path::new("/cache/YouTube/dQw4w9WgXcQ.opus"),
        ));
        assert_eq!(
            download[download.len() - 3..].to_vec(),
            vec![
                "/cache/YouTube/dQw4w9WgXcQ.%(ext)s",
                "--",
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_fetch_error() {
        let fetcher = YtDlpFetcher::new("definitely-not-yt-dlp-binary", 900);
        let identity = TrackIdentity::new(crate::sources::Service::YouTube, "dQw4w9WgXcQ");
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher
            .fetch(&identity, &identity.cache_destination(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Metadata(_)));
    }
}
