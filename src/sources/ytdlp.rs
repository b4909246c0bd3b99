use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::MediaResolver;
use crate::{
    audio::track::{Track, TrackMetadata},
    error::ResolveError,
};

/// Concurrent yt-dlp processes allowed across all guilds.
const MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Per-connection timeout handed to yt-dlp, in seconds.
const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Upper bound for one whole extraction, download included.
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Resolver that downloads with yt-dlp into the shared download directory.
pub struct YtDlpResolver {
    binary: String,
    download_dir: PathBuf,
    rate_limiter: Semaphore,
    timeout: Duration,
}

/// What `--dump-single-json` prints: a single item, or a playlist whose
/// entries are items (null for entries that could not be extracted).
#[derive(Debug, Deserialize)]
struct ExtractedInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    entries: Option<Vec<Option<ExtractedInfo>>>,
    #[serde(flatten)]
    meta: TrackMetadata,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            download_dir: download_dir.into(),
            // Keep concurrent extractions low to avoid rate limiting.
            rate_limiter: Semaphore::new(MAX_CONCURRENT_DOWNLOADS),
            timeout: EXTRACTION_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the yt-dlp binary runs; returns its version.
    pub async fn verify(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("could not run {}", self.binary))?;

        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.binary, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn args(&self, query: &str) -> Vec<String> {
        let template = self.download_dir.join("%(id)s.%(ext)s");
        vec![
            "--format".into(),
            "bestaudio[ext=m4a]/bestaudio/best".into(),
            "--output".into(),
            template.to_string_lossy().into_owned(),
            "--default-search".into(),
            "ytsearch".into(),
            "--no-playlist".into(),
            "--socket-timeout".into(),
            SOCKET_TIMEOUT_SECS.to_string(),
            "--dump-single-json".into(),
            "--no-simulate".into(),
            "--no-progress".into(),
            "--no-warnings".into(),
            "--".into(),
            query.into(),
        ]
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<Track>, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        info!("📥 Requested download: {}", query);

        // A stalled extraction must not keep its permit forever.
        let mut command = Command::new(&self.binary);
        command.args(self.args(query)).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                warn!("yt-dlp timed out after {:?} for \"{}\"", self.timeout, query);
                ResolveError::Network(format!("yt-dlp timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| ResolveError::Unavailable(format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp failed for \"{}\": {}", query, stderr.trim());
            return Err(classify_failure(query, &stderr));
        }

        let tracks = parse_extraction(&String::from_utf8_lossy(&output.stdout), &self.download_dir)?;
        info!("✅ Downloaded {} track(s) for \"{}\"", tracks.len(), query);
        Ok(tracks)
    }
}

/// Builds tracks from yt-dlp's JSON output, flattening playlists.
fn parse_extraction(stdout: &str, download_dir: &Path) -> Result<Vec<Track>, ResolveError> {
    let info: ExtractedInfo = serde_json::from_str(stdout.trim())
        .map_err(|e| ResolveError::Extraction(format!("unreadable yt-dlp output: {e}")))?;

    let mut tracks = Vec::new();
    collect_tracks(info, download_dir, &mut tracks)?;
    Ok(tracks)
}

fn collect_tracks(info: ExtractedInfo, download_dir: &Path, out: &mut Vec<Track>) -> Result<(), ResolveError> {
    match (info.kind.as_deref(), info.entries) {
        (Some("playlist" | "multi_video"), Some(entries)) => {
            debug!("Expanding playlist with {} entries", entries.len());
            for entry in entries.into_iter().flatten() {
                collect_tracks(entry, download_dir, out)?;
            }
        }
        _ => out.push(Track::from_metadata(info.meta, download_dir)?),
    }
    Ok(())
}

fn classify_failure(query: &str, stderr: &str) -> ResolveError {
    let detail = stderr.trim().to_string();
    let lower = detail.to_lowercase();

    if lower.contains("unsupported url") {
        ResolveError::Unsupported(detail)
    } else if ["video unavailable", "no video results", "http error 404", "does not exist", "private video"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        ResolveError::NotFound(query.to_string())
    } else if ["unable to download", "timed out", "connection", "network is unreachable", "name or service not known"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        ResolveError::Network(detail)
    } else {
        ResolveError::Extraction(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DIR: &str = "/srv/download";

    #[test]
    fn single_video_becomes_one_track() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "ext": "m4a",
            "channel": "Rick Astley",
            "duration": 213
        }"#;

        let tracks = parse_extraction(json, Path::new(DIR)).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].to_string(), "Rick Astley - Never Gonna Give You Up");
        assert_eq!(tracks[0].local_path(), Path::new("/srv/download/dQw4w9WgXcQ.m4a"));
        assert_eq!(
            tracks[0].source_url(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn playlist_entries_are_expanded_and_nulls_skipped() {
        let json = r#"{
            "_type": "playlist",
            "id": "PL123",
            "title": "Road trip",
            "entries": [
                {"id": "a1", "title": "First", "ext": "webm"},
                null,
                {"id": "b2", "title": "Second", "ext": "m4a"}
            ]
        }"#;

        let tracks = parse_extraction(json, Path::new(DIR)).unwrap();

        let ids: Vec<_> = tracks.iter().map(Track::id).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn search_result_wrapper_is_unwrapped() {
        let json = r#"{"_type": "playlist", "id": "lofi", "entries": [{"id": "x", "title": "Lofi beats", "ext": "m4a"}]}"#;

        let tracks = parse_extraction(json, Path::new(DIR)).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title(), "Lofi beats");
    }

    #[test]
    fn garbage_output_is_an_extraction_error() {
        let err = parse_extraction("not json", Path::new(DIR)).unwrap_err();
        assert!(matches!(err, ResolveError::Extraction(_)));
    }

    #[test]
    fn failures_are_classified_from_stderr() {
        assert!(matches!(
            classify_failure("q", "ERROR: Unsupported URL: https://example.com"),
            ResolveError::Unsupported(_)
        ));
        assert_eq!(
            classify_failure("q", "ERROR: [youtube] abc: Video unavailable"),
            ResolveError::NotFound("q".into())
        );
        assert!(matches!(
            classify_failure("q", "ERROR: Unable to download webpage: <urlopen error timed out>"),
            ResolveError::Network(_)
        ));
        assert!(matches!(
            classify_failure("q", "ERROR: something odd happened"),
            ResolveError::Extraction(_)
        ));
    }

    #[test]
    fn query_is_passed_after_end_of_options() {
        let resolver = YtDlpResolver::new("yt-dlp", DIR);
        let args = resolver.args("--exec rm");

        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args[args.len() - 1], "--exec rm");
        assert!(args.contains(&"/srv/download/%(id)s.%(ext)s".to_string()));

        let timeout = args.iter().position(|a| a == "--socket-timeout").unwrap();
        assert_eq!(args[timeout + 1], "30");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stalled_extraction_times_out_and_frees_its_permit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stalled-yt-dlp");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolver = YtDlpResolver::new(script.to_string_lossy(), dir.path())
            .with_timeout(Duration::from_millis(200));

        let err = resolver.resolve("anything").await.unwrap_err();

        assert!(matches!(err, ResolveError::Network(_)));
        assert_eq!(resolver.rate_limiter.available_permits(), MAX_CONCURRENT_DOWNLOADS);
    }
}
