use serde::Deserialize;
use std::{
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use crate::error::ResolveError;

const UNKNOWN_TITLE: &str = "Unknown title";

/// Metadata record as printed by yt-dlp. Every field is optional; the
/// extractor omits whatever the source does not provide.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackMetadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub webpage_url: Option<String>,
    pub ext: Option<String>,
    pub artist: Option<String>,
    pub channel: Option<String>,
}

/// One resolved, downloaded media item.
#[derive(Debug, Clone)]
pub struct Track {
    id: String,
    title: Option<String>,
    source_url: Option<String>,
    attribution: Option<String>,
    local_path: PathBuf,
}

impl Track {
    pub fn new(id: impl Into<String>, title: Option<String>, download_dir: &Path, ext: Option<&str>) -> Self {
        let id = id.into();
        let local_path = local_path_for(download_dir, &id, ext);
        Self {
            id,
            title,
            source_url: None,
            attribution: None,
            local_path,
        }
    }

    /// Builds a track from extractor metadata. Only `id` is mandatory since
    /// the on-disk file is named after it.
    pub fn from_metadata(meta: TrackMetadata, download_dir: &Path) -> Result<Self, ResolveError> {
        let id = meta
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ResolveError::Extraction("metadata without an id".to_string()))?;

        let track = Self::new(id, meta.title, download_dir, meta.ext.as_deref());
        let track = match meta.webpage_url {
            Some(url) => track.with_source_url(url),
            None => track,
        };
        Ok(match meta.artist.or(meta.channel) {
            Some(attribution) => track.with_attribution(attribution),
            None => track,
        })
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_TITLE)
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn attribution(&self) -> Option<&str> {
        self.attribution.as_deref()
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}

fn local_path_for(download_dir: &Path, id: &str, ext: Option<&str>) -> PathBuf {
    match ext.filter(|e| !e.is_empty()) {
        Some(ext) => download_dir.join(format!("{id}.{ext}")),
        None => download_dir.join(id),
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.title();
        match self.attribution() {
            Some(source) if !title.contains(source) => write!(f, "{source} - {title}"),
            _ => f.write_str(title),
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(id: &str) -> TrackMetadata {
        TrackMetadata {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn display_prefixes_attribution_missing_from_title() {
        let track = Track::from_metadata(
            TrackMetadata {
                title: Some("Blue Monday".into()),
                artist: Some("New Order".into()),
                ..meta("abc")
            },
            Path::new("/tmp"),
        )
        .unwrap();
        assert_eq!(track.to_string(), "New Order - Blue Monday");
    }

    #[test]
    fn display_keeps_title_that_already_names_the_channel() {
        let track = Track::from_metadata(
            TrackMetadata {
                title: Some("Daft Punk - Veridis Quo".into()),
                channel: Some("Daft Punk".into()),
                ..meta("abc")
            },
            Path::new("/tmp"),
        )
        .unwrap();
        assert_eq!(track.to_string(), "Daft Punk - Veridis Quo");
    }

    #[test]
    fn artist_wins_over_channel() {
        let track = Track::from_metadata(
            TrackMetadata {
                title: Some("Song".into()),
                artist: Some("Artist".into()),
                channel: Some("Uploads Channel".into()),
                ..meta("abc")
            },
            Path::new("/tmp"),
        )
        .unwrap();
        assert_eq!(track.attribution(), Some("Artist"));
    }

    #[test]
    fn missing_title_falls_back_to_placeholder() {
        let track = Track::from_metadata(meta("abc"), Path::new("/tmp")).unwrap();
        assert_eq!(track.to_string(), "Unknown title");
        assert_eq!(track.source_url(), None);
    }

    #[test]
    fn local_path_is_derived_from_id_and_extension() {
        let track = Track::from_metadata(
            TrackMetadata {
                ext: Some("m4a".into()),
                ..meta("dQw4w9WgXcQ")
            },
            Path::new("/srv/download"),
        )
        .unwrap();
        assert_eq!(track.local_path(), Path::new("/srv/download/dQw4w9WgXcQ.m4a"));
    }

    #[test]
    fn metadata_without_id_is_rejected() {
        let err = Track::from_metadata(TrackMetadata::default(), Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, ResolveError::Extraction(_)));
    }

    #[test]
    fn equality_only_looks_at_id() {
        let a = Track::new("same", Some("First".into()), Path::new("/a"), Some("webm"));
        let b = Track::new("same", Some("Second".into()), Path::new("/b"), None);
        let c = Track::new("other", Some("First".into()), Path::new("/a"), Some("webm"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
