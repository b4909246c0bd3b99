use thiserror::Error;

/// A query could not be turned into downloaded track(s).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("nothing found for \"{0}\"")]
    NotFound(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    /// The extractor itself could not be run.
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("position {index} is out of range (queue has {len} tracks)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Precondition failures reported back to the invoking user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("I'm not connected anywhere")]
    NotConnected,
    #[error("I'm not playing anything")]
    NotPlaying,
    /// The current track was stopped and the next one has not started yet.
    #[error("Already skipping, give me a moment")]
    Skipping,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no voice connection for this guild")]
    NotConnected,
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("track control failed: {0}")]
    Control(String),
}

/// Everything a [`PlaybackSession`](crate::audio::session::PlaybackSession)
/// operation can fail with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
