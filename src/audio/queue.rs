use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{audio::track::Track, error::QueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Nothing is current; every entry is pending.
    Idle,
    /// The head entry is the current track.
    Playing,
}

/// Ordered tracks for one guild. While playing, the head is the current
/// track and everything behind it is pending.
#[derive(Debug)]
pub struct Queue {
    tracks: VecDeque<Track>,
    cursor: Cursor,
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue {
    pub fn new() -> Self {
        Self {
            tracks: VecDeque::new(),
            cursor: Cursor::Idle,
        }
    }

    /// Appends tracks in order.
    pub fn enqueue<I>(&mut self, tracks: I)
    where
        I: IntoIterator<Item = Track>,
    {
        let before = self.tracks.len();
        self.tracks.extend(tracks);
        info!("➕ Queued {} track(s)", self.tracks.len() - before);
    }

    /// Makes the head current if nothing is. Returns the current track.
    pub fn start(&mut self) -> Option<Track> {
        if self.cursor == Cursor::Idle {
            self.cursor = if self.tracks.is_empty() {
                Cursor::Idle
            } else {
                Cursor::Playing
            };
        }
        self.current().cloned()
    }

    /// Retires the head entry (the current track while playing) and makes
    /// the next one current. Returns `None` once the queue is exhausted;
    /// calling it again keeps returning `None`.
    pub fn advance(&mut self) -> Option<Track> {
        if let Some(done) = self.tracks.pop_front() {
            debug!("⏭️ Retired from queue: {}", done);
        }

        match self.tracks.front() {
            Some(next) => {
                self.cursor = Cursor::Playing;
                info!("➡️ Next in queue: {}", next);
                Some(next.clone())
            }
            None => {
                self.cursor = Cursor::Idle;
                debug!("📭 Queue exhausted");
                None
            }
        }
    }

    pub fn current(&self) -> Option<&Track> {
        match self.cursor {
            Cursor::Playing => self.tracks.front(),
            Cursor::Idle => None,
        }
    }

    /// Removes a pending track; `index` follows the order of [`Queue::titles`].
    pub fn remove_at(&mut self, index: usize) -> Result<Track, QueueError> {
        let len = self.pending_len();
        let offset = self.pending_offset();
        let removed = (index < len)
            .then(|| self.tracks.remove(index + offset))
            .flatten()
            .ok_or(QueueError::IndexOutOfRange { index, len })?;

        debug!("❌ Removed track at position {}: {}", index, removed);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = Cursor::Idle;
        info!("🗑️ Queue cleared");
    }

    /// Display strings of the pending tracks, current track excluded.
    pub fn titles(&self) -> Vec<String> {
        self.pending().map(ToString::to_string).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.tracks.len() - self.pending_offset()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn pending(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().skip(self.pending_offset())
    }

    fn pending_offset(&self) -> usize {
        match self.cursor {
            Cursor::Playing if !self.tracks.is_empty() => 1,
            _ => 0,
        }
    }
}
