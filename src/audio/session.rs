use serenity::model::id::GuildId;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::Queue,
        track::Track,
        transport::{Completion, CompletionHandle, VoiceTransport},
    },
    error::{CommandError, PlaybackError, ResolveError, TransportError},
    sources::MediaResolver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Whether the first track of an `add` started right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    NowPlaying,
    Queued,
}

impl QueueStatus {
    pub fn label(self) -> &'static str {
        match self {
            QueueStatus::NowPlaying => "Now playing",
            QueueStatus::Queued => "Queued",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub status: QueueStatus,
    pub tracks: Vec<Track>,
}

/// What an accepted completion did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub finished: Option<Track>,
    pub next: Option<Track>,
    /// Transport failures met along the way: the reported one, plus any
    /// track that could not be started while looking for the next.
    pub errors: Vec<TransportError>,
}

#[derive(Debug)]
struct SessionState {
    queue: Queue,
    /// Ticket of the start currently streaming. `None` means idle, and an
    /// idle session always has an empty queue.
    active: Option<u64>,
    /// Set by `skip` to the active ticket until its completion arrives.
    stopping: Option<u64>,
    paused: bool,
    next_ticket: u64,
}

impl SessionState {
    fn is_stopping(&self) -> bool {
        self.active.is_some() && self.stopping == self.active
    }
}

/// Per-guild playback state machine.
///
/// Every mutation goes through `state`. Tracks are started from exactly two
/// places: [`PlaybackSession::add`] when the session is idle, and
/// [`PlaybackSession::handle_completion`]. Completions reach the session
/// through a mailbox drained by a dedicated task, so a transport may report
/// from inside `stop()` without deadlocking.
pub struct PlaybackSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<dyn MediaResolver>,
    mailbox: mpsc::UnboundedSender<Completion>,
}

impl PlaybackSession {
    /// Must be called inside a tokio runtime; spawns the completion task.
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Arc<Self> {
        let (mailbox, completions) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            guild_id,
            state: Mutex::new(SessionState {
                queue: Queue::new(),
                active: None,
                stopping: None,
                paused: false,
                next_ticket: 1,
            }),
            transport,
            resolver,
            mailbox,
        });

        tokio::spawn(drain_completions(Arc::downgrade(&session), completions));
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Resolves `query` and queues the result, starting playback if the
    /// session is idle. Resolution runs without holding the session lock.
    pub async fn add(&self, query: &str) -> Result<Enqueued, PlaybackError> {
        info!("🔍 Resolving \"{}\" for guild {}", query, self.guild_id);
        let tracks = self.resolver.resolve(query).await?;
        let Some(first) = tracks.first().cloned() else {
            return Err(ResolveError::NotFound(query.to_string()).into());
        };

        let mut state = self.state.lock().await;
        let was_idle = state.active.is_none();
        debug_assert!(!was_idle || state.queue.is_empty());
        state.queue.enqueue(tracks.iter().cloned());

        if !was_idle {
            return Ok(Enqueued {
                status: QueueStatus::Queued,
                tracks,
            });
        }

        let head = state.queue.start();
        debug_assert_eq!(head.as_ref(), Some(&first));
        if let Err(e) = self.start_locked(&mut state, &first).await {
            // Idle sessions keep an empty queue.
            state.queue.clear();
            return Err(e.into());
        }

        Ok(Enqueued {
            status: QueueStatus::NowPlaying,
            tracks,
        })
    }

    /// Reacts to the transport finishing a track: advances the queue and
    /// starts the next playable track, or goes idle.
    ///
    /// Transport errors do not halt the queue. They are logged, returned in
    /// the outcome, and the session moves on. Completions for any ticket
    /// other than the active one are ignored and return `None`.
    pub async fn handle_completion(&self, completion: Completion) -> Option<CompletionOutcome> {
        let mut state = self.state.lock().await;
        if state.active != Some(completion.ticket) {
            debug!(
                "Ignoring stale completion (ticket {}) in guild {}",
                completion.ticket, self.guild_id
            );
            return None;
        }
        state.active = None;
        state.stopping = None;
        state.paused = false;

        let mut errors = Vec::new();
        let finished = state.queue.current().cloned();
        if let Err(e) = completion.result {
            error!(
                "❌ Playback of {} failed in guild {}: {}",
                finished.as_ref().map_or_else(|| "unknown track".to_string(), ToString::to_string),
                self.guild_id,
                e
            );
            errors.push(e);
        }

        let next = loop {
            let Some(track) = state.queue.advance() else {
                break None;
            };
            match self.start_locked(&mut state, &track).await {
                Ok(()) => break Some(track),
                Err(e) => {
                    error!("❌ Could not start {} in guild {}: {}", track, self.guild_id, e);
                    errors.push(e);
                }
            }
        };

        if next.is_none() {
            info!("📭 Queue finished in guild {}, going idle", self.guild_id);
        }

        Some(CompletionOutcome {
            finished,
            next,
            errors,
        })
    }

    /// Stops the current track. The queue advances when the transport
    /// reports the stop through the completion mailbox; until then further
    /// skips and pauses fail with [`CommandError::Skipping`].
    pub async fn skip(&self) -> Result<Track, PlaybackError> {
        let mut state = self.state.lock().await;
        let skipped = state
            .active
            .and(state.queue.current().cloned())
            .ok_or(CommandError::NotPlaying)?;
        if state.is_stopping() {
            return Err(CommandError::Skipping.into());
        }

        info!("⏭️ Skipping {} in guild {}", skipped, self.guild_id);
        state.stopping = state.active;
        self.transport.stop().await;
        Ok(skipped)
    }

    /// Toggles pause. Returns `true` if playback is now paused.
    pub async fn pause(&self) -> Result<bool, PlaybackError> {
        let mut state = self.state.lock().await;
        if state.active.is_none() {
            return Err(CommandError::NotPlaying.into());
        }
        if state.is_stopping() {
            return Err(CommandError::Skipping.into());
        }

        if state.paused {
            self.transport.resume().await?;
            state.paused = false;
            info!("▶️ Resumed in guild {}", self.guild_id);
        } else {
            self.transport.pause().await?;
            state.paused = true;
            info!("⏸️ Paused in guild {}", self.guild_id);
        }
        Ok(state.paused)
    }

    /// Stops playback and clears the queue. Accepted in every state; returns
    /// whether a track was playing.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        // Dropping the ticket first turns the stop's own completion stale.
        let was_active = state.active.take().is_some();
        state.stopping = None;
        state.paused = false;

        if was_active {
            self.transport.stop().await;
        } else if self.transport.is_active().await {
            warn!("Transport in guild {} was streaming an untracked track", self.guild_id);
            self.transport.stop().await;
        }

        state.queue.clear();
        info!("⏹️ Stopped playback in guild {}", self.guild_id);
        was_active
    }

    /// Removes a pending track by its position in [`PlaybackSession::titles`].
    pub async fn remove(&self, index: usize) -> Result<Track, PlaybackError> {
        let mut state = self.state.lock().await;
        Ok(state.queue.remove_at(index)?)
    }

    pub async fn titles(&self) -> Vec<String> {
        self.state.lock().await.queue.titles()
    }

    pub async fn current(&self) -> Option<Track> {
        let state = self.state.lock().await;
        state.active.and(state.queue.current().cloned())
    }

    pub async fn state(&self) -> PlaybackState {
        let state = self.state.lock().await;
        match (state.active, state.paused) {
            (None, _) => PlaybackState::Idle,
            (Some(_), true) => PlaybackState::Paused,
            (Some(_), false) => PlaybackState::Playing,
        }
    }

    async fn start_locked(&self, state: &mut SessionState, track: &Track) -> Result<(), TransportError> {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        // Recorded before the call so the completion can never outrun it.
        state.active = Some(ticket);
        state.paused = false;

        let handle = CompletionHandle::new(ticket, self.mailbox.clone());
        if let Err(e) = self.transport.start(track.local_path(), handle).await {
            state.active = None;
            return Err(e);
        }

        info!("🎵 Now playing in guild {}: {}", self.guild_id, track);
        Ok(())
    }
}

async fn drain_completions(session: Weak<PlaybackSession>, mut completions: mpsc::UnboundedReceiver<Completion>) {
    while let Some(completion) = completions.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        let Some(outcome) = session.handle_completion(completion).await else {
            continue;
        };

        if let Some(finished) = &outcome.finished {
            debug!("Finished {} in guild {}", finished, session.guild_id());
        }
        if !outcome.errors.is_empty() {
            warn!(
                "⚠️ {} playback error(s) in guild {}, now on {}",
                outcome.errors.len(),
                session.guild_id(),
                outcome.next.as_ref().map_or_else(|| "nothing".to_string(), ToString::to_string)
            );
        }
    }
}
