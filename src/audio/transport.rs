use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{File, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{path::Path, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Outcome of one started track, tagged with the ticket of its start call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub ticket: u64,
    pub result: Result<(), TransportError>,
}

/// Given to the transport with every start call. Consuming it reports the
/// track as finished, so each start completes at most once.
#[derive(Debug)]
pub struct CompletionHandle {
    ticket: u64,
    mailbox: mpsc::UnboundedSender<Completion>,
}

impl CompletionHandle {
    pub(crate) fn new(ticket: u64, mailbox: mpsc::UnboundedSender<Completion>) -> Self {
        Self { ticket, mailbox }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Never blocks; safe to call from inside `stop()`.
    pub fn finish(self, result: Result<(), TransportError>) {
        let completion = Completion {
            ticket: self.ticket,
            result,
        };
        if self.mailbox.send(completion).is_err() {
            debug!("Completion for ticket {} dropped, session is gone", self.ticket);
        }
    }
}

/// Streams audio into one guild's voice connection.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Starts streaming the file and returns immediately. `on_finished` must
    /// be fired when the track ends, errors or is stopped.
    async fn start(&self, path: &Path, on_finished: CompletionHandle) -> Result<(), TransportError>;

    /// Stops the current track; its completion fires through the handle.
    async fn stop(&self);

    async fn pause(&self) -> Result<(), TransportError>;

    async fn resume(&self) -> Result<(), TransportError>;

    async fn is_active(&self) -> bool;
}

/// Produces the transport for a guild the first time a session is built.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, guild_id: GuildId) -> anyhow::Result<Arc<dyn VoiceTransport>>;
}

/// Transport backed by the guild's songbird call.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId) -> Self {
        Self {
            manager,
            guild_id,
            current: Mutex::new(None),
        }
    }

    fn current_handle(&self) -> Result<TrackHandle, TransportError> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| TransportError::Control("no track loaded".to_string()))
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn start(&self, path: &Path, on_finished: CompletionHandle) -> Result<(), TransportError> {
        // The call is looked up per start so reconnects are picked up.
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or(TransportError::NotConnected)?;

        let input = Input::from(File::new(path.to_path_buf()));
        let handle = call.lock().await.play_input(input);

        let notifier = TrackEndNotifier::new(self.guild_id, on_finished);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                let _ = handle.stop();
                return Err(TransportError::Control(format!("could not watch track: {e:?}")));
            }
        }

        info!("🔊 Streaming {} in guild {}", path.display(), self.guild_id);
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            if let Err(e) = handle.stop() {
                debug!("Track in guild {} already finished: {:?}", self.guild_id, e);
            }
        }
    }

    async fn pause(&self) -> Result<(), TransportError> {
        self.current_handle()?
            .pause()
            .map_err(|e| TransportError::Control(format!("{e:?}")))
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.current_handle()?
            .play()
            .map_err(|e| TransportError::Control(format!("{e:?}")))
    }

    async fn is_active(&self) -> bool {
        let Ok(handle) = self.current_handle() else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }
}

/// Registered for both `End` and `Error`; whichever fires first reports.
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    completion: Arc<Mutex<Option<CompletionHandle>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut result = Ok(());
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Track error in guild {}: {:?}", self.guild_id, e);
                    result = Err(TransportError::Playback(format!("{e:?}")));
                }
            }
        }

        self.report(result);
        None
    }
}

impl TrackEndNotifier {
    fn new(guild_id: GuildId, on_finished: CompletionHandle) -> Self {
        Self {
            guild_id,
            completion: Arc::new(Mutex::new(Some(on_finished))),
        }
    }

    /// Fires the shared handle; later calls from the other event are no-ops.
    fn report(&self, result: Result<(), TransportError>) -> bool {
        let Some(handle) = self.completion.lock().take() else {
            return false;
        };
        debug!("🎵 Track finished in guild {} (ticket {})", self.guild_id, handle.ticket());
        handle.finish(result);
        true
    }
}

/// Hands out [`SongbirdTransport`]s bound to the shared songbird manager.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl TransportFactory for SongbirdConnector {
    async fn connect(&self, guild_id: GuildId) -> anyhow::Result<Arc<dyn VoiceTransport>> {
        debug!("Creating voice transport for guild {}", guild_id);
        Ok(Arc::new(SongbirdTransport::new(self.manager.clone(), guild_id)))
    }
}
