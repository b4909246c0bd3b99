use anyhow::{Context, Result};
use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use crate::{audio::session::PlaybackSession, audio::transport::TransportFactory, sources::MediaResolver};

/// Process-wide map of guild → session. Sessions are built lazily on first
/// use and live for the rest of the run.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<OnceCell<Arc<PlaybackSession>>>>,
    transports: Arc<dyn TransportFactory>,
    resolver: Arc<dyn MediaResolver>,
}

impl SessionRegistry {
    pub fn new(transports: Arc<dyn TransportFactory>, resolver: Arc<dyn MediaResolver>) -> Self {
        Self {
            sessions: DashMap::new(),
            transports,
            resolver,
        }
    }

    /// Returns the guild's session, building it if this is the first call.
    ///
    /// Concurrent callers for the same guild share one construction; a
    /// failed construction leaves the slot empty so a later call can retry.
    pub async fn get_or_create(&self, guild_id: GuildId) -> Result<Arc<PlaybackSession>> {
        // The shard guard is released before awaiting.
        let slot = self.sessions.entry(guild_id).or_default().clone();

        let session = slot
            .get_or_try_init(|| async {
                let transport = self
                    .transports
                    .connect(guild_id)
                    .await
                    .with_context(|| format!("could not set up voice transport for guild {guild_id}"))?;
                info!("🎛️ New playback session for guild {} ({} in total)", guild_id, self.len() + 1);
                Ok::<_, anyhow::Error>(PlaybackSession::new(guild_id, transport, self.resolver.clone()))
            })
            .await?;

        Ok(session.clone())
    }

    /// Looks up an existing session without creating one.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions
            .get(&guild_id)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Number of guilds with a constructed session.
    fn len(&self) -> usize {
        self.sessions.iter().filter(|slot| slot.value().get().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::transport::{CompletionHandle, MockTransportFactory, VoiceTransport},
        error::TransportError,
        sources::MockMediaResolver,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct SilentTransport;

    #[async_trait]
    impl VoiceTransport for SilentTransport {
        async fn start(&self, _path: &Path, _on_finished: CompletionHandle) -> Result<(), TransportError> {
            Ok(())
        }
        async fn stop(&self) {}
        async fn pause(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn resume(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn is_active(&self) -> bool {
            false
        }
    }

    /// Slow, counting factory so concurrent callers overlap inside `connect`.
    struct SlowFactory {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl TransportFactory for SlowFactory {
        async fn connect(&self, _guild_id: GuildId) -> Result<Arc<dyn VoiceTransport>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Arc::new(SilentTransport))
        }
    }

    fn registry_with(factory: Arc<dyn TransportFactory>) -> SessionRegistry {
        SessionRegistry::new(factory, Arc::new(MockMediaResolver::new()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_yields_one_session() {
        let factory = Arc::new(SlowFactory {
            connects: AtomicUsize::new(0),
        });
        let registry = Arc::new(registry_with(factory.clone()));
        let guild = GuildId::new(42);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(guild).await.unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn guilds_get_independent_sessions() {
        let registry = registry_with(Arc::new(SlowFactory {
            connects: AtomicUsize::new(0),
        }));

        let a = registry.get_or_create(GuildId::new(1)).await.unwrap();
        let b = registry.get_or_create(GuildId::new(2)).await.unwrap();
        let a_again = registry.get_or_create(GuildId::new(1)).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &a_again));
        assert_eq!(a.guild_id(), GuildId::new(1));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn get_does_not_create() {
        let registry = registry_with(Arc::new(SlowFactory {
            connects: AtomicUsize::new(0),
        }));

        assert!(registry.get(GuildId::new(7)).is_none());
        registry.get_or_create(GuildId::new(7)).await.unwrap();
        assert!(registry.get(GuildId::new(7)).is_some());
    }

    #[tokio::test]
    async fn failed_construction_can_be_retried() {
        let mut factory = MockTransportFactory::new();
        let mut seq = mockall::Sequence::new();
        factory
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("gateway unavailable")));
        factory
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Arc::new(SilentTransport) as Arc<dyn VoiceTransport>));
        let registry = registry_with(Arc::new(factory));

        let err = registry.get_or_create(GuildId::new(3)).await.err().expect("first connect should fail");
        assert!(err.to_string().contains("guild 3"));
        assert!(registry.get(GuildId::new(3)).is_none());

        registry.get_or_create(GuildId::new(3)).await.unwrap();
        assert_eq!(registry.len(), 1);
    }
}
