//! # Bot Module
//!
//! Discord side of the player: slash command registration, interaction
//! dispatch and voice state tracking.
//!
//! ## Architecture
//!
//! The bot is built around the [`PlayerBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It owns:
//!
//! - The loaded [`Config`]
//! - The [`SessionRegistry`] holding one playback session per guild
//!
//! Handlers in [`handlers`] check the voice preconditions, call into the
//! guild's session and render the result as a reply.

use anyhow::Result;
use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Interaction, Ready, ShardManager, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::registry::SessionRegistry, config::Config};

/// Client data key for the shard manager (used by `/ping`).
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

/// Main Discord event handler.
pub struct PlayerBot {
    /// Configuration loaded from the environment
    pub config: Arc<Config>,
    /// Playback sessions, one per guild
    pub sessions: Arc<SessionRegistry>,
}

impl PlayerBot {
    pub fn new(config: Config, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
        }
    }

    /// Registers slash commands on the configured guild, or globally.
    ///
    /// Guild commands propagate almost immediately, global ones can take up
    /// to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}, skipping command registration", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Commands registered for guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Commands registered globally");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for PlayerBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is ready and online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }

        ctx.set_activity(Some(ActivityData::custom(self.config.activity.clone())));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Stops the guild's session when the bot gets disconnected from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Disconnected from voice in guild {}", guild_id);
        if let Some(session) = self.sessions.get(guild_id) {
            session.stop().await;
        }
    }
}
