use anyhow::{Context as _, Result};
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        channel::ChannelType,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::session::{PlaybackSession, PlaybackState},
    bot::{commands, PlayerBot, ShardManagerContainer},
    error::CommandError,
    ui::{embeds, messages},
};

/// Dispatches a slash command to its handler.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &PlayerBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside of a guild"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "ping" => handle_ping(ctx, &command).await?,
        "sync" => handle_sync(ctx, &command, guild_id, bot).await?,
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "queue" => handle_queue(ctx, &command, guild_id, bot).await?,
        "skip" => handle_skip(ctx, &command, guild_id, bot).await?,
        "pause" => handle_pause(ctx, &command, guild_id, bot).await?,
        "stop" => handle_stop(ctx, &command, guild_id, bot).await?,
        "remove" => handle_remove(ctx, &command, guild_id, bot).await?,
        other => {
            warn!("Unknown command /{}", other);
            respond_ephemeral(ctx, &command, "❌ Unknown command").await?;
        }
    }

    Ok(())
}

async fn handle_ping(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    // Heartbeat latency of the shard that got the command
    let latency = {
        let data = ctx.data.read().await;
        match data.get::<ShardManagerContainer>() {
            Some(manager) => manager
                .runners
                .lock()
                .await
                .get(&ctx.shard_id)
                .and_then(|runner| runner.latency),
            None => None,
        }
    };

    let content = match latency {
        Some(latency) => format!("Pong! Latency: **{}ms**.", latency.as_millis()),
        None => "Pong! Latency: **unknown** (no heartbeat yet).".to_string(),
    };
    respond(ctx, command, content).await
}

async fn handle_sync(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    if bot.config.owner_id != Some(command.user.id.get()) {
        return respond_ephemeral(ctx, command, "Only the bot owner can do that.").await;
    }

    // Re-register on this guild only
    info!("🔄 Syncing commands in guild {}", guild_id);
    commands::register_guild_commands(ctx, guild_id).await?;
    respond(ctx, command, "Done.").await
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?;

    // Find where the requester is listening
    let channel_id = match play_target(user_voice_channel(ctx, guild_id, command.user.id)) {
        PlayTarget::Join(channel_id) => channel_id,
        PlayTarget::Refuse { content, ephemeral } => {
            return if ephemeral {
                respond_ephemeral(ctx, command, content).await
            } else {
                respond(ctx, command, content).await
            };
        }
    };

    // Resolving can take a while, answer first and edit later
    respond(ctx, command, "Please wait...").await?;

    let content = match enqueue(ctx, guild_id, channel_id, query, bot).await {
        Ok(content) => content,
        Err(e) => {
            warn!("❌ /play \"{}\" failed in guild {}: {:#}", query, guild_id, e);
            messages::add_failed(format!("{e:#}"))
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

/// Joins (or moves to) the requester's channel, then queues the query.
async fn enqueue(ctx: &Context, guild_id: GuildId, channel_id: ChannelId, query: &str, bot: &PlayerBot) -> Result<String> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

    // Connect, or move if the bot is in another channel
    let connected_here = match manager.get(guild_id) {
        Some(call) => call.lock().await.current_channel().map(|c| c.0.get()) == Some(channel_id.get()),
        None => false,
    };

    if !connected_here {
        manager
            .join(guild_id, channel_id)
            .await
            .with_context(|| format!("could not connect to <#{channel_id}>"))?;
        info!("🔊 Connected to channel {} in guild {}", channel_id, guild_id);
    }

    // Queue on the guild's session
    let session = bot.sessions.get_or_create(guild_id).await?;
    let enqueued = session.add(query).await?;

    Ok(messages::enqueued(&enqueued))
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    let session = match playing_session(ctx, guild_id, bot).await {
        Ok(session) => session,
        Err(e) => return respond(ctx, command, e.to_string()).await,
    };

    // Snapshot, the embed is built without holding the session
    let current = session.current().await;
    let titles = session.titles().await;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_queue_embed(current.as_ref(), &titles)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    let content = match playing_session(ctx, guild_id, bot).await {
        Ok(session) => match session.skip().await {
            Ok(skipped) => messages::skipping(&skipped),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    respond(ctx, command, content).await
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    let content = match playing_session(ctx, guild_id, bot).await {
        Ok(session) => match session.pause().await {
            Ok(now_paused) => messages::paused(now_paused).to_string(),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    respond(ctx, command, content).await
}

async fn handle_stop(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    let content = match playing_session(ctx, guild_id, bot).await {
        Ok(session) => {
            session.stop().await;
            "Stopped playing and cleared queue.".to_string()
        }
        Err(e) => e.to_string(),
    };

    respond(ctx, command, content).await
}

async fn handle_remove(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &PlayerBot) -> Result<()> {
    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "position")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Missing position"))?;

    let content = match playing_session(ctx, guild_id, bot).await {
        Ok(session) => {
            // Positions are shown 1-based by /queue
            let index = usize::try_from(position.saturating_sub(1)).unwrap_or(usize::MAX);
            messages::removal(position, &session.remove(index).await)
        }
        Err(e) => e.to_string(),
    };

    respond(ctx, command, content).await
}

/// The bot must be in a voice channel and have something loaded.
async fn playing_session(
    ctx: &Context,
    guild_id: GuildId,
    bot: &PlayerBot,
) -> std::result::Result<Arc<PlaybackSession>, CommandError> {
    // Connected
    let connected = match songbird::get(ctx).await {
        Some(manager) => manager.get(guild_id).is_some(),
        None => false,
    };
    if !connected {
        return Err(CommandError::NotConnected);
    }

    // Playing (paused counts)
    match bot.sessions.get(guild_id) {
        Some(session) if session.state().await != PlaybackState::Idle => Ok(session),
        _ => Err(CommandError::NotPlaying),
    }
}

struct VoiceChannel {
    id: ChannelId,
    kind: ChannelType,
    name: String,
}

#[derive(Debug, PartialEq)]
enum PlayTarget {
    Join(ChannelId),
    Refuse { content: String, ephemeral: bool },
}

/// Decides what `/play` does with the requester's voice state.
fn play_target(lookup: Result<Option<VoiceChannel>>) -> PlayTarget {
    match lookup {
        Ok(Some(channel)) if channel.kind == ChannelType::Stage => PlayTarget::Refuse {
            content: format!("It's impossible to connect to **{}**.", channel.name),
            ephemeral: false,
        },
        Ok(Some(channel)) => PlayTarget::Join(channel.id),
        Ok(None) => PlayTarget::Refuse {
            content: "OK, playing for myself.".to_string(),
            ephemeral: false,
        },
        Err(e) => {
            warn!("Could not read voice state: {:#}", e);
            PlayTarget::Refuse {
                content: "❌ I can't see your voice channel right now, try again in a moment.".to_string(),
                ephemeral: true,
            }
        }
    }
}

/// The channel the user is currently in, if any.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<Option<VoiceChannel>> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild {guild_id} not found in cache"))?;

    let Some(channel_id) = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
    else {
        return Ok(None);
    };

    let channel = guild
        .channels
        .get(&channel_id)
        .ok_or_else(|| anyhow::anyhow!("Channel {channel_id} not found in cache"))?;

    Ok(Some(VoiceChannel {
        id: channel_id,
        kind: channel.kind,
        name: channel.name.clone(),
    }))
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;

    Ok(())
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn channel(kind: ChannelType, name: &str) -> VoiceChannel {
        VoiceChannel {
            id: ChannelId::new(99),
            kind,
            name: name.to_string(),
        }
    }

    #[test]
    fn voice_channel_is_joined() {
        assert_eq!(
            play_target(Ok(Some(channel(ChannelType::Voice, "General")))),
            PlayTarget::Join(ChannelId::new(99))
        );
    }

    #[test]
    fn stage_channel_is_refused_by_name() {
        assert_eq!(
            play_target(Ok(Some(channel(ChannelType::Stage, "Town Hall")))),
            PlayTarget::Refuse {
                content: "It's impossible to connect to **Town Hall**.".to_string(),
                ephemeral: false,
            }
        );
    }

    #[test]
    fn requester_outside_voice_gets_the_joke() {
        assert_eq!(
            play_target(Ok(None)),
            PlayTarget::Refuse {
                content: "OK, playing for myself.".to_string(),
                ephemeral: false,
            }
        );
    }

    #[test]
    fn uncached_guild_still_gets_an_answer() {
        let target = play_target(Err(anyhow::anyhow!("Guild 1 not found in cache")));

        assert!(matches!(target, PlayTarget::Refuse { ephemeral: true, .. }));
    }
}
