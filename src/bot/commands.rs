use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers commands globally.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands on one guild (development, `/sync`).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        ping_command(),
        sync_command(),
        play_command(),
        queue_command(),
        skip_command(),
        pause_command(),
        stop_command(),
        remove_command(),
    ]
}

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Test the bot")
}

fn sync_command() -> CreateCommand {
    CreateCommand::new("sync").description("Forces commands synchronization")
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play something in current voice channel")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Switches pause and unpause")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stops playing and clears queue")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Preview next songs")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Removes a song from the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Position shown by /queue",
            )
            .min_int_value(1)
            .required(true),
        )
}
