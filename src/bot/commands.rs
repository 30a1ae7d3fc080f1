use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot exposes.
pub fn all() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        remove_command(),
        clear_command(),
        queue_command(),
        loop_command(),
        join_command(),
        leave_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    serenity::model::application::Command::set_global_commands(&ctx.http, all()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Plays a song or playlist from a YouTube URL or search query")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pauses the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes the paused song")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current song")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Toggles looping of the current song")
}

// Comandos de cola

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Removes a song from the queue by its position")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Position in the queue")
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Stops playback and clears the queue")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Displays the current music queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page to show")
                .min_int_value(1),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Joins your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Leaves the voice channel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_every_player_command() {
        let names: Vec<String> = all()
            .iter()
            .filter_map(|command| serde_json::to_value(command).ok())
            .filter_map(|value| value["name"].as_str().map(String::from))
            .collect();

        assert_eq!(
            names,
            vec!["play", "pause", "resume", "skip", "remove", "clear", "queue", "loop", "join", "leave"]
        );
    }
}
