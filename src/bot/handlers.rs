use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{bot::JukeboxBot, error::PlayerError, ui::embeds};

/// What a command answers with.
enum Reply {
    Text(String),
    Embed(CreateEmbed),
}

impl From<Result<String, PlayerError>> for Reply {
    fn from(result: Result<String, PlayerError>) -> Self {
        match result {
            Ok(text) => Reply::Text(text),
            Err(e) => {
                warn!("⚠️ Command rejected: {}", e);
                Reply::Text(e.to_string())
            }
        }
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("This command only works in a server")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Resolver y conectar puede tardar más de lo que Discord espera
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
        )
        .await?;

    let player = &bot.player;
    let user_id = command.user.id;
    let reply: Reply = match command.data.name.as_str() {
        "play" => match string_option(&command, "query") {
            Some(query) => {
                let channel = user_voice_channel(ctx, guild_id, user_id);
                player
                    .play(guild_id, channel, query, user_id)
                    .await
                    .map(|summary| summary.to_string())
                    .into()
            }
            None => Reply::Text("Please tell me what to play".to_string()),
        },
        "pause" => player.pause(guild_id).await.into(),
        "resume" => player.resume(guild_id).await.into(),
        "skip" => player.skip(guild_id).await.into(),
        "remove" => match integer_option(&command, "position") {
            Some(position) => player.remove(guild_id, position).await.into(),
            None => Reply::Text("Please give a queue position".to_string()),
        },
        "clear" => player.clear(guild_id).await.into(),
        "queue" => {
            let page = integer_option(&command, "page")
                .and_then(|page| usize::try_from(page).ok())
                .unwrap_or(1);
            let snapshot = player.queue(guild_id).await;
            match embeds::create_queue_embed(&snapshot, page) {
                Some(embed) => Reply::Embed(embed),
                None => Reply::Text(embeds::describe_queue(&snapshot, page)),
            }
        }
        "loop" => player.toggle_loop(guild_id).await.into(),
        "join" => {
            let channel = user_voice_channel(ctx, guild_id, user_id);
            player
                .join(guild_id, channel)
                .await
                .map(|outcome| outcome.to_string())
                .into()
        }
        "leave" => player.leave(guild_id).await.into(),
        other => {
            warn!("❓ Unknown command /{}", other);
            Reply::Embed(embeds::create_error_embed("Unknown command"))
        }
    };

    let response = match reply {
        Reply::Text(text) => EditInteractionResponse::new().content(text),
        Reply::Embed(embed) => EditInteractionResponse::new().embed(embed),
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

// Funciones auxiliares

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Voice channel the user is in, from the gateway cache.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
