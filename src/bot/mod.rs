//! # Bot Module
//!
//! Thin serenity layer over the playback subsystem.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] trait and forwards
//! everything to the [`MusicPlayer`]:
//!
//! - `ready`: registers the slash commands and starts the inactivity monitor
//! - `interaction_create`: dispatches slash commands through [`handlers`]
//! - `voice_state_update`: cleans up when the bot is disconnected by someone else
//! - `guild_delete`: drops the session of a guild the bot left

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
    model::guild::Guild,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{inactivity::InactivityMonitor, player::MusicPlayer},
    config::Config,
};

/// Main Discord event handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    pub player: Arc<MusicPlayer>,
    monitor: Arc<InactivityMonitor>,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, player: Arc<MusicPlayer>, monitor: Arc<InactivityMonitor>) -> Self {
        Self {
            config,
            player,
            monitor,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to a single guild when `GUILD_ID` is configured (they
    /// show up immediately, useful during development) and globally
    /// otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Could not register commands: {:?}", e);
        }

        // Ready llega de nuevo tras cada reconexión
        self.monitor.start();
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Only the bot's own voice state matters: losing the channel without a
    /// `/leave` (kicked, channel deleted) must clear the guild's session.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        let previous = old.and_then(|state| state.channel_id);
        self.player.handle_voice_lost(guild_id, previous).await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            warn!("⚠️ Guild {} is temporarily unavailable", incomplete.id);
            return;
        }
        self.player.forget_guild(incomplete.id).await;
    }
}
