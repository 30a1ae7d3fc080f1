//! # Voice Module
//!
//! Capabilities the playback sessions use to reach a voice channel.
//!
//! - [`VoiceConnector`] opens a connection for a guild. There is one per
//!   process and every session receives it at construction.
//! - [`VoiceLink`] is one live connection. The owning session keeps it in its
//!   voice slot and is the only caller.
//!
//! [`songbird`] implements both on top of the songbird driver.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};

use crate::{audio::bridge::CompletionNotifier, error::VoiceError};

pub mod songbird;

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceLink>, VoiceError>;
}

#[async_trait]
pub trait VoiceLink: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Relocates the connection. On error the link stays where it was.
    async fn move_to(&mut self, channel_id: ChannelId) -> Result<(), VoiceError>;

    /// Starts rendering `locator`, replacing any render in progress. The
    /// notifier must be fired exactly when this render ends, for whatever
    /// reason (end of stream, stop, error, replacement).
    async fn render(&mut self, locator: &str, notifier: CompletionNotifier) -> Result<(), VoiceError>;

    fn pause(&self) -> Result<(), VoiceError>;

    fn resume(&self) -> Result<(), VoiceError>;

    fn stop(&self) -> Result<(), VoiceError>;

    async fn disconnect(&mut self) -> Result<(), VoiceError>;

    /// Stops this link's own render but stays in the channel. Used for a
    /// link that lost a race while a newer connection of the same guild may
    /// share the underlying call.
    fn release(&mut self);
}
