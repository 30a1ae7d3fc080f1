use async_trait::async_trait;
use reqwest::Client;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::YoutubeDl,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{VoiceConnector, VoiceLink};
use crate::{audio::bridge::CompletionNotifier, error::VoiceError, sources::ResolverOptions};

/// How songbird launches yt-dlp when a track starts. Shares the program and
/// extra arguments (cookies, proxy) with the resolver.
#[derive(Debug, Clone)]
struct StreamCommand {
    program: &'static str,
    args: Vec<String>,
}

/// Opens voice connections through the songbird manager registered with the
/// serenity client.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: Client,
    command: StreamCommand,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: Client, options: &ResolverOptions) -> Self {
        // songbird keeps the program name for the lifetime of the input
        let program: &'static str = Box::leak(options.program.clone().into_boxed_str());
        Self {
            manager,
            http,
            command: StreamCommand {
                program,
                args: options.extra_args.clone(),
            },
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceLink>, VoiceError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Join(e.to_string()))?;

        Ok(Box::new(SongbirdLink {
            guild_id,
            channel_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            command: self.command.clone(),
            track: None,
        }))
    }
}

pub struct SongbirdLink {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: Client,
    command: StreamCommand,
    track: Option<TrackHandle>,
}

impl SongbirdLink {
    fn control(&self, action: impl FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>) -> Result<(), VoiceError> {
        match &self.track {
            Some(track) => action(track).map_err(|e| VoiceError::Control(e.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn move_to(&mut self, channel_id: ChannelId) -> Result<(), VoiceError> {
        // Joining with an existing call switches its channel.
        self.call = self
            .manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Join(e.to_string()))?;
        self.channel_id = channel_id;
        Ok(())
    }

    async fn render(&mut self, locator: &str, notifier: CompletionNotifier) -> Result<(), VoiceError> {
        let input = YoutubeDl::new_ytdl_like(self.command.program, self.http.clone(), locator.to_string())
            .user_args(self.command.args.clone());

        // Reemplaza cualquier track anterior; su evento End llega como obsoleto
        let handle = self.call.lock().await.play_only_input(input.into());

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), RenderEndHandler {
                    notifier: notifier.clone(),
                })
                .map_err(|e| VoiceError::Control(e.to_string()))?;
        }

        debug!(
            "🎵 Render {} started in guild {}: {}",
            notifier.render_id(),
            self.guild_id,
            locator
        );
        self.track = Some(handle);
        Ok(())
    }

    fn pause(&self) -> Result<(), VoiceError> {
        self.control(|track| track.pause())
    }

    fn resume(&self) -> Result<(), VoiceError> {
        self.control(|track| track.play())
    }

    fn stop(&self) -> Result<(), VoiceError> {
        self.control(|track| track.stop())
    }

    async fn disconnect(&mut self) -> Result<(), VoiceError> {
        self.release();

        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| VoiceError::Leave(e.to_string()))?;
        info!("👋 Songbird call removed for guild {}", self.guild_id);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(track) = self.track.take() {
            if let Err(e) = track.stop() {
                debug!("Track in guild {} was already gone: {}", self.guild_id, e);
            }
        }
    }
}

/// Forwards the end of a track to its session, once.
struct RenderEndHandler {
    notifier: CompletionNotifier,
}

#[async_trait]
impl VoiceEventHandler for RenderEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            }),
            _ => None,
        };

        self.notifier.notify(error);
        // Deregisters this handler from the track.
        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn renders_launch_the_configured_ytdlp() {
        let options = ResolverOptions {
            program: "/opt/bin/yt-dlp".into(),
            extra_args: vec!["--cookies".into(), "cookies.txt".into()],
            max_playlist_size: 50,
        };

        let connector = SongbirdConnector::new(Songbird::serenity(), Client::new(), &options);

        assert_eq!(connector.command.program, "/opt/bin/yt-dlp");
        assert_eq!(connector.command.args, vec!["--cookies", "cookies.txt"]);
    }
}
