use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

use super::{
    connection::VoiceStatus,
    queue::QueueSnapshot,
    registry::SessionRegistry,
    session::ConnectOutcome,
};
use crate::{
    error::PlayerError,
    sources::{ResolvedSet, TrackResolver},
};

/// What `play` added to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaySummary {
    Track { title: String },
    Playlist { title: String, total: usize, rejected: usize },
}

impl fmt::Display for PlaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaySummary::Track { title } => write!(f, "Added **{}** to the queue.", title),
            PlaySummary::Playlist { title, total, rejected } => {
                write!(f, "Added playlist **{}** with {} tracks to the queue.", title, total)?;
                if *rejected > 0 {
                    write!(f, " The queue is full, {} tracks were left out.", rejected)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectOutcome::AlreadyConnected(channel) => write!(f, "I'm already in <#{}>", channel),
            ConnectOutcome::Connected(channel) => write!(f, "Joined <#{}>", channel),
            ConnectOutcome::Moved { to, .. } => write!(f, "Moved to <#{}>", to),
        }
    }
}

/// Entry point for every player command. Methods take the guild and, where
/// it matters, the voice channel the invoking user is in.
pub struct MusicPlayer {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn TrackResolver>,
}

impl MusicPlayer {
    pub fn new(registry: Arc<SessionRegistry>, resolver: Arc<dyn TrackResolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resolves `query` and queues the result, joining the user's channel
    /// first if the bot is not connected anywhere in the guild. Tracks
    /// resolved after the bot left voice are dropped.
    pub async fn play(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
        query: &str,
        requester: UserId,
    ) -> Result<PlaySummary, PlayerError> {
        let channel_id = user_channel.ok_or(PlayerError::UserNotInVoice)?;
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;

        let epoch = session.ensure_connected(channel_id).await?;

        let resolved = self.resolver.resolve(query, requester).await.map_err(|e| {
            warn!("❌ Could not resolve '{}' in guild {}: {}", query, guild_id, e);
            PlayerError::Resolution(e)
        })?;

        let summary = match &resolved {
            ResolvedSet::Single(track) => PlaySummary::Track {
                title: track.title.clone(),
            },
            ResolvedSet::Playlist { title, tracks } => PlaySummary::Playlist {
                title: title.clone(),
                total: tracks.len(),
                rejected: 0,
            },
        };

        let outcome = session.enqueue_on(epoch, resolved.into_tracks()).await?;
        Ok(match summary {
            PlaySummary::Playlist { title, total, .. } => PlaySummary::Playlist {
                title,
                total,
                rejected: outcome.rejected,
            },
            track => track,
        })
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        session.pause().await?;
        Ok("Paused the current song".to_string())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        session.resume().await?;
        Ok("Resumed the current song".to_string())
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        let skipped = session.skip().await?;
        Ok(format!("Skipped **{}**", skipped.title))
    }

    /// `position` is 1-based, as typed by the user.
    pub async fn remove(&self, guild_id: GuildId, position: i64) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        let removed = session.remove(position).await?;
        Ok(format!("Removed **{}** from the queue.", removed.title))
    }

    pub async fn clear(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        session.clear().await?;
        Ok("Stopped playback and cleared the queue".to_string())
    }

    pub async fn toggle_loop(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        let track = session.toggle_loop().await?;
        let state = if track.looping { "enabled" } else { "disabled" };
        Ok(format!("Loop {} for the current song: {}", state, track.title))
    }

    pub async fn queue(&self, guild_id: GuildId) -> QueueSnapshot {
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        session.snapshot().await
    }

    /// Joins the user's channel, moving there if connected elsewhere.
    pub async fn join(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> Result<ConnectOutcome, PlayerError> {
        let channel_id = user_channel.ok_or(PlayerError::UserNotInVoice)?;
        let session = self.registry.get_or_create(guild_id);
        session.touch().await;
        session.connect(channel_id).await
    }

    pub async fn leave(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        let session = self.registry.get_or_create(guild_id);
        session.disconnect().await?;
        Ok("Left the voice channel".to_string())
    }

    /// The bot was disconnected from `previous` by someone else. Ignored when
    /// the session already sits in a different channel.
    pub async fn handle_voice_lost(&self, guild_id: GuildId, previous: Option<ChannelId>) {
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };

        match session.voice_status().await {
            VoiceStatus::Connected(current) if previous.is_none_or(|p| p == current) => {}
            status => {
                debug!("Ignoring voice loss in guild {} while {:?}", guild_id, status);
                return;
            }
        }

        info!("🔌 Voice connection lost in guild {}", guild_id);
        match session.disconnect().await {
            Ok(()) | Err(PlayerError::NotConnected) => {}
            Err(e) => warn!("⚠️ Error cleaning up guild {}: {}", guild_id, e),
        }
    }

    /// The bot left the guild.
    pub async fn forget_guild(&self, guild_id: GuildId) {
        if self.registry.remove(guild_id).await {
            info!("🚪 Forgot guild {}", guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{queue::PlaybackState, track::Track},
        error::ResolveError,
        sources::MockTrackResolver,
        voice::fake::{FakeConnector, VoiceLog},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    const GUILD: GuildId = GuildId::new(100);
    const LOBBY: ChannelId = ChannelId::new(10);
    const STAGE: ChannelId = ChannelId::new(20);
    const USER: UserId = UserId::new(3);

    fn player(resolver: MockTrackResolver, max_queue_size: usize) -> (MusicPlayer, VoiceLog) {
        let (connector, voice) = FakeConnector::new();
        let registry = Arc::new(SessionRegistry::new(connector, max_queue_size));
        (MusicPlayer::new(registry, Arc::new(resolver)), voice)
    }

    fn single(title: &'static str) -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(move |_, requester| Ok(ResolvedSet::Single(Track::new(title, title, requester))));
        resolver
    }

    /// Holds every resolution until the test opens the gate.
    struct GatedResolver {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TrackResolver for GatedResolver {
        async fn resolve(&self, query: &str, requester: UserId) -> Result<ResolvedSet, ResolveError> {
            self.gate.notified().await;
            Ok(ResolvedSet::Single(Track::new(query, query, requester)))
        }
    }

    #[tokio::test]
    async fn play_joins_and_starts_the_track() {
        let (player, voice) = player(single("Song"), 10);

        let summary = player.play(GUILD, Some(LOBBY), "song", USER).await.unwrap();

        assert_eq!(summary.to_string(), "Added **Song** to the queue.");
        let snapshot = player.queue(GUILD).await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.current.map(|t| t.requester), Some(USER));
        assert_eq!(voice.lock().connects, vec![LOBBY]);
    }

    #[tokio::test]
    async fn play_requires_user_in_voice() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().never();
        let (player, _) = player(resolver, 10);

        let err = player.play(GUILD, None, "song", USER).await.unwrap_err();
        assert!(matches!(err, PlayerError::UserNotInVoice));
    }

    #[tokio::test]
    async fn play_does_not_pull_bot_from_another_channel() {
        let (player, voice) = player(single("Song"), 10);
        player.join(GUILD, Some(LOBBY)).await.unwrap();

        player.play(GUILD, Some(STAGE), "song", USER).await.unwrap();

        let voice = voice.lock();
        assert_eq!(voice.connects, vec![LOBBY]);
        assert!(voice.moves.is_empty());
    }

    #[tokio::test]
    async fn resolution_failure_queues_nothing() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_, _| Err(ResolveError::Failed("Video unavailable".into())));
        let (player, _) = player(resolver, 10);

        let err = player.play(GUILD, Some(LOBBY), "gone", USER).await.unwrap_err();

        assert_eq!(err.to_string(), "An error occurred while processing your request");
        let snapshot = player.queue(GUILD).await;
        assert!(snapshot.current.is_none() && snapshot.upcoming.is_empty());
    }

    #[tokio::test]
    async fn playlist_summary_reports_left_out_tracks() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|_, requester| {
            let tracks = ["a", "b", "c", "d"]
                .map(|t| Track::new(t, t, requester).with_playlist_origin("Mix"))
                .to_vec();
            Ok(ResolvedSet::Playlist {
                title: "Mix".into(),
                tracks,
            })
        });
        let (player, _) = player(resolver, 2);
        player.join(GUILD, Some(LOBBY)).await.unwrap();

        let summary = player.play(GUILD, Some(LOBBY), "mix", USER).await.unwrap();

        assert_eq!(
            summary,
            PlaySummary::Playlist {
                title: "Mix".into(),
                total: 4,
                rejected: 2,
            }
        );
        assert_eq!(
            summary.to_string(),
            "Added playlist **Mix** with 4 tracks to the queue. The queue is full, 2 tracks were left out."
        );
        let snapshot = player.queue(GUILD).await;
        assert_eq!(snapshot.current.map(|t| t.title).as_deref(), Some("a"));
        assert_eq!(snapshot.upcoming.len(), 1);
    }

    #[tokio::test]
    async fn leave_while_resolving_drops_the_result() {
        let gate = Arc::new(Notify::new());
        let (connector, voice) = FakeConnector::new();
        let registry = Arc::new(SessionRegistry::new(connector, 10));
        let player = MusicPlayer::new(registry, Arc::new(GatedResolver { gate: gate.clone() }));

        let (played, left) = tokio::join!(player.play(GUILD, Some(LOBBY), "Late", USER), async {
            for _ in 0..100 {
                let session = player.registry().get(GUILD);
                if let Some(session) = session {
                    if session.voice_status().await == VoiceStatus::Connected(LOBBY) {
                        break;
                    }
                }
                tokio::task::yield_now().await;
            }
            let left = player.leave(GUILD).await;
            gate.notify_one();
            left
        });

        assert!(left.is_ok());
        assert!(matches!(played, Err(PlayerError::NotConnected)));
        let snapshot = player.queue(GUILD).await;
        assert!(snapshot.current.is_none() && snapshot.upcoming.is_empty());

        // Joining again later has nothing left over to play.
        player.join(GUILD, Some(STAGE)).await.unwrap();
        assert!(voice.lock().rendered.is_empty());
        assert_eq!(player.queue(GUILD).await.state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn command_replies() {
        let (player, _) = player(single("Song"), 10);
        assert_eq!(
            player.skip(GUILD).await.unwrap_err().to_string(),
            "I'm not connected to any voice channel"
        );

        player.play(GUILD, Some(LOBBY), "song", USER).await.unwrap();
        assert_eq!(player.pause(GUILD).await.unwrap(), "Paused the current song");
        assert_eq!(player.resume(GUILD).await.unwrap(), "Resumed the current song");
        assert_eq!(
            player.toggle_loop(GUILD).await.unwrap(),
            "Loop enabled for the current song: Song"
        );
        assert_eq!(player.skip(GUILD).await.unwrap(), "Skipped **Song**");
        assert_eq!(
            player.remove(GUILD, 1).await.unwrap_err().to_string(),
            "The queue is currently empty"
        );
        assert_eq!(
            player.clear(GUILD).await.unwrap(),
            "Stopped playback and cleared the queue"
        );
        assert_eq!(player.leave(GUILD).await.unwrap(), "Left the voice channel");
        assert!(matches!(player.leave(GUILD).await, Err(PlayerError::NotConnected)));
    }

    #[tokio::test]
    async fn join_reports_where_it_went() {
        let (player, _) = player(MockTrackResolver::new(), 10);

        let joined = player.join(GUILD, Some(LOBBY)).await.unwrap();
        let again = player.join(GUILD, Some(LOBBY)).await.unwrap();
        let moved = player.join(GUILD, Some(STAGE)).await.unwrap();

        assert_eq!(joined.to_string(), "Joined <#10>");
        assert_eq!(again.to_string(), "I'm already in <#10>");
        assert_eq!(moved.to_string(), "Moved to <#20>");
        assert!(matches!(
            player.join(GUILD, None).await,
            Err(PlayerError::UserNotInVoice)
        ));
    }

    #[tokio::test]
    async fn lost_voice_clears_only_the_matching_connection() {
        let (player, voice) = player(single("Song"), 10);
        player.play(GUILD, Some(LOBBY), "song", USER).await.unwrap();

        player.handle_voice_lost(GUILD, Some(STAGE)).await;
        assert_eq!(voice.lock().disconnects, 0);

        player.handle_voice_lost(GUILD, Some(LOBBY)).await;
        assert_eq!(voice.lock().disconnects, 1);
        assert_eq!(player.queue(GUILD).await.state, PlaybackState::Idle);

        // Our own leave echoes back as another voice loss.
        player.handle_voice_lost(GUILD, None).await;
        assert_eq!(voice.lock().disconnects, 1);
    }

    #[tokio::test]
    async fn forgetting_a_guild_drops_its_session() {
        let (player, voice) = player(MockTrackResolver::new(), 10);
        player.join(GUILD, Some(LOBBY)).await.unwrap();

        player.forget_guild(GUILD).await;

        assert!(player.registry().get(GUILD).is_none());
        assert_eq!(voice.lock().disconnects, 1);
    }
}
