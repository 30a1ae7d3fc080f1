//! Per-guild playback session.
//!
//! Every mutation of a session happens while holding its state lock, which
//! gives a total order between command transitions and completion
//! notifications for the guild. The lock is released around the only two
//! suspension points, voice connect/move and track resolution (the latter is
//! done by the caller, which then hands the connection epoch it started from
//! to [`GuildSession::enqueue_on`]).

use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc::UnboundedSender, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

use super::{
    bridge::{self, CompletionNotifier, RenderFinished, RenderId},
    connection::{ConnectionEpoch, VoiceSlot, VoiceStatus},
    queue::{EnqueueOutcome, PlaybackState, QueueSnapshot, TrackQueue},
    track::Track,
};
use crate::{
    error::{PlayerError, VoiceError},
    voice::{VoiceConnector, VoiceLink},
};

/// How the active render is expected to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderEnd {
    Natural,
    SkipRequested,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRender {
    id: RenderId,
    end: RenderEnd,
}

struct SessionState {
    voice: VoiceSlot,
    queue: TrackQueue,
    current: Option<Track>,
    paused: bool,
    /// `None` while nothing is being rendered, including after a stop whose
    /// completion is still in flight.
    render: Option<ActiveRender>,
    next_render_id: RenderId,
    last_activity: Option<Instant>,
}

impl SessionState {
    fn playback(&self) -> PlaybackState {
        match (&self.current, self.paused) {
            (None, _) => PlaybackState::Idle,
            (Some(_), true) => PlaybackState::Paused,
            (Some(_), false) => PlaybackState::Playing,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    /// A skip was accepted and its completion has not arrived yet. The
    /// current track is on its way out.
    fn skip_pending(&self) -> bool {
        self.render.is_some_and(|r| r.end == RenderEnd::SkipRequested)
    }

    fn allocate_render_id(&mut self) -> RenderId {
        self.next_render_id += 1;
        self.next_render_id
    }

    /// Forgets the current track and the queue. Any render still running
    /// becomes stale.
    fn reset_playback(&mut self) -> usize {
        self.render = None;
        self.current = None;
        self.paused = false;
        self.queue.clear()
    }
}

/// Result of [`GuildSession::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyConnected(ChannelId),
    Connected(ChannelId),
    Moved { from: ChannelId, to: ChannelId },
}

pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    connector: Arc<dyn VoiceConnector>,
    completions: UnboundedSender<RenderFinished>,
    pump: SyncMutex<Option<JoinHandle<()>>>,
}

impl GuildSession {
    fn new(
        guild_id: GuildId,
        connector: Arc<dyn VoiceConnector>,
        max_queue_size: usize,
        completions: UnboundedSender<RenderFinished>,
    ) -> Self {
        Self {
            guild_id,
            state: Mutex::new(SessionState {
                voice: VoiceSlot::new(),
                queue: TrackQueue::new(max_queue_size),
                current: None,
                paused: false,
                render: None,
                next_render_id: 0,
                last_activity: None,
            }),
            connector,
            completions,
            pump: SyncMutex::new(None),
        }
    }

    /// Creates a session together with the task that feeds it completion
    /// notifications. Must be called inside a tokio runtime.
    pub(crate) fn spawn(
        guild_id: GuildId,
        connector: Arc<dyn VoiceConnector>,
        max_queue_size: usize,
    ) -> Arc<Self> {
        let (tx, rx) = bridge::completion_channel();
        let session = Arc::new(Self::new(guild_id, connector, max_queue_size, tx));
        let pump = bridge::spawn_pump(Arc::downgrade(&session), rx);
        *session.pump.lock() = Some(pump);
        session
    }

    pub async fn touch(&self) {
        self.state.lock().await.touch();
    }

    pub async fn last_activity(&self) -> Option<Instant> {
        self.state.lock().await.last_activity
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.state.lock().await.playback()
    }

    pub async fn voice_status(&self) -> VoiceStatus {
        self.state.lock().await.voice.status()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            current: state.current.clone(),
            upcoming: state.queue.iter().cloned().collect(),
            state: state.playback(),
        }
    }

    /// Appends tracks resolved while connected under `epoch`. Rejected with
    /// `NotConnected`, leaving the queue untouched, if the session left voice
    /// in the meantime.
    pub async fn enqueue_on(
        &self,
        epoch: ConnectionEpoch,
        tracks: Vec<Track>,
    ) -> Result<EnqueueOutcome, PlayerError> {
        let mut state = self.state.lock().await;
        if state.voice.epoch() != epoch || state.voice.status() == VoiceStatus::Disconnected {
            info!(
                "🔇 Dropping {} resolved tracks in guild {}, the voice connection is gone",
                tracks.len(),
                self.guild_id
            );
            return Err(PlayerError::NotConnected);
        }
        self.append(&mut state, tracks).await
    }

    /// Appends tracks and starts playback if the session is idle and connected.
    async fn append(&self, state: &mut SessionState, tracks: Vec<Track>) -> Result<EnqueueOutcome, PlayerError> {
        if state.queue.is_full() {
            return Err(PlayerError::QueueFull {
                max: state.queue.max_size(),
            });
        }

        let outcome = state.queue.extend(tracks);
        state.touch();
        info!(
            "➕ Added {} tracks to the queue in guild {}",
            outcome.added, self.guild_id
        );

        if state.current.is_none() && state.voice.is_connected() {
            self.advance(state).await;
        }
        Ok(outcome)
    }

    pub async fn pause(&self) -> Result<Track, PlayerError> {
        let mut state = self.state.lock().await;
        let link = state.voice.require()?;
        let Some(current) = state.current.clone() else {
            return Err(PlayerError::NothingPlaying);
        };
        if state.skip_pending() {
            return Err(PlayerError::NothingPlaying);
        }
        if state.paused {
            return Err(PlayerError::AlreadyPaused);
        }

        if state.render.is_some() {
            link.pause().map_err(PlayerError::Transport)?;
        }
        state.paused = true;
        info!("⏸️ Paused playback in guild {}", self.guild_id);
        Ok(current)
    }

    pub async fn resume(&self) -> Result<Track, PlayerError> {
        let mut state = self.state.lock().await;
        let link = state.voice.require()?;
        let Some(current) = state.current.clone() else {
            return Err(PlayerError::NothingPlaying);
        };
        if !state.paused {
            return Err(PlayerError::NotPaused);
        }

        if state.render.is_some() {
            link.resume().map_err(PlayerError::Transport)?;
            state.paused = false;
        } else {
            // The paused render already ended (relocation, transport hiccup).
            state.paused = false;
            self.restart_current(&mut state).await;
        }
        info!("▶️ Resumed playback in guild {}", self.guild_id);
        Ok(current)
    }

    /// Stops the current track; the completion notification advances the
    /// queue without looping.
    pub async fn skip(&self) -> Result<Track, PlayerError> {
        let mut state = self.state.lock().await;
        let link = state.voice.require()?;

        let active = match (state.render, &state.current, state.paused) {
            (Some(active), Some(_), false) if active.end == RenderEnd::Natural => active,
            _ => return Err(PlayerError::NothingPlaying),
        };
        link.stop().map_err(PlayerError::Transport)?;

        state.render = Some(ActiveRender {
            end: RenderEnd::SkipRequested,
            ..active
        });
        let skipped = state.current.clone().ok_or(PlayerError::NothingPlaying)?;
        info!("⏭️ Skipped '{}' in guild {}", skipped.title, self.guild_id);
        Ok(skipped)
    }

    /// Removes a queued track by 1-based position.
    pub async fn remove(&self, position: i64) -> Result<Track, PlayerError> {
        let mut state = self.state.lock().await;
        let removed = state.queue.remove(position)?;
        info!(
            "❌ Removed '{}' at position {} in guild {}",
            removed.title, position, self.guild_id
        );
        Ok(removed)
    }

    /// Stops playback and empties the queue. Returns how many queued tracks
    /// were dropped.
    pub async fn clear(&self) -> Result<usize, PlayerError> {
        let mut state = self.state.lock().await;
        let link = state.voice.require()?;

        if state.render.is_some() {
            if let Err(e) = link.stop() {
                warn!("⚠️ Could not stop playback in guild {}: {}", self.guild_id, e);
            }
        }
        let dropped = state.reset_playback();
        info!("🗑️ Cleared the queue in guild {}", self.guild_id);
        Ok(dropped)
    }

    /// Flips looping on the current track. Returns the track after the change.
    pub async fn toggle_loop(&self) -> Result<Track, PlayerError> {
        let mut state = self.state.lock().await;
        if state.skip_pending() {
            return Err(PlayerError::NothingPlaying);
        }
        let current = state.current.as_mut().ok_or(PlayerError::NoCurrentTrack)?;
        current.looping = !current.looping;

        info!(
            "🔂 Loop {} for '{}' in guild {}",
            if current.looping { "enabled" } else { "disabled" },
            current.title,
            self.guild_id
        );
        Ok(current.clone())
    }

    /// Connects only when the session has no connection at all. The returned
    /// epoch is checked again by [`GuildSession::enqueue_on`].
    pub async fn ensure_connected(&self, channel_id: ChannelId) -> Result<ConnectionEpoch, PlayerError> {
        {
            let state = self.state.lock().await;
            match state.voice.status() {
                VoiceStatus::Connected(_) => return Ok(state.voice.epoch()),
                VoiceStatus::Moving { .. } => return Err(PlayerError::Relocating),
                VoiceStatus::Disconnected => {}
            }
        }

        self.connect(channel_id).await?;
        let state = self.state.lock().await;
        match state.voice.status() {
            VoiceStatus::Disconnected => Err(PlayerError::NotConnected),
            _ => Ok(state.voice.epoch()),
        }
    }

    /// Connects to `channel_id`, relocating if connected elsewhere.
    ///
    /// A relocation stops the active render without advancing and renders the
    /// current track again once the move succeeds. On failure the prior
    /// connection, if any, is kept.
    pub async fn connect(&self, channel_id: ChannelId) -> Result<ConnectOutcome, PlayerError> {
        let (transition, prior) = {
            let mut state = self.state.lock().await;
            if state.voice.is_connected() && state.voice.channel_id() == Some(channel_id) {
                state.touch();
                return Ok(ConnectOutcome::AlreadyConnected(channel_id));
            }

            let (transition, prior) = state.voice.begin(channel_id)?;
            if let Some(link) = prior.as_deref() {
                if state.render.take().is_some() {
                    if let Err(e) = link.stop() {
                        warn!("⚠️ Could not stop playback before moving in guild {}: {}", self.guild_id, e);
                    }
                }
            }
            (transition, prior)
        };

        info!("🔊 Connecting to voice channel {} in guild {}", channel_id, self.guild_id);
        let result = match prior {
            Some(mut link) => {
                let moved = link.move_to(channel_id).await;
                match moved {
                    Ok(()) => Ok(link),
                    Err(e) => Err((e, Some(link))),
                }
            }
            None => self
                .connector
                .connect(self.guild_id, channel_id)
                .await
                .map_err(|e| (e, None)),
        };

        let mut state = self.state.lock().await;
        match result {
            Ok(link) => {
                if let Err(stale) = state.voice.complete(transition, link) {
                    warn!("🔌 Disconnected from guild {} while joining {}", self.guild_id, channel_id);
                    self.retire_link(&state, stale).await;
                    return Err(PlayerError::Connection(VoiceError::Superseded));
                }

                state.touch();
                if state.current.is_some() {
                    self.restart_current(&mut state).await;
                } else if !state.queue.is_empty() {
                    self.advance(&mut state).await;
                }

                Ok(match transition.from {
                    Some(from) => {
                        info!("🔀 Moved from {} to {} in guild {}", from, channel_id, self.guild_id);
                        ConnectOutcome::Moved { from, to: channel_id }
                    }
                    None => {
                        info!("🔊 Connected to {} in guild {}", channel_id, self.guild_id);
                        ConnectOutcome::Connected(channel_id)
                    }
                })
            }
            Err((e, prior)) => {
                error!("❌ Could not join {} in guild {}: {}", channel_id, self.guild_id, e);
                match state.voice.abort(transition, prior) {
                    Some(stale) => self.retire_link(&state, stale).await,
                    None => {
                        if state.voice.is_connected() && state.current.is_some() {
                            self.restart_current(&mut state).await;
                        }
                    }
                }
                Err(PlayerError::Connection(e))
            }
        }
    }

    /// Leaves the voice channel and forgets the queue.
    pub async fn disconnect(&self) -> Result<(), PlayerError> {
        let link = {
            let mut state = self.state.lock().await;
            let (link, cancelled) = state.voice.detach();
            if link.is_none() && !cancelled {
                return Err(PlayerError::NotConnected);
            }
            state.reset_playback();
            state.last_activity = None;
            link
        };

        if let Some(link) = link {
            self.close_link(link).await;
        }
        info!("👋 Left the voice channel in guild {}", self.guild_id);
        Ok(())
    }

    /// Disconnects and clears the session if it is connected, has nothing
    /// playing or paused, and has been idle for longer than `timeout`.
    pub async fn evict_if_idle(&self, now: Instant, timeout: Duration) -> bool {
        let link = {
            let mut state = self.state.lock().await;
            if !state.voice.is_connected() || state.current.is_some() {
                return false;
            }
            let Some(last_activity) = state.last_activity else {
                return false;
            };
            if now.saturating_duration_since(last_activity) <= timeout {
                return false;
            }

            state.reset_playback();
            state.last_activity = None;
            state.voice.detach().0
        };

        if let Some(link) = link {
            self.close_link(link).await;
        }
        info!("💤 Left the voice channel in guild {} after inactivity", self.guild_id);
        true
    }

    /// Disconnects if needed and stops the completion pump.
    pub(crate) async fn shutdown(&self) {
        match self.disconnect().await {
            Ok(()) | Err(PlayerError::NotConnected) => {}
            Err(e) => warn!("⚠️ Error shutting down session for guild {}: {}", self.guild_id, e),
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    /// Completion notification entry point, called by the bridge pump.
    pub(crate) async fn on_render_finished(&self, finished: RenderFinished) {
        let mut state = self.state.lock().await;
        let Some(active) = state.render.filter(|r| r.id == finished.render_id) else {
            debug!(
                "Ignoring stale completion of render {} in guild {}",
                finished.render_id, self.guild_id
            );
            return;
        };
        state.render = None;
        state.touch();

        if let Some(e) = &finished.error {
            error!("❌ Playback error in guild {}: {}", self.guild_id, e);
        }

        match active.end {
            RenderEnd::SkipRequested => {
                debug!("Skipped track ended in guild {}, advancing", self.guild_id);
            }
            RenderEnd::Natural if state.paused => {
                info!(
                    "⏸️ Playback is paused in guild {}, not advancing",
                    self.guild_id
                );
                return;
            }
            RenderEnd::Natural => {
                if let Some(current) = state.current.take() {
                    if current.looping && finished.error.is_none() {
                        info!("🔂 Looping '{}' in guild {}", current.title, self.guild_id);
                        state.queue.push_front(current);
                    }
                }
            }
        }

        self.advance(&mut state).await;
    }

    /// Pops the next track into `current` and renders it. Tracks that fail
    /// to render are dropped and the next one is tried.
    async fn advance(&self, state: &mut SessionState) {
        state.render = None;
        state.paused = false;
        state.current = None;

        while let Some(track) = state.queue.pop_front() {
            match self.start_render(state, &track).await {
                Ok(()) => {
                    info!("🎵 Now playing '{}' in guild {}", track.title, self.guild_id);
                    state.current = Some(track);
                    state.touch();
                    return;
                }
                Err(VoiceError::NotConnected) => {
                    warn!("🔇 No voice connection in guild {}, holding the queue", self.guild_id);
                    state.queue.push_front(track);
                    return;
                }
                Err(e) => {
                    error!("❌ Error playing '{}' in guild {}: {}", track.title, self.guild_id, e);
                }
            }
        }

        info!("📭 No more tracks in the queue for guild {}", self.guild_id);
    }

    /// Renders the current track again from the start, keeping the pause
    /// state. Falls back to advancing if the render fails.
    async fn restart_current(&self, state: &mut SessionState) {
        let Some(track) = state.current.clone() else {
            return;
        };

        match self.start_render(state, &track).await {
            Ok(()) if state.paused => {
                if let Some(Err(e)) = state.voice.link_mut().map(|link| link.pause()) {
                    warn!("⚠️ Could not keep '{}' paused in guild {}: {}", track.title, self.guild_id, e);
                    state.paused = false;
                }
            }
            Ok(()) => {}
            Err(e) => {
                error!("❌ Could not restart '{}' in guild {}: {}", track.title, self.guild_id, e);
                self.advance(state).await;
            }
        }
    }

    async fn start_render(&self, state: &mut SessionState, track: &Track) -> Result<(), VoiceError> {
        let render_id = state.allocate_render_id();
        let notifier = CompletionNotifier::new(render_id, self.completions.clone());
        let link = state.voice.link_mut().ok_or(VoiceError::NotConnected)?;

        link.render(&track.source_locator, notifier).await?;
        state.render = Some(ActiveRender {
            id: render_id,
            end: RenderEnd::Natural,
        });
        Ok(())
    }

    /// Gets rid of a link that lost a race against a disconnect. Runs under
    /// the session lock so no new connect can start meanwhile; if one already
    /// did, it shares the guild's call and only the stale render is dropped.
    async fn retire_link(&self, state: &SessionState, mut link: Box<dyn VoiceLink>) {
        if state.voice.status() == VoiceStatus::Disconnected {
            self.close_link(link).await;
        } else {
            debug!("Newer connection in guild {}, releasing the stale link only", self.guild_id);
            link.release();
        }
    }

    async fn close_link(&self, mut link: Box<dyn VoiceLink>) {
        if let Err(e) = link.disconnect().await {
            warn!("⚠️ Error leaving voice in guild {}: {}", self.guild_id, e);
        }
    }
}

#[cfg(test)]
impl GuildSession {
    /// Appends without checking which connection the tracks were resolved
    /// under.
    pub(crate) async fn enqueue(&self, tracks: Vec<Track>) -> Result<EnqueueOutcome, PlayerError> {
        let mut state = self.state.lock().await;
        self.append(&mut state, tracks).await
    }

    /// Session without a pump; the test delivers completions itself.
    pub(crate) fn detached(
        connector: Arc<dyn VoiceConnector>,
        max_queue_size: usize,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<RenderFinished>) {
        let (tx, rx) = bridge::completion_channel();
        (Self::new(GuildId::new(1), connector, max_queue_size, tx), rx)
    }
}
