//! # Audio Module
//!
//! Per-guild playback orchestration.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - Owns one guild's queue, current track, pause flag and voice connection
//! - Every transition runs under the session lock, one at a time
//! - Connect/move run outside the lock and are re-validated afterwards
//!
//! ### [`bridge`] - Completion Bridge
//! - Turns "track ended" callbacks from the voice driver into messages
//! - A pump task feeds them back to the session in order
//! - Each render carries an id, so late notifications are recognised as stale
//!
//! ### [`registry`] and [`inactivity`]
//! - One session per guild, created on first use
//! - A single background sweep leaves voice channels that have been idle
//!   longer than the configured timeout
//!
//! ### [`player`] - Music Player
//! - The operations behind the slash commands, phrased as user replies
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = Arc::new(SessionRegistry::new(connector, 100));
//! let player = MusicPlayer::new(registry.clone(), resolver);
//!
//! player.play(guild_id, Some(channel_id), "lofi hip hop", user_id).await?;
//! player.pause(guild_id).await?;
//! player.skip(guild_id).await?;
//! ```

pub mod bridge;
pub mod connection;
pub mod inactivity;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod track;
