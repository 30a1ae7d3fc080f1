//! Error types shared by the playback subsystem.
//!
//! [`PlayerError`] is what the command surface shows to users, so its
//! `Display` output is phrased as a reply. [`ResolveError`] and
//! [`VoiceError`] describe failures of the two external collaborators
//! (yt-dlp and the voice transport) and end up wrapped inside it.

use thiserror::Error;

/// Failures while turning a query into tracks.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not run yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("yt-dlp error: {0}")]
    Failed(String),

    #[error("could not parse yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no playable tracks found")]
    Empty,

    #[error("resolver is shutting down")]
    Closed,
}

/// Failures reported by the voice transport.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("failed to join voice channel: {0}")]
    Join(String),

    #[error("failed to leave voice channel: {0}")]
    Leave(String),

    #[error("track control failed: {0}")]
    Control(String),

    #[error("no active voice connection")]
    NotConnected,

    #[error("connection attempt was superseded by a disconnect")]
    Superseded,
}

/// Outcome of a rejected player operation.
///
/// Every variant is local to one guild: the session state is left as it was
/// before the call.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("An error occurred while processing your request")]
    Resolution(#[source] ResolveError),

    #[error("I'm not connected to any voice channel")]
    NotConnected,

    #[error("I'm switching voice channels, try again in a moment")]
    Relocating,

    #[error("I'm not playing anything right now")]
    NothingPlaying,

    #[error("The playback is already paused")]
    AlreadyPaused,

    #[error("The playback is not paused.")]
    NotPaused,

    #[error("No track is currently playing.")]
    NoCurrentTrack,

    #[error("The queue is currently empty")]
    QueueEmpty,

    #[error("Invalid position. Please enter a number between 1 and {len}")]
    InvalidPosition { position: i64, len: usize },

    #[error("The queue is full (maximum {max} tracks)")]
    QueueFull { max: usize },

    #[error("Playback control failed")]
    Transport(#[source] VoiceError),

    #[error("Couldn't join the voice channel")]
    Connection(#[source] VoiceError),

    #[error("You are not connected to a voice channel")]
    UserNotInVoice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_position_reports_valid_range() {
        let err = PlayerError::InvalidPosition { position: 7, len: 3 };
        assert_eq!(
            err.to_string(),
            "Invalid position. Please enter a number between 1 and 3"
        );
    }

    #[test]
    fn connection_error_keeps_transport_cause() {
        let err = PlayerError::Connection(VoiceError::Join("timed out".into()));
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(
            source.as_deref(),
            Some("failed to join voice channel: timed out")
        );
    }
}
