use serenity::model::id::UserId;
use std::time::Duration;

/// A resolved, playable item waiting in (or at the head of) a guild queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    /// Opaque reference handed to the voice transport when rendering.
    pub source_locator: String,
    pub duration: Duration,
    pub requester: UserId,
    /// Only meaningful while this track is the session's current track.
    pub looping: bool,
    pub playlist_origin: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, source_locator: impl Into<String>, requester: UserId) -> Self {
        Self {
            title: title.into(),
            source_locator: source_locator.into(),
            duration: Duration::ZERO,
            requester,
            looping: false,
            playlist_origin: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_playlist_origin(mut self, origin: impl Into<String>) -> Self {
        self.playlist_origin = Some(origin.into());
        self
    }
}

/// Formats a duration as `m:ss`, or `h:mm:ss` past the hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
