pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::{audio::track::Track, error::ResolveError};

pub use ytdlp::{ResolverOptions, YtDlpResolver};

/// Resultado de resolver una consulta
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSet {
    Single(Track),
    /// Every track carries `title` as its playlist origin.
    Playlist { title: String, tracks: Vec<Track> },
}

impl ResolvedSet {
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            ResolvedSet::Single(track) => vec![track],
            ResolvedSet::Playlist { tracks, .. } => tracks,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ResolvedSet::Single(_) => 1,
            ResolvedSet::Playlist { tracks, .. } => tracks.len(),
        }
    }
}

/// Turns a URL or free-text query into playable tracks.
///
/// Implementations may suspend for a long time (they usually spawn an
/// external process) and must not touch any playback session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<ResolvedSet, ResolveError>;
}
