use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::Track;
use crate::error::PlayerError;

/// Result of a batch enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// Tracks left out because the queue reached its bound.
    pub rejected: usize,
}

/// Bounded FIFO of upcoming tracks. The current track is not part of it.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: Track) -> Result<(), PlayerError> {
        if self.is_full() {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        debug!("➕ Queued: {}", track.title);
        self.items.push_back(track);
        Ok(())
    }

    /// Appends tracks in order until the bound is hit; the rest are counted
    /// as rejected, what was already added stays.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) -> EnqueueOutcome {
        let mut outcome = EnqueueOutcome { added: 0, rejected: 0 };

        for track in tracks {
            if self.push(track).is_ok() {
                outcome.added += 1;
            } else {
                outcome.rejected += 1;
            }
        }

        if outcome.rejected > 0 {
            info!(
                "📦 Queue full ({} tracks), {} tracks left out",
                self.max_size, outcome.rejected
            );
        }
        outcome
    }

    /// Re-inserts a track at the head, ignoring the bound. Used for looping,
    /// where the track is popped again within the same transition.
    pub fn push_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Removes the track at a 1-based position.
    pub fn remove(&mut self, position: i64) -> Result<Track, PlayerError> {
        let len = self.items.len();
        if len == 0 {
            return Err(PlayerError::QueueEmpty);
        }

        let index = usize::try_from(position)
            .ok()
            .filter(|p| (1..=len).contains(p))
            .map(|p| p - 1)
            .ok_or(PlayerError::InvalidPosition { position, len })?;

        let removed = self
            .items
            .remove(index)
            .ok_or(PlayerError::InvalidPosition { position, len })?;
        debug!("❌ Removed track at position {}", position);
        Ok(removed)
    }

    /// Limpia la cola, devuelve cuántos tracks había
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Point-in-time copy of a session's queue for display.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub state: PlaybackState,
}

impl QueueSnapshot {
    pub fn total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.upcoming.iter())
            .map(|track| track.duration)
            .sum()
    }

    /// Obtiene una página específica de la cola (1-based)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage<'_> {
        let per_page = items_per_page.max(1);
        let total_pages = self.upcoming.len().div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(self.upcoming.len());

        QueuePage {
            first_position: start + 1,
            items: &self.upcoming[start..end],
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueuePage<'a> {
    /// 1-based queue position of `items[0]`.
    pub first_position: usize,
    pub items: &'a [Track],
    pub current_page: usize,
    pub total_pages: usize,
}
