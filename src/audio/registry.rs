use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::session::GuildSession;
use crate::voice::VoiceConnector;

/// Process-wide map from guild to its playback session.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    connector: Arc<dyn VoiceConnector>,
    max_queue_size: usize,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn VoiceConnector>, max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            connector,
            max_queue_size,
        }
    }

    /// Returns the guild's session, creating it on first use. Concurrent
    /// callers for the same guild always get the same session.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Creating playback session for guild {}", guild_id);
                GuildSession::spawn(guild_id, self.connector.clone(), self.max_queue_size)
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    /// Drops the guild's session after disconnecting it.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };
        session.shutdown().await;
        info!("🗑️ Removed playback session for guild {}", guild_id);
        true
    }

    /// Point-in-time list of sessions, safe to iterate across awaits.
    pub fn sessions(&self) -> Vec<Arc<GuildSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::connection::VoiceStatus, voice::fake::FakeConnector};
    use serenity::model::id::ChannelId;

    fn registry() -> (Arc<SessionRegistry>, crate::voice::fake::VoiceLog) {
        let (connector, voice) = FakeConnector::new();
        (Arc::new(SessionRegistry::new(connector, 10)), voice)
    }

    #[tokio::test]
    async fn same_guild_shares_one_session() {
        let (registry, _) = registry();
        let guild = GuildId::new(42);

        let first = registry.get_or_create(guild);
        let second = registry.get_or_create(guild);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(GuildId::new(43)).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_yields_single_session() {
        let (registry, _) = registry();
        let guild = GuildId::new(7);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(guild) })
            })
            .collect();
        let sessions = futures::future::join_all(handles).await;

        let first = sessions[0].as_ref().unwrap();
        for session in &sessions {
            assert!(Arc::ptr_eq(first, session.as_ref().unwrap()));
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_disconnects_the_session() {
        let (registry, voice) = registry();
        let guild = GuildId::new(1);
        let session = registry.get_or_create(guild);
        session.connect(ChannelId::new(5)).await.unwrap();

        assert!(registry.remove(guild).await);
        assert!(!registry.remove(guild).await);

        assert!(registry.is_empty());
        assert_eq!(session.voice_status().await, VoiceStatus::Disconnected);
        assert_eq!(voice.lock().disconnects, 1);
    }
}
