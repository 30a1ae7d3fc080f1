use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{ResolvedSet, TrackResolver};
use crate::{audio::track::Track, error::ResolveError};

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";

static URL_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^https?://\S+$").ok());

/// How the resolver invokes yt-dlp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub program: String,
    /// Passed through before the fixed arguments (cookies, proxies, ...).
    pub extra_args: Vec<String>,
    pub max_playlist_size: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            extra_args: Vec::new(),
            max_playlist_size: 100,
        }
    }
}

/// Salida de `--dump-single-json`, tanto para un video como para una playlist
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpInfo {
    fn locator(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }

    fn into_track(self, requester: UserId) -> Option<Track> {
        let locator = self.locator()?.to_string();
        let duration = self
            .duration
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or_default();

        Some(
            Track::new(self.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()), locator, requester)
                .with_duration(duration),
        )
    }
}

/// Resolves queries by running the yt-dlp CLI.
pub struct YtDlpResolver {
    options: ResolverOptions,
    // Limitar procesos concurrentes de yt-dlp
    permits: Semaphore,
}

impl YtDlpResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            options,
            permits: Semaphore::new(3),
        }
    }

    pub fn is_url(query: &str) -> bool {
        URL_REGEX.as_ref().is_some_and(|re| re.is_match(query))
    }

    fn build_args(&self, query: &str) -> Vec<String> {
        let target = if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        let mut args = self.options.extra_args.clone();
        args.extend(
            [
                "--dump-single-json",
                "--flat-playlist",
                "--no-warnings",
                "--playlist-end",
            ]
            .map(String::from),
        );
        args.push(self.options.max_playlist_size.to_string());
        args.push("--".to_string());
        args.push(target);
        args
    }

    /// Verifica que yt-dlp esté disponible, devuelve su versión
    pub async fn version(&self) -> Result<String, ResolveError> {
        let output = Command::new(&self.options.program)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ResolveError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Interprets yt-dlp's JSON. More than one entry makes a playlist.
fn parse_output(stdout: &[u8], requester: UserId) -> Result<ResolvedSet, ResolveError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)?;

    let Some(entries) = info.entries else {
        return info
            .into_track(requester)
            .map(ResolvedSet::Single)
            .ok_or(ResolveError::Empty);
    };

    if entries.len() > 1 {
        let title = info.title.unwrap_or_else(|| UNKNOWN_PLAYLIST.to_string());
        let tracks: Vec<Track> = entries
            .into_iter()
            .filter_map(|entry| entry.into_track(requester))
            .map(|track| track.with_playlist_origin(title.clone()))
            .collect();

        if tracks.is_empty() {
            return Err(ResolveError::Empty);
        }
        return Ok(ResolvedSet::Playlist { title, tracks });
    }

    entries
        .into_iter()
        .next()
        .and_then(|entry| entry.into_track(requester))
        .map(ResolvedSet::Single)
        .ok_or(ResolveError::Empty)
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<ResolvedSet, ResolveError> {
        let _permit = self.permits.acquire().await.map_err(|_| ResolveError::Closed)?;

        info!("🔍 Resolving: {}", query);
        let output = Command::new(&self.options.program)
            .args(self.build_args(query))
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Failed(stderr.trim().to_string()));
        }

        let resolved = parse_output(&output.stdout, requester)?;
        debug!("📊 '{}' resolved to {} tracks", query, resolved.len());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REQUESTER: UserId = UserId::new(9);

    #[test]
    fn text_queries_become_searches() {
        let resolver = YtDlpResolver::new(ResolverOptions {
            extra_args: vec!["--cookies".into(), "c.txt".into()],
            max_playlist_size: 25,
            ..Default::default()
        });

        assert_eq!(
            resolver.build_args("never gonna give you up"),
            vec![
                "--cookies",
                "c.txt",
                "--dump-single-json",
                "--flat-playlist",
                "--no-warnings",
                "--playlist-end",
                "25",
                "--",
                "ytsearch1:never gonna give you up",
            ]
        );
        assert_eq!(
            resolver.build_args("https://youtu.be/dQw4w9WgXcQ").last().map(String::as_str),
            Some("https://youtu.be/dQw4w9WgXcQ")
        );
    }

    #[test]
    fn url_detection() {
        assert!(YtDlpResolver::is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(YtDlpResolver::is_url("http://example.com/a.mp3"));
        assert!(!YtDlpResolver::is_url("lofi hip hop"));
        assert!(!YtDlpResolver::is_url("https://example.com/a b"));
    }

    #[test]
    fn single_video() {
        let json = br#"{"title": "Song", "webpage_url": "https://youtu.be/x", "duration": 212.4}"#;

        let resolved = parse_output(json, REQUESTER).unwrap();

        assert_eq!(
            resolved,
            ResolvedSet::Single(
                Track::new("Song", "https://youtu.be/x", REQUESTER)
                    .with_duration(Duration::from_secs_f64(212.4))
            )
        );
    }

    #[test]
    fn search_with_one_hit_is_a_single_track() {
        let json = br#"{"title": "lofi", "entries": [
            {"title": "Lofi Beats", "url": "https://www.youtube.com/watch?v=abc", "duration": null}
        ]}"#;

        let ResolvedSet::Single(track) = parse_output(json, REQUESTER).unwrap() else {
            panic!("expected a single track");
        };
        assert_eq!(track.title, "Lofi Beats");
        assert_eq!(track.duration, Duration::ZERO);
        assert!(track.playlist_origin.is_none());
    }

    #[test]
    fn playlist_tags_origin_and_fills_defaults() {
        let json = br#"{"title": "Mix", "entries": [
            {"title": "One", "url": "https://www.youtube.com/watch?v=1", "duration": 60},
            {"url": "https://www.youtube.com/watch?v=2"},
            {"title": "Gone"}
        ]}"#;

        let ResolvedSet::Playlist { title, tracks } = parse_output(json, REQUESTER).unwrap() else {
            panic!("expected a playlist");
        };

        assert_eq!(title, "Mix");
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", UNKNOWN_TITLE]);
        assert!(tracks.iter().all(|t| t.playlist_origin.as_deref() == Some("Mix")));
    }

    #[test]
    fn untitled_playlist() {
        let json = br#"{"entries": [{"url": "a"}, {"url": "b"}]}"#;
        let ResolvedSet::Playlist { title, .. } = parse_output(json, REQUESTER).unwrap() else {
            panic!("expected a playlist");
        };
        assert_eq!(title, UNKNOWN_PLAYLIST);
    }

    #[test]
    fn nothing_playable() {
        assert!(matches!(
            parse_output(br#"{"title": "empty", "entries": []}"#, REQUESTER),
            Err(ResolveError::Empty)
        ));
        assert!(matches!(
            parse_output(b"not json", REQUESTER),
            Err(ResolveError::Parse(_))
        ));
    }
}
