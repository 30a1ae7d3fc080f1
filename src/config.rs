use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::sources::ResolverOptions;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Inactividad (segundos)
    pub inactivity_timeout_secs: u64,
    pub inactivity_check_secs: u64,

    // yt-dlp
    pub ytdlp_path: String,
    pub ytdlp_args: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so it can be fed from
    /// something other than the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set")?,
            guild_id: var("GUILD_ID").map(|v| parse("GUILD_ID", &v)).transpose()?,

            max_queue_size: parse_or(&var, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(&var, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,

            inactivity_timeout_secs: parse_or(&var, "INACTIVITY_TIMEOUT", defaults.inactivity_timeout_secs)?,
            inactivity_check_secs: parse_or(&var, "INACTIVITY_CHECK_INTERVAL", defaults.inactivity_check_secs)?,

            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_args: var("YTDLP_ARGS")
                .map(|args| args.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make the player unusable.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.inactivity_timeout_secs == 0 {
            anyhow::bail!("Inactivity timeout must be greater than 0");
        }

        if self.inactivity_check_secs == 0 {
            anyhow::bail!("Inactivity check interval must be greater than 0");
        }

        Ok(())
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn inactivity_check_interval(&self) -> Duration {
        Duration::from_secs(self.inactivity_check_secs)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            program: self.ytdlp_path.clone(),
            extra_args: self.ytdlp_args.clone(),
            max_playlist_size: self.max_playlist_size,
        }
    }

    /// Returns a summary of the configuration for logging, without the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Queue: {} tracks, {} per playlist\n  \
            Inactivity: leave after {}, checked every {}\n  \
            yt-dlp: {} {:?}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("in guild {}", id)),
            self.max_queue_size,
            self.max_playlist_size,
            humantime::format_duration(self.inactivity_timeout()),
            humantime::format_duration(self.inactivity_check_interval()),
            self.ytdlp_path,
            self.ytdlp_args,
        )
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", key, value))
}

fn parse_or<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            max_queue_size: 100,
            max_playlist_size: 100,

            inactivity_timeout_secs: 120, // 2 minutos
            inactivity_check_secs: 30,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = load(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.guild_id, None);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.inactivity_timeout(), Duration::from_secs(120));
        assert_eq!(config.inactivity_check_interval(), Duration::from_secs(30));
        assert_eq!(config.resolver_options(), ResolverOptions::default());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "1234"),
            ("MAX_QUEUE_SIZE", "5"),
            ("INACTIVITY_TIMEOUT", "300"),
            ("YTDLP_PATH", "/opt/yt-dlp"),
            ("YTDLP_ARGS", "--cookies  /data/c.txt"),
            ("MAX_PLAYLIST_SIZE", "20"),
        ])
        .unwrap();

        assert_eq!(config.guild_id, Some(1234));
        assert_eq!(config.max_queue_size, 5);
        assert_eq!(config.inactivity_timeout_secs, 300);
        assert_eq!(
            config.resolver_options(),
            ResolverOptions {
                program: "/opt/yt-dlp".into(),
                extra_args: vec!["--cookies".into(), "/data/c.txt".into()],
                max_playlist_size: 20,
            }
        );
    }

    #[test]
    fn token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn rejects_zero_and_garbage() {
        let err = load(&[("DISCORD_TOKEN", "abc"), ("MAX_QUEUE_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("queue size"));

        let err = load(&[("DISCORD_TOKEN", "abc"), ("INACTIVITY_TIMEOUT", "soon")]).unwrap_err();
        assert!(err.to_string().contains("INACTIVITY_TIMEOUT"));
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };

        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("leave after 2m"));
    }
}
