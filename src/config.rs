//! Configuration types.
//!
//! Everything the parser, rule engine, and reply router need is built here
//! once at startup and passed in explicitly. Nothing reads configuration
//! from ambient state after init.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;

/// How bot replies are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyMode {
    /// Reply in the same thread the triggering message belongs to, if any.
    #[default]
    Message,
    /// Always reply in a thread, rooting a new one at the triggering message.
    Thread,
    /// Reply privately to the invoking user only.
    Ephemeral,
}

impl std::str::FromStr for ReplyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "thread" => Ok(Self::Thread),
            "ephemeral" => Ok(Self::Ephemeral),
            other => Err(ConfigError::InvalidValue {
                key: "reply mode".into(),
                message: format!("unknown mode {other:?} (expected message, thread, or ephemeral)"),
            }),
        }
    }
}

/// Configuration for reactji-based votes.
///
/// The upvote and downvote sets are expected to be disjoint; when they are
/// not, the upvote set wins because it is checked first.
#[derive(Debug, Clone)]
pub struct ReactjiConfig {
    pub enabled: bool,
    pub upvote: HashSet<String>,
    pub downvote: HashSet<String>,
}

impl Default for ReactjiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upvote: ["+1", "thumbsup"].iter().map(|s| s.to_string()).collect(),
            downvote: ["-1", "thumbsdown"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Show raw error detail in replies instead of a generic message.
    pub debug: bool,
    /// Rewrite motivate-style phrases into give-karma syntax.
    pub motivate: bool,
    /// Whether users may give karma to themselves.
    pub self_karma: bool,
    /// Maximum points a single command can give or take.
    pub max_points: i64,
    /// Default number of users listed in the leaderboard.
    pub leaderboard_limit: usize,
    /// Handles that can never receive karma. Checked at write time.
    pub blacklist: HashSet<String>,
    /// Alias handle → canonical handle. Single-hop, built once at startup.
    pub aliases: HashMap<String, String>,
    pub reactji: ReactjiConfig,
    pub reply_mode: ReplyMode,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            debug: false,
            motivate: true,
            self_karma: true,
            max_points: 6,
            leaderboard_limit: 10,
            blacklist: HashSet::new(),
            aliases: HashMap::new(),
            reactji: ReactjiConfig::default(),
            reply_mode: ReplyMode::default(),
        }
    }
}

impl BotConfig {
    /// Build configuration from `KARMABOT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut config = Self {
            debug: env_bool("KARMABOT_DEBUG", defaults.debug),
            motivate: env_bool("KARMABOT_MOTIVATE", defaults.motivate),
            self_karma: env_bool("KARMABOT_SELF_KARMA", defaults.self_karma),
            max_points: env_parsed("KARMABOT_MAX_POINTS", defaults.max_points)?,
            leaderboard_limit: env_parsed(
                "KARMABOT_LEADERBOARD_LIMIT",
                defaults.leaderboard_limit,
            )?,
            blacklist: env_list("KARMABOT_BLACKLIST")
                .into_iter()
                .map(|h| h.to_lowercase())
                .collect(),
            aliases: parse_alias_groups(&env_list("KARMABOT_ALIASES")),
            reactji: ReactjiConfig {
                enabled: env_bool("KARMABOT_REACTJI", false),
                ..ReactjiConfig::default()
            },
            reply_mode: match std::env::var("KARMABOT_REPLY_MODE") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.reply_mode,
            },
        };

        let upvote = env_list("KARMABOT_REACTJI_UPVOTE");
        if !upvote.is_empty() {
            config.reactji.upvote = upvote.into_iter().collect();
        }
        let downvote = env_list("KARMABOT_REACTJI_DOWNVOTE");
        if !downvote.is_empty() {
            config.reactji.downvote = downvote.into_iter().collect();
        }

        Ok(config)
    }
}

/// Parse repeatable `"canonical++alias1++alias2"` groups into an
/// alias → canonical map. Resolution is single-hop: targets are taken
/// as canonical and never chased further.
pub fn parse_alias_groups(groups: &[String]) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for group in groups {
        let mut parts = group.split("++").map(str::trim).filter(|p| !p.is_empty());
        let Some(canonical) = parts.next() else {
            continue;
        };
        let canonical = canonical.to_lowercase();
        for alias in parts {
            aliases.insert(alias.to_lowercase(), canonical.clone());
        }
    }
    aliases
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("could not parse {v:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Read a comma-separated list from the environment. Empty if unset.
fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BotConfig::default();
        assert_eq!(config.max_points, 6);
        assert_eq!(config.leaderboard_limit, 10);
        assert!(config.self_karma);
        assert!(config.motivate);
        assert!(!config.debug);
        assert_eq!(config.reply_mode, ReplyMode::Message);
        assert!(!config.reactji.enabled);
    }

    #[test]
    fn reactji_defaults_are_disjoint() {
        let reactji = ReactjiConfig::default();
        assert!(reactji.upvote.is_disjoint(&reactji.downvote));
        assert!(reactji.upvote.contains("+1"));
        assert!(reactji.downvote.contains("-1"));
    }

    #[test]
    fn reply_mode_parses_known_values() {
        assert_eq!("message".parse::<ReplyMode>().unwrap(), ReplyMode::Message);
        assert_eq!("thread".parse::<ReplyMode>().unwrap(), ReplyMode::Thread);
        assert_eq!(
            "ephemeral".parse::<ReplyMode>().unwrap(),
            ReplyMode::Ephemeral
        );
    }

    #[test]
    fn reply_mode_rejects_unknown_value() {
        assert!("loudspeaker".parse::<ReplyMode>().is_err());
    }

    #[test]
    fn alias_groups_map_every_alias_to_canonical() {
        let groups = vec!["anna++banana++ana".to_string(), "bob++bobby".to_string()];
        let aliases = parse_alias_groups(&groups);
        assert_eq!(aliases.get("banana"), Some(&"anna".to_string()));
        assert_eq!(aliases.get("ana"), Some(&"anna".to_string()));
        assert_eq!(aliases.get("bobby"), Some(&"bob".to_string()));
        assert_eq!(aliases.len(), 3);
    }

    #[test]
    fn alias_groups_lowercase_both_sides() {
        let aliases = parse_alias_groups(&["Anna++Banana".to_string()]);
        assert_eq!(aliases.get("banana"), Some(&"anna".to_string()));
    }

    #[test]
    fn alias_group_with_no_alias_is_ignored() {
        let aliases = parse_alias_groups(&["loner".to_string(), String::new()]);
        assert!(aliases.is_empty());
    }
}
