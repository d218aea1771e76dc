//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::game::resolver::ThresholdPolicy;

/// Cooldown between shots (milliseconds)
pub const COOLDOWN_DURATION_MS: u64 = 7_500;
/// Votes that remove a fish from the tank
pub const ELIMINATION_THRESHOLD: usize = 4;
/// Humans that must survive for a victory
pub const VICTORY_MIN_HUMAN_COUNT: usize = 5;
/// AI fish ceiling before the match is lost
pub const DEFEAT_MAX_AI_COUNT: usize = 5;
/// Human fish that may be voted out by mistake
pub const MAX_HUMAN_KILLED: usize = 3;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Public base URL for building WebSocket links
    pub public_base_url: String,
    /// Allowed client origin for CORS
    pub client_origin: String,

    /// How long a finished match stays addressable
    pub match_linger: Duration,
    /// Rules cloned into every new match
    pub rules: MatchRules,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            match_linger: Duration::from_secs(parse_var("MATCH_LINGER_SECS", 300)?),
            rules: MatchRules::from_env()?,
        })
    }
}

/// Immutable per-match battle rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRules {
    pub cooldown_ms: u64,
    pub threshold: ThresholdPolicy,
    pub victory_min_human_count: usize,
    pub defeat_max_ai_count: usize,
    /// `None` disables the casualty defeat
    pub max_human_killed: Option<usize>,
}

impl MatchRules {
    pub fn from_env() -> Result<Self, ConfigError> {
        let votes = parse_var("ELIMINATION_THRESHOLD", ELIMINATION_THRESHOLD)?;
        let threshold = match env::var("ELIMINATION_THRESHOLD_RATIO") {
            Ok(raw) => {
                let ratio: f64 = raw
                    .parse()
                    .map_err(|_| ConfigError::Invalid("ELIMINATION_THRESHOLD_RATIO"))?;
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(ConfigError::Invalid("ELIMINATION_THRESHOLD_RATIO"));
                }
                ThresholdPolicy::Proportional { ratio, min: votes }
            }
            Err(_) => ThresholdPolicy::Fixed { votes },
        };

        let max_human_killed = parse_var("MAX_HUMAN_KILLED", MAX_HUMAN_KILLED)?;

        Ok(Self {
            cooldown_ms: parse_var("COOLDOWN_DURATION_MS", COOLDOWN_DURATION_MS)?,
            threshold,
            victory_min_human_count: parse_var("VICTORY_MIN_HUMAN_COUNT", VICTORY_MIN_HUMAN_COUNT)?,
            defeat_max_ai_count: parse_var("DEFEAT_MAX_AI_COUNT", DEFEAT_MAX_AI_COUNT)?,
            max_human_killed: (max_human_killed > 0).then_some(max_human_killed),
        })
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            cooldown_ms: COOLDOWN_DURATION_MS,
            threshold: ThresholdPolicy::Fixed {
                votes: ELIMINATION_THRESHOLD,
            },
            victory_min_human_count: VICTORY_MIN_HUMAN_COUNT,
            defeat_max_ai_count: DEFEAT_MAX_AI_COUNT,
            max_human_killed: Some(MAX_HUMAN_KILLED),
        }
    }
}

/// Per-match overrides accepted when a match is created
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesPatch {
    pub cooldown_ms: Option<u64>,
    pub elimination_threshold: Option<usize>,
    pub victory_min_human_count: Option<usize>,
    pub defeat_max_ai_count: Option<usize>,
    pub max_human_killed: Option<usize>,
}

impl RulesPatch {
    /// Apply on top of `base`
    pub fn apply(&self, base: &MatchRules) -> MatchRules {
        let mut rules = base.clone();
        if let Some(ms) = self.cooldown_ms {
            rules.cooldown_ms = ms;
        }
        if let Some(votes) = self.elimination_threshold {
            rules.threshold = ThresholdPolicy::Fixed { votes };
        }
        if let Some(n) = self.victory_min_human_count {
            rules.victory_min_human_count = n;
        }
        if let Some(n) = self.defeat_max_ai_count {
            rules.defeat_max_ai_count = n;
        }
        if let Some(n) = self.max_human_killed {
            rules.max_human_killed = (n > 0).then_some(n);
        }
        rules
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_battle_constants() {
        let rules = MatchRules::default();
        assert_eq!(rules.cooldown(), Duration::from_millis(7_500));
        assert_eq!(rules.threshold.threshold(20), 4);
        assert_eq!(rules.victory_min_human_count, 5);
        assert_eq!(rules.defeat_max_ai_count, 5);
        assert_eq!(rules.max_human_killed, Some(3));
    }

    #[test]
    fn patch_overrides_only_given_fields() {
        let patch = RulesPatch {
            cooldown_ms: Some(1_000),
            elimination_threshold: Some(2),
            max_human_killed: Some(0),
            ..RulesPatch::default()
        };
        let rules = patch.apply(&MatchRules::default());
        assert_eq!(rules.cooldown_ms, 1_000);
        assert_eq!(rules.threshold, ThresholdPolicy::Fixed { votes: 2 });
        assert_eq!(rules.victory_min_human_count, 5);
        assert_eq!(rules.max_human_killed, None);
    }
}
