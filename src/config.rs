//! Configuration management.
//!
//! Loads settings from environment variables and .env file.

use std::time::Duration;

use crate::bot::scheduler::OrchestratorConfig;
use crate::bot::tracker::TrackerConfig;

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Settings {
    // Messaging platform
    pub discord_token: String,
    pub discord_guild_id: String,
    /// Run against the in-memory gateway; nothing leaves the process.
    pub dry_run: bool,

    // Stats API
    pub stats_api_base_url: String,

    // Polling
    pub idle_poll_secs: u64,
    pub active_poll_secs: u64,
    pub close_to_start_secs: u64,
    pub post_game_window_secs: u64,
    pub maintenance_interval_secs: u64,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

impl Settings {
    /// Load settings from environment variables (and .env file).
    pub fn from_env() -> Self {
        // Try to load .env file (ignore if not found).
        let _ = dotenvy::dotenv();

        Self {
            discord_token: env_str("DISCORD_TOKEN", ""),
            discord_guild_id: env_str("DISCORD_GUILD_ID", ""),
            dry_run: env_bool("DRY_RUN", false),

            stats_api_base_url: env_str(
                "STATS_API_BASE_URL",
                "https://statsapi.web.nhl.com/api/v1",
            ),

            idle_poll_secs: env_u64("IDLE_POLL_SECS", 60),
            active_poll_secs: env_u64("ACTIVE_POLL_SECS", 5),
            close_to_start_secs: env_u64("CLOSE_TO_START_SECS", 300),
            post_game_window_secs: env_u64("POST_GAME_WINDOW_SECS", 600),
            maintenance_interval_secs: env_u64("MAINTENANCE_INTERVAL_SECS", 1800),

            log_level: env_str("LOG_LEVEL", "info"),
            log_json: env_bool("LOG_JSON", false),
        }
    }

    /// Validate configuration for critical requirements.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.dry_run {
            if self.discord_token.is_empty() {
                errors.push("DISCORD_TOKEN is required unless DRY_RUN is set".to_string());
            }
            if self.discord_guild_id.is_empty() {
                errors.push("DISCORD_GUILD_ID is required unless DRY_RUN is set".to_string());
            }
        }

        if self.idle_poll_secs == 0 || self.active_poll_secs == 0 {
            errors.push("Poll intervals must be greater than zero".to_string());
        }

        if self.maintenance_interval_secs == 0 {
            errors.push("MAINTENANCE_INTERVAL_SECS must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            idle_poll: Duration::from_secs(self.idle_poll_secs),
            active_poll: Duration::from_secs(self.active_poll_secs),
            close_to_start: Duration::from_secs(self.close_to_start_secs),
            post_game_window: Duration::from_secs(self.post_game_window_secs),
            ..TrackerConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs),
            tracker: self.tracker_config(),
        }
    }
}

// =============================================================================
// Environment helpers
// =============================================================================

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
