//! Server configuration from environment variables.

use std::time::Duration;

/// Configuration for the APEX MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the database file (`:memory:` for ephemeral runs)
    pub database_path: String,
    /// Response cache capacity in entries
    pub cache_max_entries: usize,
    /// Response cache TTL
    pub cache_ttl: Duration,
    /// Default per-tool rate limit (requests per window)
    pub rate_limit_max: u32,
    /// Rate limit window
    pub rate_limit_window: Duration,
    /// Allowed repository URLs for PR evidence; empty means unrestricted
    pub allowed_repos: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: "apex.db".to_string(),
            cache_max_entries: 10_000,
            cache_ttl: Duration::from_secs(300),
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(60),
            allowed_repos: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_path =
            std::env::var("APEX_DB_PATH").unwrap_or(defaults.database_path);

        let cache_max_entries = std::env::var("APEX_CACHE_MAX_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.cache_max_entries);

        let cache_ttl = std::env::var("APEX_CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(defaults.cache_ttl, Duration::from_millis);

        let rate_limit_max = std::env::var("APEX_RATE_LIMIT_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.rate_limit_max);

        let rate_limit_window = std::env::var("APEX_RATE_LIMIT_WINDOW_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(defaults.rate_limit_window, Duration::from_millis);

        let allowed_repos = std::env::var("APEX_ALLOWED_REPOS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            database_path,
            cache_max_entries,
            cache_ttl,
            rate_limit_max,
            rate_limit_window,
            allowed_repos,
        }
    }

    /// An in-memory configuration for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.cache_max_entries, 10_000);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.rate_limit_max, 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert!(config.allowed_repos.is_empty());
    }
}
