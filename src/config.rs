/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Bridge configuration.
//!
//! Unlike a full application config (TOML files, environment discovery), this
//! is a plain struct the embedding server constructs programmatically.
//! Loading configuration from disk or environment variables is the host's
//! responsibility, not the bridge's.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::multiplexer::Bridge`] instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path or name of the analyzer executable. Looked up on `PATH` if not
    /// absolute.
    pub executable_path: String,
    /// Path to the analyzer's entry script. `None` triggers auto-discovery
    /// (see [`crate::discovery`]).
    pub script_path: Option<PathBuf>,
    /// How long to wait for a response before a request fails with
    /// [`crate::error::BridgeError::Timeout`].
    pub timeout: Duration,
    /// Extra environment variables merged onto the subprocess's environment,
    /// overriding on key conflicts.
    pub env_overlay: HashMap<String, String>,
    /// Token-bucket rate limiting. `None` disables rate limiting.
    pub rate_limit: Option<RateLimiterConfig>,
    /// Maximum number of token-cache entries retained at once.
    pub cache_size: usize,
    /// Maximum number of files sent to the analyzer in one `batch_parse`
    /// call before the bridge splits the request into chunks.
    pub batch_chunk_size: usize,
    /// Delay after spawning before the bridge considers the process ready
    /// to accept requests.
    pub startup_delay: Duration,
    /// Delay between requesting graceful shutdown and clearing state.
    pub shutdown_delay: Duration,
    /// Grace period before escalating from graceful to forceful
    /// termination during [`crate::process::ProcessHandle::kill`].
    pub kill_grace_period: Duration,
    /// Enable verbose analyzer-side debug logging via `set_debug`.
    pub debug: bool,
    /// Substrings matched against analyzer stderr lines. A matching line is
    /// a known benign warning (e.g. from the analyzer self-parsing) and is
    /// logged at `debug` level instead of being broadcast as
    /// [`crate::multiplexer::BridgeEvent::Stderr`].
    pub stderr_suppress_patterns: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            executable_path: "pike".to_string(),
            script_path: None,
            timeout: Duration::from_secs(30),
            env_overlay: HashMap::new(),
            rate_limit: None,
            cache_size: 50,
            batch_chunk_size: 50,
            startup_delay: Duration::from_millis(100),
            shutdown_delay: Duration::from_millis(50),
            kill_grace_period: Duration::from_secs(2),
            debug: false,
            stderr_suppress_patterns: Vec::new(),
        }
    }
}

/// Token-bucket rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Bucket capacity, i.e. the maximum burst size.
    pub max_requests: u32,
    /// Window, in seconds, over which `max_requests` fully refills.
    pub window_seconds: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.executable_path, "pike");
        assert!(config.script_path.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.rate_limit.is_none());
        assert_eq!(config.cache_size, 50);
        assert_eq!(config.batch_chunk_size, 50);
        assert!(config.stderr_suppress_patterns.is_empty());
    }

    #[test]
    fn default_rate_limiter_refills_ten_per_second() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_requests, 100);
        assert_eq!(config.window_seconds, 10);
    }
}
