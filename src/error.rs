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

//! Error types for the analyzer bridge.

use thiserror::Error;

/// Errors that can occur while talking to the analyzer subprocess.
#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    /// The analyzer process could not be started.
    #[error("failed to spawn analyzer process: {message}")]
    SpawnFailure {
        /// Description of what went wrong.
        message: String,
    },

    /// A write was attempted against a dead or closed pipe.
    #[error("analyzer stdin is not writable")]
    NotWritable,

    /// No response arrived within the configured timeout.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The method that timed out.
        method: String,
        /// The configured timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// The subprocess exited while requests were pending.
    #[error("analyzer process exited{}", .code.map(|c| format!(" with code {c}")).unwrap_or_default())]
    ProcessExited {
        /// Exit code, if known.
        code: Option<i32>,
    },

    /// The subprocess returned an error envelope for a request.
    #[error("analyzer reported an error for '{method}': {message}")]
    RequestFailed {
        /// The method that failed.
        method: String,
        /// Error message returned by the analyzer.
        message: String,
    },

    /// The rate limiter denied admission for a request.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// A response violated the structural contract expected for its method.
    #[error("invalid response for '{method}': field '{field}' expected {expected}, got {actual}")]
    BridgeResponseError {
        /// The method whose response was malformed.
        method: String,
        /// The field that failed validation.
        field: String,
        /// A short description of the expected shape.
        expected: String,
        /// A bounded description of the actual value observed.
        actual: String,
    },

    /// `spawn` was called on a handle that is already running.
    #[error("analyzer process is already running")]
    AlreadySpawned,
}

/// Result type used throughout the bridge's public API.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Builds a [`BridgeError::BridgeResponseError`], truncating `actual` so
    /// a malformed payload can never blow up logging or error messages.
    #[must_use]
    pub fn response_shape(
        method: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: &serde_json::Value,
    ) -> Self {
        let mut actual = actual.to_string();
        const MAX_LEN: usize = 120;
        if actual.len() > MAX_LEN {
            actual.truncate(MAX_LEN);
            actual.push_str("...");
        }
        BridgeError::BridgeResponseError {
            method: method.into(),
            field: field.into(),
            expected: expected.into(),
            actual,
        }
    }
}
