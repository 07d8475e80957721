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

//! An out-of-process language-analysis bridge.
//!
//! Owns a long-lived analyzer subprocess and exposes a typed,
//! concurrency-safe request API over a newline-delimited JSON pipe, with
//! request/response correlation, in-flight deduplication, per-request
//! timeouts, response validation, rate limiting, and a bounded token cache.

/// Typed methods built on the bridge's generic request primitive.
pub mod api;
/// Bounded, timestamp-ordered cache of per-document token snapshots.
pub mod cache;
/// Bridge configuration.
pub mod config;
/// Auto-discovery of the analyzer's entry script.
pub mod discovery;
/// Error types returned by the bridge's public API.
pub mod error;
/// The request multiplexer: correlation, deduplication, dispatch.
pub mod multiplexer;
/// Owns the analyzer subprocess: piped stdio, line framing, lifecycle.
pub mod process;
/// Newline-delimited JSON wire types and framing.
pub mod protocol;
/// Token-bucket admission control.
pub mod rate_limiter;
/// Structural validation of untrusted analyzer responses.
pub mod validator;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use multiplexer::{Bridge, BridgeEvent};
