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

//! Typed methods built on [`Bridge::send_request`]. Each wrapper pins down
//! the method name, builds `params`, and adapts the raw result into a typed
//! return value. The transport (timeouts, dedup, validation) is identical
//! for all of them; only the shape of the payload differs.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::multiplexer::{BatchMetrics, Bridge, ResponseData};
use crate::error::{BridgeError, BridgeResult};
use crate::validator::{ExpectedShape, FieldAssertion, Validator};

/// A symbol reported by `parse`.
#[derive(Debug, Clone, Deserialize)]
pub struct Symbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's kind, e.g. `"variable"` or `"function"`.
    pub kind: String,
}

/// A diagnostic reported by `parse`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerDiagnostic {
    /// Human-readable diagnostic message.
    pub message: String,
    /// Line number, 1-indexed.
    pub line: u32,
}

/// Result of [`parse`].
#[derive(Debug, Clone, Deserialize)]
pub struct ParseResult {
    /// Top-level symbols discovered in the file.
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    /// Diagnostics produced while parsing.
    #[serde(default)]
    pub diagnostics: Vec<AnalyzerDiagnostic>,
}

/// Parses `code` as if it were the contents of `filename`.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn parse(bridge: &Bridge, code: &str, filename: &str) -> BridgeResult<ParseResult> {
    let response = bridge
        .send_request("parse", json!({"code": code, "filename": filename}), None)
        .await?;
    decode(&response)
}

/// Result of [`tokenize`].
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizeResult {
    /// The token sequence, in source order.
    pub tokens: Vec<String>,
}

/// Tokenizes `code`.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn tokenize(bridge: &Bridge, code: &str) -> BridgeResult<TokenizeResult> {
    let response = bridge
        .send_request("tokenize", json!({"code": code}), None)
        .await?;
    decode(&response)
}

/// Result of [`resolve_include`]. `exists` accepts either a JSON boolean or
/// a `0`/`1` integer on the wire, since the analyzer's native boolean
/// encoding is not consistent across call sites.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveIncludeResult {
    /// Whether the include target was found.
    #[serde(deserialize_with = "deserialize_loose_bool")]
    pub exists: bool,
    /// Resolved absolute path, if found.
    pub resolved_path: Option<String>,
}

fn deserialize_loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        other => Err(serde::de::Error::custom(format!(
            "expected bool or 0/1, got {other}"
        ))),
    }
}

/// Resolves an `#include` directive relative to `from_file`.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn resolve_include(
    bridge: &Bridge,
    include: &str,
    from_file: &str,
) -> BridgeResult<ResolveIncludeResult> {
    let response = bridge
        .send_request(
            "resolve_include",
            json!({"include": include, "from_file": from_file}),
            None,
        )
        .await?;
    decode(&response)
}

/// Result of [`get_pike_paths`].
#[derive(Debug, Clone, Deserialize)]
pub struct PikePaths {
    /// Configured include search paths.
    pub include_paths: Vec<String>,
    /// Configured module search paths.
    pub module_paths: Vec<String>,
}

/// Fetches the analyzer's configured search paths. Validated: this is the
/// call where a missing array has historically surfaced as the number `0`.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn get_pike_paths(bridge: &Bridge) -> BridgeResult<PikePaths> {
    let validator = Validator::new(
        "get_pike_paths",
        vec![
            FieldAssertion {
                field: "include_paths",
                expected: ExpectedShape::StringArray,
            },
            FieldAssertion {
                field: "module_paths",
                expected: ExpectedShape::StringArray,
            },
        ],
    );
    let response = bridge
        .send_request("get_pike_paths", Value::Null, Some(&validator))
        .await?;
    decode(&response)
}

/// Result of [`analyze`]: a caller-defined analysis result plus any
/// per-sub-operation failures the analyzer reported alongside it.
#[derive(Debug, Clone)]
pub struct AnalyzeResult {
    /// The raw analysis result.
    pub result: Value,
    /// Sub-operation failures, if any were reported.
    pub failures: Option<Value>,
}

/// Runs a named domain-specific analysis over `code`.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn analyze(bridge: &Bridge, analysis: &str, code: &str) -> BridgeResult<AnalyzeResult> {
    let response = bridge
        .send_request("analyze", json!({"analysis": analysis, "code": code}), None)
        .await?;
    Ok(AnalyzeResult {
        result: response.result,
        failures: response.failures,
    })
}

/// Enables or disables verbose analyzer-side debug logging.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn set_debug(bridge: &Bridge, enabled: bool) -> BridgeResult<()> {
    bridge
        .send_request("set_debug", json!({"enabled": enabled}), None)
        .await?;
    Ok(())
}

/// Result of [`get_version`].
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    /// Analyzer version string.
    pub version: String,
}

/// Fetches the analyzer's reported version (distinct from
/// [`Bridge::health_check`], which invokes the executable directly).
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn get_version(bridge: &Bridge) -> BridgeResult<VersionInfo> {
    let response = bridge.send_request("get_version", Value::Null, None).await?;
    decode(&response)
}

/// Result of [`get_cache_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of entries currently cached.
    pub entries: usize,
}

/// Returns token-cache occupancy (bridge-local; not round-tripped through
/// the analyzer).
pub async fn get_cache_stats(bridge: &Bridge) -> CacheStats {
    CacheStats {
        entries: bridge.cache().lock().await.len(),
    }
}

/// Invalidates the cached tokenization for `uri`.
pub async fn invalidate_cache(bridge: &Bridge, uri: &str) {
    bridge.cache().lock().await.invalidate(uri);
}

/// A single file submitted to [`batch_parse`].
pub struct BatchFile {
    /// The file's path, as reported to the analyzer.
    pub filename: String,
    /// The file's contents.
    pub code: String,
}

/// Parses many files in one logical call, transparently splitting the
/// request into chunks of [`crate::config::BridgeConfig::batch_chunk_size`]
/// files each and concatenating the results.
///
/// # Errors
///
/// Returns the first chunk failure encountered; earlier chunks' results are
/// discarded.
pub async fn batch_parse(bridge: &Bridge, files: Vec<BatchFile>) -> BridgeResult<Vec<ParseResult>> {
    let call_start = std::time::Instant::now();
    let chunk_size = bridge.batch_chunk_size().max(1);

    let chunking_start = std::time::Instant::now();
    let chunks: Vec<&[BatchFile]> = files.chunks(chunk_size).collect();
    let chunking_ms = u64::try_from(chunking_start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut results = Vec::with_capacity(files.len());
    let mut ipc_ms = 0u64;

    for chunk in &chunks {
        let payload: Vec<Value> = chunk
            .iter()
            .map(|f| json!({"filename": f.filename, "code": f.code}))
            .collect();

        let ipc_start = std::time::Instant::now();
        let response = bridge
            .send_request("batch_parse", json!({"files": payload}), None)
            .await?;
        ipc_ms += u64::try_from(ipc_start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let parsed: Vec<ParseResult> = decode(&response)?;
        results.extend(parsed);
    }

    bridge
        .record_batch_metrics(BatchMetrics {
            total_ms: u64::try_from(call_start.elapsed().as_millis()).unwrap_or(u64::MAX),
            chunking_ms,
            ipc_ms,
            chunk_count: u64::try_from(chunks.len()).unwrap_or(u64::MAX),
            file_count: u64::try_from(files.len()).unwrap_or(u64::MAX),
        })
        .await;

    Ok(results)
}

/// Completion context used by the LSP layer to drive suggestions.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionContext {
    /// Token sequence surrounding the cursor.
    pub split_tokens: Vec<String>,
}

/// Fetches completion context for `uri` at `version`, consulting (and
/// maintaining) the token cache. If a cached request fails for any reason,
/// transparently falls back to full tokenization and refreshes the cache.
///
/// # Errors
///
/// See [`BridgeError`].
pub async fn get_completion_context_cached(
    bridge: &Bridge,
    uri: &str,
    version: i64,
    code: &str,
    position: u32,
) -> BridgeResult<CompletionContext> {
    let cached = bridge.cache().lock().await.get(uri, version).cloned();

    if let Some(entry) = cached {
        let params = json!({
            "uri": uri,
            "version": version,
            "position": position,
            "cached_tokens": entry.split_tokens,
        });
        let cached_result = bridge
            .send_request("get_completion_context_cached", params, None)
            .await;
        if let Ok(response) = cached_result {
            return decode(&response);
        }
        // Cached variant failed; fall through to full tokenization.
    }

    let params = json!({"uri": uri, "version": version, "position": position, "code": code});
    let response = bridge
        .send_request("get_completion_context", params, None)
        .await?;
    let context: CompletionContext = decode(&response)?;

    bridge
        .cache()
        .lock()
        .await
        .put(uri.to_string(), version, context.split_tokens.clone());

    Ok(context)
}

fn decode<T: serde::de::DeserializeOwned>(response: &ResponseData) -> BridgeResult<T> {
    serde_json::from_value(response.result.clone()).map_err(|e| BridgeError::BridgeResponseError {
        method: String::new(),
        field: "result".to_string(),
        expected: "a value matching the expected shape".to_string(),
        actual: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_bool_accepts_integer_zero_or_one() {
        let value: ResolveIncludeResult =
            serde_json::from_value(json!({"exists": 1, "resolved_path": null})).unwrap();
        assert!(value.exists);

        let value: ResolveIncludeResult =
            serde_json::from_value(json!({"exists": 0, "resolved_path": null})).unwrap();
        assert!(!value.exists);
    }

    #[test]
    fn loose_bool_accepts_literal_boolean() {
        let value: ResolveIncludeResult =
            serde_json::from_value(json!({"exists": true, "resolved_path": "/a.pike"})).unwrap();
        assert!(value.exists);
        assert_eq!(value.resolved_path.as_deref(), Some("/a.pike"));
    }
}
