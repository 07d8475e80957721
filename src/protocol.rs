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

//! Newline-delimited JSON wire types and framing.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

fn default_null() -> serde_json::Value {
    serde_json::Value::Null
}

/// A request envelope written to the analyzer's stdin.
#[derive(Debug, Serialize, Clone)]
pub struct RequestEnvelope {
    pub id: i64,
    pub method: String,
    pub params: serde_json::Value,
}

/// A response envelope read from the analyzer's stdout.
#[derive(Debug, Deserialize, Clone)]
pub struct ResponseEnvelope {
    pub id: i64,
    #[serde(default = "default_null")]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<ResponseErrorBody>,
    #[serde(default)]
    pub failures: Option<serde_json::Value>,
    #[serde(rename = "_perf", default)]
    pub perf: Option<serde_json::Value>,
}

/// The `error` field of a [`ResponseEnvelope`].
#[derive(Debug, Deserialize, Clone)]
pub struct ResponseErrorBody {
    pub code: i64,
    pub message: String,
}

/// Serializes a request as a single NDJSON line, including the trailing
/// newline the wire protocol requires.
pub fn encode_request(request: &RequestEnvelope) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

/// Scans `buffer` for a complete line terminated by `\n` (optionally
/// preceded by `\r`), returning the line with its terminator stripped and
/// advancing the buffer past it. Returns `None` if no complete line is
/// buffered yet; partial lines are left untouched so a subsequent read can
/// append to them.
pub fn try_parse_line(buffer: &mut BytesMut) -> Option<String> {
    let newline_pos = buffer.iter().position(|&b| b == b'\n')?;
    let mut line_bytes = buffer.split_to(newline_pos + 1);
    line_bytes.truncate(newline_pos); // drop the '\n'
    if line_bytes.last() == Some(&b'\r') {
        let len = line_bytes.len();
        line_bytes.truncate(len - 1);
    }
    Some(String::from_utf8_lossy(&line_bytes).into_owned())
}

/// Canonicalizes `(method, params)` into a stable fingerprint used for
/// in-flight deduplication. Relies on `serde_json` serializing objects via
/// its default `BTreeMap` representation (the `preserve_order` feature is
/// not enabled), so two callers building logically identical params in a
/// different field order still produce the same fingerprint.
#[must_use]
pub fn fingerprint(method: &str, params: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    format!("{method}:{canonical}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line() {
        let mut buffer = BytesMut::from("{\"id\":1}\n");
        let line = try_parse_line(&mut buffer).unwrap();
        assert_eq!(line, "{\"id\":1}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn leaves_partial_line_buffered() {
        let mut buffer = BytesMut::from("{\"id\":1");
        assert!(try_parse_line(&mut buffer).is_none());
        assert_eq!(&buffer[..], b"{\"id\":1");
    }

    #[test]
    fn strips_crlf_terminator() {
        let mut buffer = BytesMut::from("{\"id\":1}\r\n");
        let line = try_parse_line(&mut buffer).unwrap();
        assert_eq!(line, "{\"id\":1}");
    }

    #[test]
    fn parses_multiple_lines_in_one_buffer() {
        let mut buffer = BytesMut::from("{\"id\":1}\n{\"id\":2}\n");
        let first = try_parse_line(&mut buffer).unwrap();
        let second = try_parse_line(&mut buffer).unwrap();
        assert_eq!(first, "{\"id\":1}");
        assert_eq!(second, "{\"id\":2}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn reassembles_a_line_split_across_reads() {
        let mut buffer = BytesMut::from("{\"id\":");
        assert!(try_parse_line(&mut buffer).is_none());
        buffer.extend_from_slice(b"1}\n");
        let line = try_parse_line(&mut buffer).unwrap();
        assert_eq!(line, "{\"id\":1}");
    }

    #[test]
    fn fingerprint_is_stable_regardless_of_field_order() {
        let a = serde_json::json!({"code": "int x;", "filename": "t.pike"});
        let b = serde_json::json!({"filename": "t.pike", "code": "int x;"});
        assert_eq!(fingerprint("parse", &a), fingerprint("parse", &b));
    }

    #[test]
    fn fingerprint_differs_on_method() {
        let params = serde_json::json!({"a": 1});
        assert_ne!(
            fingerprint("parse", &params),
            fingerprint("tokenize", &params)
        );
    }

    #[test]
    fn response_error_deserializes() {
        let json = r#"{"id":1,"error":{"code":-1,"message":"boom"}}"#;
        let response: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().message, "boom");
    }

    #[test]
    fn response_with_perf_and_failures() {
        let json = r#"{"id":1,"result":{"ok":true},"failures":{"x":"y"},"_perf":{"ms":5}}"#;
        let response: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(response.result["ok"], serde_json::json!(true));
        assert!(response.failures.is_some());
        assert!(response.perf.is_some());
    }
}
