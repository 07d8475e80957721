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

#![allow(clippy::print_stdout, reason = "the --version probe prints to stdout by design")]
#![allow(clippy::print_stderr, reason = "simulates analyzer stderr output for suppression tests")]

//! A configurable mock analyzer for integration testing.
//!
//! Speaks the bridge's newline-delimited JSON protocol over stdin/stdout.
//! CLI flags control timing and failure modes. No tokio — uses
//! `std::thread` the same way the bridge's own mock LSP server does.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use serde_json::{Value, json};

/// Mock analyzer for integration testing.
///
/// `Bridge::start` always invokes the analyzer executable with exactly one
/// positional argument (the entry script path), so a harness spawning this
/// binary through a real [`catenary_bridge::Bridge`] cannot also pass CLI
/// flags. `MOCK_ANALYZER_*` environment variables, merged in after parsing,
/// are the channel such a harness uses instead; the flags below remain for
/// direct manual invocation.
#[derive(Parser, Debug)]
#[command(name = "mock_analyzer")]
struct Args {
    /// The analyzer entry script path passed by the bridge. Accepted and
    /// ignored; the mock has no script of its own to load.
    script: Option<String>,

    /// If present, print a version string and exit instead of entering the
    /// NDJSON loop.
    #[arg(long)]
    version: bool,

    /// Sleep before every response (milliseconds).
    #[arg(long, default_value_t = 0)]
    response_delay: u64,

    /// Never respond to this method (repeatable).
    #[arg(long)]
    hang_on: Vec<String>,

    /// Return an error response for this method (repeatable).
    #[arg(long)]
    fail_on: Vec<String>,

    /// Close stdout after n responses (simulate a crash).
    #[arg(long)]
    drop_after: Option<u64>,

    /// Lines to print to stderr once at startup (repeatable).
    #[arg(long)]
    stderr_line: Vec<String>,
}

impl Args {
    /// Merges `MOCK_ANALYZER_*` environment variables on top of whatever was
    /// parsed from argv, so a harness limited to a single positional
    /// argument (see [`Args`]) can still drive every scenario.
    fn merge_env(mut self) -> Self {
        if let Ok(v) = std::env::var("MOCK_ANALYZER_HANG_ON") {
            self.hang_on.extend(v.split(',').filter(|s| !s.is_empty()).map(str::to_string));
        }
        if let Ok(v) = std::env::var("MOCK_ANALYZER_FAIL_ON") {
            self.fail_on.extend(v.split(',').filter(|s| !s.is_empty()).map(str::to_string));
        }
        if let Ok(v) = std::env::var("MOCK_ANALYZER_RESPONSE_DELAY_MS") {
            if let Ok(ms) = v.parse() {
                self.response_delay = ms;
            }
        }
        if let Ok(v) = std::env::var("MOCK_ANALYZER_DROP_AFTER") {
            if let Ok(n) = v.parse() {
                self.drop_after = Some(n);
            }
        }
        if let Ok(v) = std::env::var("MOCK_ANALYZER_STDERR_LINES") {
            self.stderr_line.extend(v.split(',').filter(|s| !s.is_empty()).map(str::to_string));
        }
        self
    }
}

/// Writes the configured `--stderr-line`/`MOCK_ANALYZER_STDERR_LINES` lines
/// once at startup, simulating an analyzer that logs to stderr before
/// responding to anything.
fn emit_startup_stderr(args: &Args) {
    for line in &args.stderr_line {
        eprintln!("{line}");
    }
}

/// Simulates an analyzer crash independent of request/response traffic:
/// exits the process unconditionally after `MOCK_ANALYZER_EXIT_AFTER_MS`.
fn spawn_crash_timer() {
    if let Ok(v) = std::env::var("MOCK_ANALYZER_EXIT_AFTER_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(ms));
                std::process::exit(1);
            });
        }
    }
}

/// An incoming request envelope.
#[derive(Debug, Deserialize)]
struct Request {
    id: i64,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Thread-safe writer handle, mirroring the bridge's own mock server.
type Writer = Arc<Mutex<Box<dyn Write + Send>>>;

fn stdout_writer() -> Writer {
    Arc::new(Mutex::new(Box::new(std::io::stdout())))
}

#[cfg(test)]
fn buffer_writer() -> (Writer, Arc<Mutex<Vec<u8>>>) {
    let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
    let writer: Box<dyn Write + Send> = Box::new(SharedVecWriter(buf.clone()));
    (Arc::new(Mutex::new(writer)), buf)
}

#[cfg(test)]
struct SharedVecWriter(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Write for SharedVecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Shared state for the mock analyzer.
struct MockAnalyzer {
    args: Args,
    writer: Writer,
    response_count: u64,
    debug: bool,
    token_caches: HashMap<String, Vec<String>>,
    next_synthetic_id: Arc<AtomicU64>,
}

impl MockAnalyzer {
    fn new(args: Args, writer: Writer) -> Self {
        Self {
            args,
            writer,
            response_count: 0,
            debug: false,
            token_caches: HashMap::new(),
            next_synthetic_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn run(&mut self, reader: &mut dyn Read) {
        let mut buffer = Vec::new();
        let mut temp = [0u8; 4096];

        loop {
            match reader.read(&mut temp) {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
            }

            while let Some((line, consumed)) = try_parse_line(&buffer) {
                buffer.drain(..consumed);
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(request) = serde_json::from_str::<Request>(&line) else {
                    continue;
                };
                self.handle_request(request);
            }
        }
    }

    fn handle_request(&mut self, request: Request) {
        let Request { id, method, params } = request;

        if self.args.hang_on.iter().any(|m| m == &method) {
            return;
        }

        if self.args.response_delay > 0 {
            std::thread::sleep(Duration::from_millis(self.args.response_delay));
        }

        if self.args.fail_on.iter().any(|m| m == &method) {
            self.send_error(id, format!("mock_analyzer: configured to fail on {method}"));
            return;
        }

        match method.as_str() {
            "parse" => {
                let result = self.handle_parse(&params);
                self.send_result(id, result, None, None);
            }
            "tokenize" => {
                let result = Self::handle_tokenize(&params);
                self.send_result(id, result, None, None);
            }
            "resolve_include" => {
                let result = Self::handle_resolve_include(&params);
                self.send_result(id, result, None, None);
            }
            "get_pike_paths" => {
                self.send_result(id, Self::handle_pike_paths(), None, None);
            }
            "analyze" => {
                let (result, failures) = Self::handle_analyze(&params);
                self.send_result(id, result, failures, None);
            }
            "batch_parse" => {
                let result = self.handle_batch_parse(&params);
                self.send_result(id, result, None, None);
            }
            "get_completion_context" => {
                let result = self.handle_completion_context(&params);
                self.send_result(id, result, None, None);
            }
            "get_completion_context_cached" => {
                let result = Self::handle_completion_context_cached(&params);
                self.send_result(id, result, None, None);
            }
            "set_debug" => {
                self.debug = params.get("enabled").and_then(Value::as_bool).unwrap_or(false);
                self.send_result(id, Value::Null, None, None);
            }
            "get_version" => {
                self.send_result(id, json!({"version": "mock-analyzer-1.0"}), None, None);
            }
            _ => {
                self.send_error(id, format!("mock_analyzer: method not found: {method}"));
            }
        }
    }

    fn handle_parse(&self, params: &Value) -> Value {
        let code = params.get("code").and_then(Value::as_str).unwrap_or("");
        let symbols: Vec<Value> = code
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let trimmed = line.trim_start();
                trimmed.strip_prefix("void ").or_else(|| trimmed.strip_prefix("int ")).map(|rest| {
                    let name: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
                    let _ = idx;
                    json!({"name": name, "kind": "function"})
                })
            })
            .collect();
        json!({"symbols": symbols, "diagnostics": []})
    }

    fn handle_tokenize(params: &Value) -> Value {
        let code = params.get("code").and_then(Value::as_str).unwrap_or("");
        let tokens: Vec<&str> = code.split_whitespace().collect();
        json!({"tokens": tokens})
    }

    fn handle_resolve_include(params: &Value) -> Value {
        let include = params.get("include").and_then(Value::as_str).unwrap_or("");
        if include.is_empty() {
            json!({"exists": false, "resolved_path": null})
        } else {
            json!({"exists": true, "resolved_path": format!("/pike-scripts/{include}")})
        }
    }

    fn handle_pike_paths() -> Value {
        json!({
            "include_paths": ["/usr/share/pike/include"],
            "module_paths": ["/usr/share/pike/modules"],
        })
    }

    fn handle_analyze(params: &Value) -> (Value, Option<Value>) {
        let analysis = params.get("analysis").and_then(Value::as_str).unwrap_or("");
        (json!({"analysis": analysis, "findings": []}), None)
    }

    fn handle_batch_parse(&self, params: &Value) -> Value {
        let files = params.get("files").and_then(Value::as_array).cloned().unwrap_or_default();
        let results: Vec<Value> = files.iter().map(|f| self.handle_parse(f)).collect();
        Value::Array(results)
    }

    fn handle_completion_context(&mut self, params: &Value) -> Value {
        let uri = params.get("uri").and_then(Value::as_str).unwrap_or("").to_string();
        let code = params.get("code").and_then(Value::as_str).unwrap_or("");
        let tokens: Vec<String> = code.split_whitespace().map(str::to_string).collect();
        self.token_caches.insert(uri, tokens.clone());
        json!({"split_tokens": tokens})
    }

    fn handle_completion_context_cached(params: &Value) -> Value {
        let cached = params
            .get("cached_tokens")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        json!({"split_tokens": cached})
    }

    fn send_result(&mut self, id: i64, result: Value, failures: Option<Value>, perf: Option<Value>) {
        let mut envelope = json!({"id": id, "result": result});
        if let Some(failures) = failures {
            envelope["failures"] = failures;
        }
        if let Some(perf) = perf {
            envelope["_perf"] = perf;
        }
        self.write_envelope(&envelope);
    }

    fn send_error(&mut self, id: i64, message: String) {
        let envelope = json!({
            "id": id,
            "result": null,
            "error": {"code": -32000, "message": message},
        });
        self.write_envelope(&envelope);
    }

    fn write_envelope(&mut self, envelope: &Value) {
        let Ok(mut line) = serde_json::to_string(envelope) else {
            return;
        };
        line.push('\n');
        {
            let Ok(mut w) = self.writer.lock() else { return };
            let _ = w.write_all(line.as_bytes());
            let _ = w.flush();
        }

        self.response_count += 1;
        if let Some(max) = self.args.drop_after
            && self.response_count >= max
        {
            std::process::exit(1);
        }
        let _ = self.next_synthetic_id.load(Ordering::SeqCst);
    }
}

/// Scans `buffer` for a complete newline-terminated line. Returns the line
/// (CRLF-stripped) and the number of bytes consumed, mirroring
/// [`catenary_bridge::protocol::try_parse_line`] but operating on a plain
/// byte buffer rather than `bytes::BytesMut`.
fn try_parse_line(buffer: &[u8]) -> Option<(String, usize)> {
    let newline_at = buffer.iter().position(|&b| b == b'\n')?;
    let mut end = newline_at;
    if end > 0 && buffer[end - 1] == b'\r' {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buffer[..end]).into_owned();
    Some((line, newline_at + 1))
}

fn main() {
    let args = Args::parse().merge_env();
    if args.version {
        println!("mock-analyzer-1.0");
        return;
    }

    spawn_crash_timer();
    emit_startup_stderr(&args);
    let writer = stdout_writer();
    let mut analyzer = MockAnalyzer::new(args, writer);
    let mut stdin = std::io::stdin().lock();
    analyzer.run(&mut stdin);
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Tests use expect/unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn default_args() -> Args {
        Args {
            script: None,
            version: false,
            response_delay: 0,
            hang_on: vec![],
            fail_on: vec![],
            drop_after: None,
            stderr_line: vec![],
        }
    }

    fn frame(value: &Value) -> Vec<u8> {
        let mut line = value.to_string();
        line.push('\n');
        line.into_bytes()
    }

    fn extract_messages(data: &[u8]) -> Vec<Value> {
        let mut messages = Vec::new();
        let mut buf = data.to_vec();
        while let Some((line, consumed)) = try_parse_line(&buf) {
            if let Ok(v) = serde_json::from_str::<Value>(&line) {
                messages.push(v);
            }
            buf.drain(..consumed);
        }
        messages
    }

    fn run_with(args: Args, input: &[u8]) -> Vec<Value> {
        let (writer, buf) = buffer_writer();
        let mut analyzer = MockAnalyzer::new(args, writer);
        let mut reader = std::io::Cursor::new(input.to_vec());
        analyzer.run(&mut reader);
        let data = buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        extract_messages(&data)
    }

    #[test]
    fn tokenize_splits_on_whitespace() {
        let request = json!({"id": 1, "method": "tokenize", "params": {"code": "int x = 1;"}});
        let messages = run_with(default_args(), &frame(&request));

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["id"], 1);
        let tokens = messages[0]["result"]["tokens"].as_array().expect("tokens array");
        assert_eq!(tokens, &vec![json!("int"), json!("x"), json!("="), json!("1;")]);
    }

    #[test]
    fn parse_extracts_function_symbols() {
        let request = json!({"id": 2, "method": "parse", "params": {"code": "void main() {}\n", "filename": "a.pike"}});
        let messages = run_with(default_args(), &frame(&request));

        let symbols = messages[0]["result"]["symbols"].as_array().expect("symbols array");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0]["name"], "main");
    }

    #[test]
    fn fail_on_returns_error_envelope() {
        let mut args = default_args();
        args.fail_on = vec!["tokenize".to_string()];
        let request = json!({"id": 3, "method": "tokenize", "params": {"code": ""}});
        let messages = run_with(args, &frame(&request));

        assert!(messages[0]["result"].is_null());
        assert_eq!(messages[0]["error"]["code"], -32000);
    }

    #[test]
    fn hang_on_produces_no_response() {
        let mut args = default_args();
        args.hang_on = vec!["tokenize".to_string()];
        let request = json!({"id": 4, "method": "tokenize", "params": {"code": "x"}});
        let messages = run_with(args, &frame(&request));

        assert!(messages.is_empty());
    }

    #[test]
    fn unknown_method_returns_method_not_found_error() {
        let request = json!({"id": 5, "method": "not_a_real_method", "params": {}});
        let messages = run_with(default_args(), &frame(&request));

        assert!(messages[0]["error"]["message"]
            .as_str()
            .unwrap_or("")
            .contains("method not found"));
    }

    #[test]
    fn resolve_include_reports_missing_target() {
        let request = json!({"id": 6, "method": "resolve_include", "params": {"include": "", "from_file": "a.pike"}});
        let messages = run_with(default_args(), &frame(&request));

        assert_eq!(messages[0]["result"]["exists"], false);
    }

    #[test]
    fn line_split_across_two_reads_still_parses() {
        let request = json!({"id": 7, "method": "get_version", "params": {}});
        let mut line = request.to_string();
        line.push('\n');
        let bytes = line.into_bytes();
        let (first, second) = bytes.split_at(bytes.len() / 2);

        let (writer, buf) = buffer_writer();
        let mut analyzer = MockAnalyzer::new(default_args(), writer);
        let mut combined = Vec::new();
        combined.extend_from_slice(first);
        combined.extend_from_slice(second);
        let mut reader = std::io::Cursor::new(combined);
        analyzer.run(&mut reader);

        let data = buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let messages = extract_messages(&data);
        assert_eq!(messages[0]["result"]["version"], "mock-analyzer-1.0");
    }
}
