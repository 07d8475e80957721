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

//! The request multiplexer: owns correlation, deduplication, timeouts, and
//! dispatch between callers and the analyzer subprocess.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::cache::TokenCache;
use crate::config::BridgeConfig;
use crate::discovery;
use crate::error::{BridgeError, BridgeResult};
use crate::process::{ProcessEvent, ProcessHandle};
use crate::protocol::{self, RequestEnvelope};
use crate::rate_limiter::RateLimiter;
use crate::validator::Validator;

/// The settled outcome of a single request, shared verbatim across
/// deduplicated callers.
pub type BridgeOutcome = Result<ResponseData, BridgeError>;

/// A successfully-parsed analyzer response.
#[derive(Debug, Clone)]
pub struct ResponseData {
    /// The `result` field of the response envelope.
    pub result: Value,
    /// The optional `_perf` timing metadata, passed through unmodified.
    pub perf: Option<Value>,
    /// The optional `failures` field carried by `analyze`-style responses.
    pub failures: Option<Value>,
}

/// Lifecycle events a host can subscribe to.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The analyzer process was started.
    Started,
    /// The analyzer process was stopped by request.
    Stopped,
    /// The analyzer process exited, with its exit code if known.
    Close(Option<i32>),
    /// A line of analyzer stderr output (or a non-JSON stdout line).
    Stderr(String),
}

/// Result of [`Bridge::health_check`]. Healthy requires the script to
/// exist, the executable to report a version, and no prior transport
/// failure on record.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the analyzer script file exists on disk.
    pub script_exists: bool,
    /// Version string reported by `<executable> --version`, if it ran.
    pub executable_version: Option<String>,
    /// Overall pass/fail.
    pub healthy: bool,
    /// Explanation when `healthy` is false.
    pub error: Option<String>,
}

/// Cumulative metrics for `batch_parse` calls, drained by
/// [`Bridge::drain_batch_metrics`].
#[derive(Debug, Clone, Default)]
pub struct BatchMetrics {
    /// Total wall-clock time spent in `batch_parse`, across all calls.
    pub total_ms: u64,
    /// Time spent splitting the input into chunks.
    pub chunking_ms: u64,
    /// Time spent waiting on the analyzer across all chunk requests.
    pub ipc_ms: u64,
    /// Number of chunks sent.
    pub chunk_count: u64,
    /// Number of files processed.
    pub file_count: u64,
}

struct InFlightEntry {
    sender: broadcast::Sender<Arc<BridgeOutcome>>,
}

/// Owns the analyzer subprocess and multiplexes concurrent requests over it.
pub struct Bridge {
    config: BridgeConfig,
    process: Arc<Mutex<Option<ProcessHandle>>>,
    started: Arc<AtomicBool>,
    next_id: AtomicI64,
    pending: Arc<Mutex<HashMap<i64, oneshot::Sender<BridgeOutcome>>>>,
    in_flight: Arc<Mutex<HashMap<String, InFlightEntry>>>,
    rate_limiter: Arc<Mutex<Option<RateLimiter>>>,
    cache: Arc<Mutex<TokenCache>>,
    events: broadcast::Sender<BridgeEvent>,
    dispatch_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    batch_metrics: Arc<Mutex<BatchMetrics>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Bridge {
    /// Builds an unstarted bridge from `config`. The analyzer process is
    /// not spawned until the first request (or an explicit [`Bridge::start`]).
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let rate_limiter = config.rate_limit.map(RateLimiter::new);
        let cache = TokenCache::new(config.cache_size);
        let (events, _rx) = broadcast::channel(64);
        Self {
            config,
            process: Arc::new(Mutex::new(None)),
            started: Arc::new(AtomicBool::new(false)),
            next_id: AtomicI64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),
            cache: Arc::new(Mutex::new(cache)),
            events,
            dispatch_task: Arc::new(Mutex::new(None)),
            batch_metrics: Arc::new(Mutex::new(BatchMetrics::default())),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribes to bridge lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Whether the analyzer process is currently running.
    pub async fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
            && self
                .process
                .lock()
                .await
                .as_ref()
                .is_some_and(ProcessHandle::is_alive)
    }

    /// Spawns the analyzer process if it is not already running. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SpawnFailure`] if the process cannot be
    /// started.
    pub async fn start(&self) -> BridgeResult<()> {
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let script_path = self
            .config
            .script_path
            .clone()
            .unwrap_or_else(|| discovery::discover_script_path(&discovery::current_exe_dir()));
        let args = vec![script_path.to_string_lossy().into_owned()];

        let mut handle = ProcessHandle::new();
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        if let Err(e) = handle
            .spawn(
                &self.config.executable_path,
                &args,
                &self.config.env_overlay,
                process_tx,
            )
            .await
        {
            *self.last_error.lock().await = Some(e.to_string());
            return Err(e);
        }

        *self.process.lock().await = Some(handle);
        self.started.store(true, Ordering::SeqCst);

        let dispatch = tokio::spawn(Self::dispatch_loop(
            process_rx,
            self.pending.clone(),
            self.in_flight.clone(),
            self.started.clone(),
            self.events.clone(),
            self.config.stderr_suppress_patterns.clone(),
            self.last_error.clone(),
        ));
        *self.dispatch_task.lock().await = Some(dispatch);

        *self.last_error.lock().await = None;
        let _ = self.events.send(BridgeEvent::Started);
        tokio::time::sleep(self.config.startup_delay).await;
        debug!("analyzer started");
        Ok(())
    }

    /// Stops the analyzer process if running. Idempotent.
    pub async fn stop(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        if let Some(mut handle) = self.process.lock().await.take() {
            handle.kill(self.config.kill_grace_period).await;
        }
        tokio::time::sleep(self.config.shutdown_delay).await;
        self.started.store(false, Ordering::SeqCst);
        self.pending.lock().await.clear();
        self.in_flight.lock().await.clear();
        if let Some(task) = self.dispatch_task.lock().await.take() {
            task.abort();
        }
        let _ = self.events.send(BridgeEvent::Stopped);
        debug!("analyzer stopped");
    }

    async fn dispatch_loop(
        mut process_rx: mpsc::UnboundedReceiver<ProcessEvent>,
        pending: Arc<Mutex<HashMap<i64, oneshot::Sender<BridgeOutcome>>>>,
        in_flight: Arc<Mutex<HashMap<String, InFlightEntry>>>,
        started: Arc<AtomicBool>,
        events: broadcast::Sender<BridgeEvent>,
        stderr_suppress_patterns: Vec<String>,
        last_error: Arc<Mutex<Option<String>>>,
    ) {
        while let Some(event) = process_rx.recv().await {
            match event {
                ProcessEvent::Message(line) => {
                    Self::dispatch_message(&line, &pending).await;
                }
                ProcessEvent::Stderr(text) => {
                    if let Some(pattern) = stderr_suppress_patterns
                        .iter()
                        .find(|pattern| text.contains(pattern.as_str()))
                    {
                        debug!("suppressed analyzer stderr line (matched '{}'): {}", pattern, text);
                    } else {
                        let _ = events.send(BridgeEvent::Stderr(text));
                    }
                }
                ProcessEvent::Exit(code) => {
                    started.store(false, Ordering::SeqCst);
                    let mut pending = pending.lock().await;
                    for (_, sender) in pending.drain() {
                        let _ = sender.send(Err(BridgeError::ProcessExited { code }));
                    }
                    drop(pending);
                    in_flight.lock().await.clear();
                    *last_error.lock().await = Some(
                        BridgeError::ProcessExited { code }.to_string(),
                    );
                    let _ = events.send(BridgeEvent::Close(code));
                    break;
                }
            }
        }
    }

    async fn dispatch_message(
        line: &str,
        pending: &Arc<Mutex<HashMap<i64, oneshot::Sender<BridgeOutcome>>>>,
    ) {
        let envelope: protocol::ResponseEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("malformed analyzer response, dropping: {}", e);
                return;
            }
        };

        let mut pending = pending.lock().await;
        let Some(sender) = pending.remove(&envelope.id) else {
            // Late response for a timed-out (or never-issued) request.
            warn!("response for unknown request id {}", envelope.id);
            return;
        };
        drop(pending);

        let outcome = if let Some(error) = envelope.error {
            Err(BridgeError::RequestFailed {
                method: String::new(),
                message: error.message,
            })
        } else {
            Ok(ResponseData {
                result: envelope.result,
                perf: envelope.perf,
                failures: envelope.failures,
            })
        };
        let _ = sender.send(outcome);
    }

    async fn write_line(&self, line: &str) -> BridgeResult<()> {
        let guard = self.process.lock().await;
        let handle = guard.as_ref().ok_or(BridgeError::NotWritable)?;
        handle.send(line).await
    }

    /// Sends a typed request to the analyzer, applying rate limiting,
    /// in-flight deduplication, and an optional response validator.
    ///
    /// # Errors
    ///
    /// See [`BridgeError`] for the full set of failure modes.
    pub async fn send_request(
        &self,
        method: &str,
        params: Value,
        validator: Option<&Validator>,
    ) -> BridgeResult<ResponseData> {
        if let Some(limiter) = self.rate_limiter.lock().await.as_mut()
            && !limiter.try_acquire()
        {
            return Err(BridgeError::RateLimitExceeded);
        }

        let fingerprint = protocol::fingerprint(method, &params);

        {
            let in_flight = self.in_flight.lock().await;
            if let Some(entry) = in_flight.get(&fingerprint) {
                let mut receiver = entry.sender.subscribe();
                drop(in_flight);
                return match receiver.recv().await {
                    Ok(outcome) => (*outcome).clone(),
                    Err(_) => Err(BridgeError::ProcessExited { code: None }),
                };
            }
        }

        let (broadcast_tx, _placeholder_rx) = broadcast::channel(1);
        self.in_flight.lock().await.insert(
            fingerprint.clone(),
            InFlightEntry {
                sender: broadcast_tx.clone(),
            },
        );

        let outcome = self.send_request_uncached(method, params, validator).await;

        let _ = broadcast_tx.send(Arc::new(outcome.clone()));
        self.in_flight.lock().await.remove(&fingerprint);
        outcome
    }

    async fn send_request_uncached(
        &self,
        method: &str,
        params: Value,
        validator: Option<&Validator>,
    ) -> BridgeOutcome {
        self.start().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let envelope = RequestEnvelope {
            id,
            method: method.to_string(),
            params,
        };
        let line = protocol::encode_request(&envelope).map_err(|e| BridgeError::SpawnFailure {
            message: format!("failed to encode request: {e}"),
        })?;

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        trace!("sent request {} ({})", id, method);

        let timeout = self.config.timeout;
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::ProcessExited { code: None }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(BridgeError::Timeout {
                    method: method.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        let outcome = outcome.map_err(|e| match e {
            BridgeError::RequestFailed { message, .. } => BridgeError::RequestFailed {
                method: method.to_string(),
                message,
            },
            other => other,
        });

        match outcome {
            Ok(data) => match validator {
                Some(v) => v.validate(&data.result).map(|()| data),
                None => Ok(data),
            },
            Err(e) => Err(e),
        }
    }

    /// Performs a health check: verifies the analyzer script exists, that
    /// the executable can report its version out-of-band, and that no
    /// prior transport failure (spawn failure or unexpected process exit)
    /// is on record.
    pub async fn health_check(&self) -> HealthStatus {
        let script_path = self
            .config
            .script_path
            .clone()
            .unwrap_or_else(|| discovery::discover_script_path(&discovery::current_exe_dir()));
        let script_exists = script_path.exists();

        let version_output = tokio::process::Command::new(&self.config.executable_path)
            .arg("--version")
            .output()
            .await;

        let executable_version = version_output
            .as_ref()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

        let prior_failure = self.last_error.lock().await.clone();

        let healthy = script_exists && executable_version.is_some() && prior_failure.is_none();
        let error = if healthy {
            None
        } else if !script_exists {
            Some(format!("analyzer script not found at {}", script_path.display()))
        } else if executable_version.is_none() {
            Some("analyzer executable did not report a version".to_string())
        } else {
            prior_failure.map(|message| format!("prior analyzer failure recorded: {message}"))
        };

        HealthStatus {
            script_exists,
            executable_version,
            healthy,
            error,
        }
    }

    /// Access to the token cache, for C6 methods that consult or update it.
    pub(crate) fn cache(&self) -> &Arc<Mutex<TokenCache>> {
        &self.cache
    }

    /// The configured batch chunk size.
    pub(crate) fn batch_chunk_size(&self) -> usize {
        self.config.batch_chunk_size
    }

    /// Adds to the cumulative batch-parse metrics.
    pub(crate) async fn record_batch_metrics(&self, delta: BatchMetrics) {
        let mut metrics = self.batch_metrics.lock().await;
        metrics.total_ms += delta.total_ms;
        metrics.chunking_ms += delta.chunking_ms;
        metrics.ipc_ms += delta.ipc_ms;
        metrics.chunk_count += delta.chunk_count;
        metrics.file_count += delta.file_count;
    }

    /// Drains (returns and resets) the cumulative batch-parse metrics.
    pub async fn drain_batch_metrics(&self) -> BatchMetrics {
        std::mem::take(&mut *self.batch_metrics.lock().await)
    }
}
