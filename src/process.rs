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

//! Owns the analyzer subprocess: piped stdio, line framing, and lifecycle.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol;

/// Events the process reader pushes up to the multiplexer. Internal to the
/// crate; hosts observe lifecycle only through [`crate::multiplexer::BridgeEvent`].
#[derive(Debug)]
pub enum ProcessEvent {
    /// A complete NDJSON line arrived on stdout.
    Message(String),
    /// A chunk of raw stderr output, not line-framed.
    Stderr(String),
    /// The child process was reaped.
    Exit(Option<i32>),
}

/// A running (or not-yet-spawned) analyzer subprocess.
pub struct ProcessHandle {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    alive: Arc<AtomicBool>,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    reader_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
    wait_task: Option<tokio::task::JoinHandle<()>>,
}

impl ProcessHandle {
    /// Creates an unspawned handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdin: Arc::new(Mutex::new(None)),
            alive: Arc::new(AtomicBool::new(false)),
            pid: None,
            kill_tx: None,
            reader_task: None,
            stderr_task: None,
            wait_task: None,
        }
    }

    /// Spawns the analyzer executable with piped stdio and starts the
    /// background reader tasks. Events are delivered on `events`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadySpawned`] if this handle is already
    /// running, or [`BridgeError::SpawnFailure`] if the OS refuses to start
    /// the process.
    pub async fn spawn(
        &mut self,
        executable_path: &str,
        args: &[String],
        env_overlay: &HashMap<String, String>,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> BridgeResult<()> {
        if self.alive.load(Ordering::SeqCst) {
            return Err(BridgeError::AlreadySpawned);
        }

        let mut command = Command::new(executable_path);
        command
            .args(args)
            .envs(env_overlay)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| BridgeError::SpawnFailure {
            message: format!("failed to spawn '{executable_path}': {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::SpawnFailure {
            message: "child stdin was not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::SpawnFailure {
            message: "child stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| BridgeError::SpawnFailure {
            message: "child stderr was not captured".to_string(),
        })?;

        self.pid = child.id();
        self.alive.store(true, Ordering::SeqCst);
        *self.stdin.lock().await = Some(stdin);

        let reader_task = tokio::spawn(Self::stdout_task(stdout, events.clone()));
        let stderr_task = tokio::spawn(Self::stderr_task(stderr, events.clone()));
        let alive = self.alive.clone();
        let (kill_tx, kill_rx) = oneshot::channel();
        let wait_task = tokio::spawn(Self::wait_task(child, alive, events, kill_rx));

        self.kill_tx = Some(kill_tx);
        self.reader_task = Some(reader_task);
        self.stderr_task = Some(stderr_task);
        self.wait_task = Some(wait_task);
        Ok(())
    }

    async fn stdout_task(
        mut stdout: tokio::process::ChildStdout,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) {
        let mut buffer = BytesMut::with_capacity(8192);
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => {
                    debug!("analyzer stdout closed");
                    break;
                }
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!("error reading analyzer stdout: {}", e);
                    break;
                }
            }
            while let Some(line) = protocol::try_parse_line(&mut buffer) {
                if line.trim().is_empty() {
                    continue;
                }
                trace!("analyzer stdout line: {}", line);
                if serde_json::from_str::<serde_json::Value>(&line).is_ok() {
                    let _ = events.send(ProcessEvent::Message(line));
                } else {
                    // Not JSON: the analyzer printed debug text to stdout.
                    let _ = events.send(ProcessEvent::Stderr(line));
                }
            }
        }
    }

    async fn stderr_task(
        mut stderr: tokio::process::ChildStderr,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) {
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
                    let _ = events.send(ProcessEvent::Stderr(text));
                }
                Err(_) => break,
            }
        }
    }

    async fn wait_task(
        mut child: Child,
        alive: Arc<AtomicBool>,
        events: mpsc::UnboundedSender<ProcessEvent>,
        mut kill_rx: oneshot::Receiver<()>,
    ) {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = &mut kill_rx => {
                let _ = child.start_kill();
                child.wait().await
            }
        };
        alive.store(false, Ordering::SeqCst);
        let code = status.ok().and_then(|s| s.code());
        let _ = events.send(ProcessEvent::Exit(code));
    }

    /// Writes `line` (already newline-terminated) to the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotWritable`] if the process has exited or
    /// stdin has already been closed.
    pub async fn send(&self, line: &str) -> BridgeResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(BridgeError::NotWritable)?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| BridgeError::NotWritable)?;
        stdin.flush().await.map_err(|_| BridgeError::NotWritable)
    }

    /// Returns whether the process is currently believed to be running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Returns the process ID, if spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Requests graceful termination (close stdin, wait a bounded grace
    /// period) and escalates to a forceful kill if the process has not
    /// exited by then.
    pub async fn kill(&mut self, grace_period: Duration) {
        // Dropping stdin sends EOF, the analyzer's cue to shut down cleanly.
        self.stdin.lock().await.take();

        tokio::time::sleep(grace_period).await;
        if self.alive.load(Ordering::SeqCst)
            && let Some(tx) = self.kill_tx.take()
        {
            let _ = tx.send(());
        }

        // wait_task stores `alive = false` and emits Exit once the process
        // (gracefully or forcefully) actually reaps.
        if let Some(handle) = self.wait_task.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::new()
    }
}
