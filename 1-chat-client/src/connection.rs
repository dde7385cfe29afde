//! TCP connection to the chat server and the background listen loop.
//!
//! A [`Connection`] moves through `Idle → Connecting → Open → Closing → Closed`
//! exactly once. Closing can be triggered from either side: a caller invoking
//! [`Connection::disconnect`] (or hitting a write failure), or the listen loop
//! discovering that the server went away. Whichever gets there first takes the
//! `Open → Closing` transition under the state mutex and runs the close
//! sequence; everybody else sees a no-op. The close sequence is the only place
//! that emits [`ServerEvent::Disconnected`], so observers get it exactly once
//! and always as the last event of the session.

use std::{
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::{Mutex as AsyncMutex, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    codec::{self, LINE_ENDINGS, ServerEvent},
    listener::ListenerRegistry,
};

/// Transport-level knobs. Both timeouts are disabled by default.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Upper bound for establishing the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Maximum silence tolerated while waiting for a line. Expiry counts as a
    /// read failure and closes the connection.
    pub read_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Returned by [`Connection::read_line`] once the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Who is running the close sequence. The listen task must not join itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    ListenTask,
}

enum ReadOutcome {
    Line(String),
    Closed,
    Failed(String),
}

/// A single chat session over one TCP connection.
///
/// Dropping an open `Connection` stops its listen loop without emitting
/// `Disconnected`; call [`Connection::disconnect`] for an orderly close.
pub struct Connection {
    shared: Arc<Shared>,
}

struct Shared {
    config: ConnectionConfig,
    state: Mutex<LinkState>,
    reader: AsyncMutex<Option<BufReader<OwnedReadHalf>>>,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    closing: watch::Sender<bool>,
    listen_started: AtomicBool,
    listen_task: Mutex<Option<JoinHandle<()>>>,
    listeners: ListenerRegistry,
    last_error: Mutex<Option<String>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(LinkState::Idle),
                reader: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                closing,
                listen_started: AtomicBool::new(false),
                listen_task: Mutex::new(None),
                listeners: ListenerRegistry::new(),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Opens the TCP connection. Returns `false` on any failure, leaving the
    /// connection `Idle`; the reason is available from [`Self::last_error`].
    ///
    /// A connection is single-use: once it has been opened, construct a new
    /// one for the next session.
    pub async fn connect(&self, host: &str, port: u16) -> bool {
        self.shared.connect(host, port).await
    }

    /// Closes the connection and notifies listeners with `Disconnected`.
    ///
    /// Returns `true` only for the call that actually performed the close.
    pub async fn disconnect(&self) -> bool {
        self.shared.close(Origin::Caller).await
    }

    /// `true` while the transport is held, whether or not the peer is still
    /// there. A dead peer is only noticed on the next read or write.
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn state(&self) -> LinkState {
        *self.shared.lock_state()
    }

    /// Writes `line` followed by a newline. Concurrent callers never interleave
    /// within a line. A write failure closes the connection.
    pub async fn send_line(&self, line: &str) -> bool {
        self.shared.send_line(line).await
    }

    /// Waits for the next non-blank line from the server.
    ///
    /// Competes with the listen loop for input, so only call this on a
    /// connection whose loop was never started.
    pub async fn read_line(&self) -> Result<String, ConnectionClosed> {
        self.shared.read_line(Origin::Caller).await
    }

    /// Spawns the listen loop on the current tokio runtime.
    ///
    /// Returns `false` if the connection is not open or a loop was already
    /// started for it.
    pub fn start_listening(&self) -> bool {
        let state = self.shared.lock_state();
        if *state != LinkState::Open {
            return false;
        }
        if self.shared.listen_started.swap(true, Ordering::SeqCst) {
            warn!("listen loop already started for this connection");
            return false;
        }

        // Stored while the state lock is held so a concurrent close always
        // finds the handle to join.
        let task = tokio::spawn(listen(Arc::clone(&self.shared)));
        *lock(&self.shared.listen_task) = Some(task);
        true
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.shared.listeners
    }

    /// Last recorded error, or an empty string if nothing went wrong yet.
    pub fn last_error(&self) -> String {
        lock(&self.shared.last_error).clone().unwrap_or_default()
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        self.shared.record_error(message);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.shared.is_active() {
            debug!("connection dropped while open; stopping listen loop");
        }
        self.shared.closing.send_replace(true);
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        lock(&self.state)
    }

    fn is_active(&self) -> bool {
        *self.lock_state() == LinkState::Open
    }

    fn record_error(&self, message: impl Into<String>) {
        *lock(&self.last_error) = Some(message.into());
    }

    async fn connect(&self, host: &str, port: u16) -> bool {
        {
            let mut state = self.lock_state();
            if *state != LinkState::Idle {
                drop(state);
                self.record_error("connection was already used; create a new one");
                return false;
            }
            *state = LinkState::Connecting;
        }

        let stream = match self.open_stream(host, port).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(host, port, %error, "failed to connect");
                self.record_error(format!("failed to connect to {host}:{port}: {error}"));
                *self.lock_state() = LinkState::Idle;
                return false;
            }
        };

        let (reader, writer) = stream.into_split();
        *self.reader.lock().await = Some(BufReader::new(reader));
        *self.writer.lock().await = Some(writer);
        *self.lock_state() = LinkState::Open;

        info!(host, port, "connected");
        true
    }

    async fn open_stream(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let attempt = TcpStream::connect((host, port));
        match self.config.connect_timeout {
            Some(limit) => timeout(limit, attempt).await.unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {limit:?}"),
                ))
            }),
            None => attempt.await,
        }
    }

    async fn send_line(&self, line: &str) -> bool {
        if line.is_empty() {
            self.record_error("refusing to send an empty line");
            return false;
        }
        if line.contains(LINE_ENDINGS) {
            self.record_error("refusing to send a line containing a line break");
            return false;
        }
        if !self.is_active() {
            self.record_error("not connected");
            return false;
        }

        let result = {
            let mut writer = self.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                self.record_error("not connected");
                return false;
            };
            let mut frame = Vec::with_capacity(line.len() + 1);
            frame.extend_from_slice(line.as_bytes());
            frame.push(b'\n');
            match writer.write_all(&frame).await {
                Ok(()) => writer.flush().await,
                Err(error) => Err(error),
            }
        };

        match result {
            Ok(()) => {
                debug!(line, "sent");
                true
            }
            Err(error) => {
                warn!(%error, "write failed");
                self.record_error(format!("write failed: {error}"));
                self.close(Origin::Caller).await;
                false
            }
        }
    }

    async fn read_line(&self, origin: Origin) -> Result<String, ConnectionClosed> {
        let mut closing = self.closing.subscribe();
        let outcome = {
            let mut guard = self.reader.lock().await;
            let Some(reader) = guard.as_mut() else {
                return Err(ConnectionClosed);
            };

            // `read_line` is not cancel-safe; it is only abandoned when the
            // connection is going away and the partial line no longer matters.
            let outcome = select! {
                biased;
                _ = wait_for_close(&mut closing) => ReadOutcome::Closed,
                outcome = next_line(reader, self.config.read_timeout) => outcome,
            };
            if !matches!(outcome, ReadOutcome::Line(_)) {
                guard.take();
            }
            outcome
        };

        match outcome {
            ReadOutcome::Line(line) => Ok(line),
            ReadOutcome::Closed => Err(ConnectionClosed),
            ReadOutcome::Failed(reason) => {
                debug!(%reason, "read side finished");
                self.record_error(reason);
                self.close(origin).await;
                Err(ConnectionClosed)
            }
        }
    }

    /// Takes the `Open → Closing` transition. Only one caller ever wins.
    fn begin_close(&self) -> bool {
        let mut state = self.lock_state();
        if *state != LinkState::Open {
            return false;
        }
        *state = LinkState::Closing;
        true
    }

    async fn close(&self, origin: Origin) -> bool {
        if !self.begin_close() {
            return false;
        }

        self.closing.send_replace(true);
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(error) = writer.shutdown().await {
                debug!(%error, "failed to shut down write half cleanly");
            }
        }
        // Free the read half now unless a reader holds it; that reader drops
        // it itself once it sees the close signal.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }

        if origin == Origin::Caller {
            let task = lock(&self.listen_task).take();
            if let Some(task) = task {
                if let Err(error) = task.await {
                    warn!(%error, "listen loop ended abnormally");
                }
            }
        }

        *self.lock_state() = LinkState::Closed;
        info!(?origin, "connection closed");
        self.listeners.notify_all(&ServerEvent::Disconnected);
        true
    }
}

async fn listen(shared: Arc<Shared>) {
    debug!("listen loop started");
    while shared.is_active() {
        match shared.read_line(Origin::ListenTask).await {
            Ok(line) => {
                let event = codec::decode_event(&line);
                debug!(?event, "received");
                shared.listeners.notify_all(&event);
            }
            Err(ConnectionClosed) => break,
        }
    }
    debug!("listen loop finished");
}

async fn wait_for_close(closing: &mut watch::Receiver<bool>) {
    // The sender lives as long as the connection, so an error here only
    // means the connection itself is gone.
    let _ = closing.wait_for(|closing| *closing).await;
}

/// Reads up to the next non-blank line. Bytes that are not valid UTF-8 are
/// replaced rather than treated as a transport failure.
async fn next_line(reader: &mut BufReader<OwnedReadHalf>, limit: Option<Duration>) -> ReadOutcome {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf);
        let result = match limit {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => return ReadOutcome::Failed(format!("no data received within {limit:?}")),
            },
            None => read.await,
        };

        match result {
            Ok(0) => return ReadOutcome::Failed("connection closed by server".to_string()),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let trimmed = line.trim_end_matches(LINE_ENDINGS);
                if trimmed.is_empty() {
                    continue;
                }
                return ReadOutcome::Line(trimmed.to_string());
            }
            Err(error) => return ReadOutcome::Failed(format!("read failed: {error}")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
