//! Connection server (C2): accepts clients and drives each through the length-framed
//! session protocol (spec §4.1).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::{Domain, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{DbError, Result};
use crate::network::protocol::{
    self, CONT_READ_BUF, LENGTH_READ_BUF, PAYLOAD_SLACK, PROMPT_CONT, PROMPT_LEN,
};
use crate::queue::WorkQueue;
use crate::session::Session;

/// Database server (C2): owns the listener and hands every accepted connection off to
/// its own session task.
pub struct Server {
    listener: TcpListener,
    queue: WorkQueue,
    next_session_id: AtomicU64,
    shutdown: CancellationToken,
}

/// A cheap, cloneable handle to a running [`Server`]'s shutdown state. Obtained with
/// [`Server::handle`] before `run()` consumes the server, since `run()` needs to own
/// `self` for the lifetime of the accept loop.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
}

impl ServerHandle {
    /// Idempotent: unblocks the accept loop and every session's blocked socket reads
    /// (spec §4.1 C2 contract). In-flight workers still run to completion (spec §5) --
    /// this only stops new accepts and new reads from starting.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Reports whether the server is still bound and listening.
    pub fn is_open(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

impl Server {
    /// Creates a stream socket, binds it to `config.ip:config.port`, and listens with
    /// a backlog of `config.max_connection` (spec §4.1 Algorithm). Bind/listen failure
    /// is a `SocketError` and, per §7, fatal to the process.
    ///
    /// `socket2` gives explicit control over the listen backlog that
    /// `tokio::net::TcpListener::bind` doesn't expose -- the socket is built and put
    /// into listening state here, then handed to tokio as a non-blocking std listener.
    pub async fn bind(config: &ServerConfig, queue: WorkQueue) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.ip, config.port)
            .parse()
            .map_err(|e| DbError::Socket(format!("Invalid address: {e}")))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
            .map_err(|e| DbError::Socket(format!("Can't create socket: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| DbError::Socket(format!("Can't configure socket: {e}")))?;
        socket
            .bind(&addr.into())
            .map_err(|e| DbError::Socket(format!("Can't bind socket: {e}")))?;
        socket
            .listen(config.max_connection.max(1))
            .map_err(|e| DbError::Socket(format!("Can't listen on socket: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| DbError::Socket(format!("Can't configure socket: {e}")))?;

        let listener = TcpListener::from_std(socket.into())
            .map_err(|e| DbError::Socket(format!("Can't create socket: {e}")))?;

        tracing::info!(%addr, backlog = config.max_connection, "listening");

        Ok(Self {
            listener,
            queue,
            next_session_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// The bound local address; mainly useful in tests that bind to port 0.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| DbError::Socket(format!("Can't read local address: {e}")))
    }

    /// A cloneable `stop()`/`is_open()` handle, obtained before `run()` takes `self`.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Runs the accept loop until `stop()` is called or a fatal socket error occurs
    /// (spec §4.1, §7: "Accept failure while running is fatal to the server"). Every
    /// accepted connection is tracked in a `JoinSet` so that, once the loop breaks,
    /// `run()` doesn't return until every in-flight session has finished on its own
    /// (spec §5: in-flight workers run to completion, not a forced-cancel).
    pub async fn run(self) -> Result<()> {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                            return Err(DbError::Socket(format!("Accept failed: {e}")));
                        }
                    };

                    let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(session_id = id, %peer, "accepted connection");

                    let queue = self.queue.clone();
                    let shutdown = self.shutdown.clone();
                    sessions.spawn(async move {
                        if let Err(e) = handle_session(id, socket, queue, shutdown).await {
                            tracing::warn!(session_id = id, error = %e, "session ended with error");
                        }
                    });
                }
            }
        }

        tracing::info!("waiting for in-flight sessions to finish");
        while let Some(res) = sessions.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "session task panicked");
            }
        }

        Ok(())
    }
}

/// Drives one connection through repeated iterations of the session state machine
/// (spec §4.1): `PROMPT_LEN -> READ_LEN -> PROMPT_DATA -> READ_DATA -> ENQUEUE ->
/// WAIT_RESULT -> WRITE_RESULT -> PROMPT_CONT`, looping while the client keeps
/// answering the continuation prompt with `'y'`.
///
/// `shutdown` is checked at the top of every iteration and races every blocked read, so
/// `stop()` unblocks a session idle between requests immediately. A session already past
/// `ENQUEUE` is never interrupted -- it always reaches `WAIT_RESULT` on its own (spec §5).
async fn handle_session(
    id: u64,
    mut socket: TcpStream,
    queue: WorkQueue,
    shutdown: CancellationToken,
) -> Result<()> {
    let session = Arc::new(Session::new(id));

    loop {
        if shutdown.is_cancelled() {
            tracing::info!(session_id = id, "session closed for shutdown");
            return Ok(());
        }

        let Some(payload) = read_framed_payload(&mut socket, &shutdown).await? else {
            continue;
        };
        let Some(payload) = payload else {
            // FramingError: invalid or short length field. Diagnostic already written;
            // re-prompt without enqueueing (spec §4.1 READ_LEN "(invalid)" edge).
            continue;
        };

        session.set_input(payload).await;
        queue.enqueue(session.clone()).await;
        let result = session.wait_result().await;

        socket
            .write_all(result.as_bytes())
            .await
            .map_err(|e| DbError::Socket(format!("Write failed: {e}")))?;
        session.reset().await;

        socket
            .write_all(PROMPT_CONT.as_bytes())
            .await
            .map_err(|e| DbError::Socket(format!("Write failed: {e}")))?;

        let mut cont_buf = vec![0u8; CONT_READ_BUF];
        let n = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(session_id = id, "session closed for shutdown");
                return Ok(());
            }
            read = socket.read(&mut cont_buf) => {
                read.map_err(|e| DbError::Socket(format!("Read failed: {e}")))?
            }
        };
        if n == 0 || !protocol::wants_continue(&cont_buf[..n]) {
            tracing::info!(session_id = id, "session closed");
            return Ok(());
        }
    }
}

/// Implements `PROMPT_LEN -> READ_LEN -> PROMPT_DATA -> READ_DATA`.
///
/// The outer `Option` is `None` when `shutdown` fires while waiting for the client;
/// the caller should stop the session. The inner `Option` is `None` for an
/// invalid/short length field (diagnostic already written to the client; caller
/// re-prompts) and `Some(payload)` with the exact N-byte XML payload once framing
/// succeeds.
async fn read_framed_payload(
    socket: &mut TcpStream,
    shutdown: &CancellationToken,
) -> Result<Option<Option<String>>> {
    socket
        .write_all(PROMPT_LEN.as_bytes())
        .await
        .map_err(|e| DbError::Socket(format!("Write failed: {e}")))?;

    let mut len_buf = vec![0u8; LENGTH_READ_BUF];
    let n = tokio::select! {
        _ = shutdown.cancelled() => return Ok(None),
        read = socket.read(&mut len_buf) => {
            read.map_err(|e| DbError::Socket(format!("Read failed: {e}")))?
        }
    };
    if n == 0 {
        return Err(DbError::Socket("Connection closed by peer".to_string()));
    }

    let length = match protocol::parse_length(&len_buf[..n]) {
        Ok(length) => length,
        Err(kind) => {
            let diagnostic = DbError::Framing(kind.message().trim_end().to_string());
            tracing::debug!(error = %diagnostic, "framing error");
            socket
                .write_all(kind.message().as_bytes())
                .await
                .map_err(|e| DbError::Socket(format!("Write failed: {e}")))?;
            return Ok(Some(None));
        }
    };

    let mut data_buf = vec![0u8; length + PAYLOAD_SLACK];
    let mut read = 0;
    while read < length {
        let n = socket
            .read(&mut data_buf[read..length])
            .await
            .map_err(|e| DbError::Socket(format!("Read failed: {e}")))?;
        if n == 0 {
            return Err(DbError::Socket(
                "Connection closed before full payload was received".to_string(),
            ));
        }
        read += n;
    }

    // Best-effort drain of any trailing bytes already buffered on the socket (spec
    // §4.1 READ_DATA). A non-blocking try_read that would block just means there was
    // nothing left to drain.
    loop {
        match socket.try_read(&mut data_buf[length..]) {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }

    let payload = String::from_utf8_lossy(&data_buf[..length]).into_owned();
    Ok(Some(Some(payload)))
}
