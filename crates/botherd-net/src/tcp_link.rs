//! Transport-only [`GameClient`].
//!
//! `TcpLinkClient` holds a plain TCP connection to the server for the
//! lifetime of a session. It performs no protocol handshake and tracks no
//! world state: the link counts as spawned as soon as the socket is up,
//! every received text line is reported as chat, and the inventory is
//! always empty. A full protocol client plugs in through the same trait.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::{ConnectOptions, GameClient, Session, SessionCommand, SessionEvent};
use crate::error::NetError;

/// Received lines are cut to this many bytes; the rest of an over-long
/// line is dropped up to the next newline.
pub const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct TcpLinkClient;

impl TcpLinkClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GameClient for TcpLinkClient {
    async fn connect(&self, options: ConnectOptions) -> Result<Session, NetError> {
        let addr = format!("{}:{}", options.host, options.port);
        let stream = TcpStream::connect((options.host.as_str(), options.port))
            .await
            .map_err(|source| NetError::Connect {
                addr: addr.clone(),
                source,
            })?;

        info!(addr = %addr, user = %options.username, "TCP link established");

        let (session, cmd_rx, event_tx) = Session::channel();
        tokio::spawn(run_link(stream, cmd_rx, event_tx, addr));
        Ok(session)
    }
}

async fn run_link(
    stream: TcpStream,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
    addr: String,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::with_capacity(MAX_LINE_BYTES);
    // Set while skipping the tail of an over-long line.
    let mut discarding = false;

    if event_tx.send(SessionEvent::Spawned).await.is_err() {
        close(&mut write_half).await;
        return;
    }

    loop {
        // Never zero: a full buffer is flushed before the next read.
        let limit = (MAX_LINE_BYTES - buf.len()) as u64;
        let mut limited = (&mut reader).take(limit);

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Inventory(reply)) => {
                        let _ = reply.send(Vec::new());
                    }
                    Some(SessionCommand::Disconnect) | None => {
                        close(&mut write_half).await;
                        let _ = event_tx
                            .send(SessionEvent::Disconnected("disconnect requested".into()))
                            .await;
                        break;
                    }
                }
            }

            // read_until keeps partial data in `buf` when cancelled.
            read = limited.read_until(b'\n', &mut buf) => {
                match read {
                    Ok(0) => {
                        let tail = decode_line(&buf);
                        if !discarding && !tail.is_empty() {
                            let _ = event_tx.send(SessionEvent::ChatMessage(tail)).await;
                        }
                        let _ = event_tx
                            .send(SessionEvent::Disconnected("connection closed by server".into()))
                            .await;
                        break;
                    }
                    Ok(_) => {
                        let complete = buf.last() == Some(&b'\n');
                        if !complete && buf.len() < MAX_LINE_BYTES {
                            continue;
                        }
                        let skip = discarding;
                        discarding = !complete;

                        let line = decode_line(&buf);
                        buf.clear();
                        if skip || line.is_empty() {
                            continue;
                        }
                        if event_tx.send(SessionEvent::ChatMessage(line)).await.is_err() {
                            close(&mut write_half).await;
                            break;
                        }
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        let _ = event_tx.send(SessionEvent::Error(reason.clone())).await;
                        let _ = event_tx.send(SessionEvent::Disconnected(reason)).await;
                        break;
                    }
                }
            }
        }
    }

    debug!(addr = %addr, "TCP link closed");
}

async fn close(write_half: &mut OwnedWriteHalf) {
    if let Err(e) = write_half.shutdown().await {
        debug!(error = %e, "Socket shutdown failed");
    }
}

fn decode_line(raw: &[u8]) -> String {
    let cut = &raw[..raw.len().min(MAX_LINE_BYTES)];
    String::from_utf8_lossy(cut).trim().to_string()
}
