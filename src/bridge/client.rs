//! Client half of the bridge: correlates calls with host responses.

use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::protocol::{self, ClientMessage, HostMessage, Outcome};
use crate::xhr::lifecycle::XhrEventKind;
use crate::xhr::response::XhrResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Item delivered on the stream of a network operation
#[derive(Debug)]
pub enum XhrMessage {
    Event(XhrEventKind, XhrResponse),
    /// Last item of the stream
    Settled(BridgeResult<Outcome>),
}

/// Commands processed by the event loop
#[derive(Debug)]
enum Command {
    Call {
        message: ClientMessage,
        tx: oneshot::Sender<BridgeResult<Outcome>>,
    },
    Stream {
        message: ClientMessage,
        tx: mpsc::UnboundedSender<XhrMessage>,
    },
    Abort(u64),
}

/// A call awaiting its response
#[derive(Debug)]
enum Pending {
    Call(oneshot::Sender<BridgeResult<Outcome>>),
    Stream(mpsc::UnboundedSender<XhrMessage>),
}

impl Pending {
    fn settle(self, result: BridgeResult<Outcome>) {
        match self {
            Self::Call(tx) => {
                let _ = tx.send(result);
            }
            Self::Stream(tx) => {
                let _ = tx.send(XhrMessage::Settled(result));
            }
        }
    }
}

/// Handle to a bridge connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl BridgeClient {
    /// Start a client over a transport to the host
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let state = State {
            writer,
            pending: HashMap::new(),
        };
        tokio::spawn(run(state, reader, cmd_rx, cancel.clone()));

        Self {
            cmd_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            cancel,
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Invoke an operation and wait for its outcome.
    ///
    /// Failure outcomes are returned as [`BridgeError::Rejected`].
    pub async fn call(&self, operation: &str, args: Value) -> BridgeResult<Option<Value>> {
        let id = self.allocate_id();
        debug!(id, operation, "call");
        let (tx, rx) = oneshot::channel();
        let message = ClientMessage::Call {
            id,
            operation: operation.to_string(),
            args,
        };
        self.cmd_tx
            .send(Command::Call { message, tx })
            .map_err(|_| BridgeError::Disconnected)?;

        match rx.await.map_err(|_| BridgeError::Disconnected)?? {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { message } => Err(BridgeError::Rejected(message)),
        }
    }

    /// Invoke an operation whose events are streamed before its outcome.
    ///
    /// Returns the call id, used by [`BridgeClient::abort`].
    pub fn stream(
        &self,
        operation: &str,
        args: Value,
    ) -> BridgeResult<(u64, mpsc::UnboundedReceiver<XhrMessage>)> {
        let id = self.allocate_id();
        debug!(id, operation, "stream");
        let (tx, rx) = mpsc::unbounded_channel();
        let message = ClientMessage::Call {
            id,
            operation: operation.to_string(),
            args,
        };
        self.cmd_tx
            .send(Command::Stream { message, tx })
            .map_err(|_| BridgeError::Disconnected)?;
        Ok((id, rx))
    }

    /// Ask the host to cancel a streamed operation. No-op once it has settled.
    pub fn abort(&self, id: u64) {
        let _ = self.cmd_tx.send(Command::Abort(id));
    }

    /// Detect if the event loop has terminated
    pub async fn closed(&self) {
        self.cmd_tx.closed().await
    }

    /// Stop the event loop; pending calls reject with [`BridgeError::Disconnected`]
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct State<W> {
    writer: W,
    pending: HashMap<u64, Pending>,
}

async fn run<R, W>(
    mut state: State<W>,
    reader: R,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut commands_open = true;

    loop {
        // Once every handle is gone, keep reading until outstanding calls settle
        if !commands_open && state.pending.is_empty() {
            debug!("all client handles dropped");
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("terminating client...");
                break;
            }
            cmd = cmd_rx.recv(), if commands_open => match cmd {
                Some(cmd) => {
                    if let Err(e) = state.handle_command(cmd).await {
                        warn!("Failed to write to host: {}", e);
                        break;
                    }
                }
                None => commands_open = false,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => state.handle_line(&line),
                Ok(None) => {
                    debug!("host closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read from host: {}", e);
                    break;
                }
            },
        }
    }

    state.reject_all();
}

impl<W: AsyncWrite + Unpin> State<W> {
    async fn handle_command(&mut self, cmd: Command) -> std::io::Result<()> {
        match cmd {
            Command::Call { message, tx } => self.send_call(message, Pending::Call(tx)).await,
            Command::Stream { message, tx } => self.send_call(message, Pending::Stream(tx)).await,
            Command::Abort(id) => {
                // Only streamed operations that are still in flight can be aborted
                if matches!(self.pending.get(&id), Some(Pending::Stream(_))) {
                    protocol::write_message(&mut self.writer, &ClientMessage::Abort { id }).await
                } else {
                    trace!(id, "abort ignored, call already settled");
                    Ok(())
                }
            }
        }
    }

    async fn send_call(&mut self, message: ClientMessage, pending: Pending) -> std::io::Result<()> {
        let ClientMessage::Call { id, .. } = &message else {
            return Ok(());
        };
        let id = *id;

        let line = match protocol::encode_line(&message) {
            Ok(line) => line,
            Err(e) => {
                pending.settle(Err(BridgeError::Serialization(e)));
                return Ok(());
            }
        };

        self.pending.insert(id, pending);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let message = match serde_json::from_str::<HostMessage>(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid host message: {} (raw: {})", e, line);
                return;
            }
        };

        match message {
            HostMessage::Response { id, outcome } => match self.pending.remove(&id) {
                Some(pending) => {
                    trace!(id, success = outcome.is_success(), "response");
                    pending.settle(Ok(outcome));
                }
                None => debug!(id, "response for unknown call"),
            },
            HostMessage::Event {
                id,
                event,
                response,
            } => match self.pending.get(&id) {
                Some(Pending::Stream(tx)) => {
                    let _ = tx.send(XhrMessage::Event(event, response));
                }
                _ => debug!(id, ?event, "event for unknown stream"),
            },
        }
    }

    fn reject_all(&mut self) {
        if !self.pending.is_empty() {
            warn!("Rejecting {} pending calls", self.pending.len());
        }
        for (_, pending) in self.pending.drain() {
            pending.settle(Err(BridgeError::Disconnected));
        }
    }
}
