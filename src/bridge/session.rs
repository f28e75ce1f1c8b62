//! Host-side serve loop for one connected script.
//!
//! Reads newline-delimited client messages, runs every call in its own task,
//! and funnels all outbound messages through a single writer task so the
//! events of one network operation keep their order.

use crate::bridge::error::BridgeResult;
use crate::bridge::protocol::{self, ClientMessage, HostMessage, Outcome};
use crate::bridge::router::{Operation, Router, parse_args};
use crate::host::{BridgeHost, ScriptContext};
use crate::xhr::{XhrDetails, XhrEventKind, XhrResponse};
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type ActiveMap = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// One bridge session bound to a script context
pub struct Session {
    router: Router,
    ctx: Arc<ScriptContext>,
    active: ActiveMap,
}

impl Session {
    pub fn new(host: Arc<BridgeHost>, ctx: ScriptContext) -> Self {
        Self {
            router: Router::new(host),
            ctx: Arc::new(ctx),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serve until the client closes its end.
    ///
    /// In-flight network operations are aborted when the client goes away.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> BridgeResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tracing::info!("Session started for {}", self.ctx.namespace);

        let (out_tx, out_rx) = mpsc::unbounded_channel::<HostMessage>();
        let writer_task = tokio::spawn(write_loop(writer, out_rx));

        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();

        let result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => {
                    tracing::warn!("Failed to read from client: {}", e);
                    break Err(e.into());
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<ClientMessage>(line) {
                Ok(ClientMessage::Call {
                    id,
                    operation,
                    args,
                }) => {
                    // Register cancellable calls before spawning so an abort
                    // that follows immediately finds its token
                    let cancel = match self.register(id, &operation) {
                        Ok(cancel) => cancel,
                        Err(outcome) => {
                            let _ = out_tx.send(HostMessage::Response { id, outcome });
                            continue;
                        }
                    };
                    let call = Call {
                        id,
                        operation,
                        args,
                        cancel,
                        router: self.router.clone(),
                        ctx: self.ctx.clone(),
                        active: self.active.clone(),
                        out_tx: out_tx.clone(),
                    };
                    tasks.spawn(call.run());
                }
                Ok(ClientMessage::Abort { id }) => self.abort(id),
                Err(e) => {
                    tracing::warn!("Invalid client message: {} (raw: {})", e, line);
                    if let Some(id) = protocol::salvage_id(line) {
                        let _ = out_tx.send(HostMessage::Response {
                            id,
                            outcome: Outcome::failure(format!("Invalid message: {}", e)),
                        });
                    }
                }
            }

            // Reap finished tasks
            while tasks.try_join_next().is_some() {}
        };

        self.abort_all();
        while tasks.join_next().await.is_some() {}
        drop(out_tx);
        let _ = writer_task.await;

        tracing::info!("Session ended for {}", self.ctx.namespace);
        result
    }

    fn register(&self, id: u64, operation: &str) -> Result<Option<CancellationToken>, Outcome> {
        let streaming = Operation::from_name(operation).is_some_and(Operation::is_streaming);
        if !streaming {
            return Ok(None);
        }
        let mut active = lock(&self.active);
        if active.contains_key(&id) {
            tracing::warn!(id, "Duplicate request id");
            return Err(Outcome::failure(format!("Duplicate request id {}", id)));
        }
        let token = CancellationToken::new();
        active.insert(id, token.clone());
        Ok(Some(token))
    }

    fn abort(&self, id: u64) {
        let token = lock(&self.active).get(&id).cloned();
        match token {
            Some(token) => {
                tracing::debug!(id, "Abort requested");
                token.cancel();
            }
            None => tracing::debug!(id, "Abort for settled or unknown request ignored"),
        }
    }

    fn abort_all(&self) {
        for token in lock(&self.active).values() {
            token.cancel();
        }
    }
}

fn lock(active: &ActiveMap) -> std::sync::MutexGuard<'_, HashMap<u64, CancellationToken>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn write_loop<W>(mut writer: W, mut out_rx: mpsc::UnboundedReceiver<HostMessage>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = out_rx.recv().await {
        if let Err(e) = protocol::write_message(&mut writer, &message).await {
            tracing::warn!("Failed to write to client: {}", e);
            break;
        }
    }
}

/// One accepted call, run in its own task
struct Call {
    id: u64,
    operation: String,
    args: Value,
    /// Present for network operations, registered in the active map
    cancel: Option<CancellationToken>,
    router: Router,
    ctx: Arc<ScriptContext>,
    active: ActiveMap,
    out_tx: mpsc::UnboundedSender<HostMessage>,
}

impl Call {
    async fn run(self) {
        let id = self.id;
        let out_tx = self.out_tx.clone();
        let operation = self.operation.clone();
        let active = self.active.clone();
        let registered = self.cancel.is_some();

        // A panicking handler still produces its response
        let outcome = AssertUnwindSafe(self.execute())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!(id, "Handler for {} panicked", operation);
                Outcome::failure(format!("Internal error while handling {}", operation))
            });

        if registered {
            lock(&active).remove(&id);
        }
        let _ = out_tx.send(HostMessage::Response { id, outcome });
    }

    async fn execute(self) -> Outcome {
        let op = match self.router.resolve(&self.ctx, &self.operation) {
            Ok(op) => op,
            Err(e) => {
                tracing::debug!(id = self.id, "Rejected {}: {}", self.operation, e);
                return Outcome::failure(e.to_string());
            }
        };

        tracing::trace!(id = self.id, "Dispatching {}", op.name());
        if op.is_streaming() {
            return self.execute_xhr(op).await;
        }

        match self.router.dispatch(&self.ctx, op, self.args).await {
            Ok(value) => Outcome::from(value),
            Err(e) => {
                tracing::warn!(id = self.id, "{} failed: {}", op.name(), e);
                Outcome::failure(e.to_string())
            }
        }
    }

    async fn execute_xhr(self, op: Operation) -> Outcome {
        let id = self.id;
        let details: XhrDetails = match parse_args(op, self.args) {
            Ok(details) => details,
            Err(e) => return Outcome::failure(e.to_string()),
        };

        let engine = self.router.host().xhr();
        let request = match engine.prepare(&details) {
            Ok(request) => request,
            Err(e) => return Outcome::failure(e.to_string()),
        };

        let cancel = self.cancel.clone().unwrap_or_default();

        tracing::info!(id, "{} {}", details.method.as_deref().unwrap_or("GET"), details.url);
        let out_tx = self.out_tx.clone();
        let mut emit = |event: XhrEventKind, response: &XhrResponse| {
            let _ = out_tx.send(HostMessage::Event {
                id,
                event,
                response: response.clone(),
            });
        };
        let outcome = engine.run(&details, request, cancel, &mut emit).await;

        tracing::info!(
            id,
            stage = outcome.stage.name(),
            status = outcome.response.status,
            "Request settled"
        );
        match serde_json::to_value(&outcome) {
            Ok(value) => Outcome::success(value),
            Err(e) => Outcome::failure(format!("Failed to encode {} result: {}", op.name(), e)),
        }
    }
}
