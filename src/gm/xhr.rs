use crate::bridge::client::{BridgeClient, XhrMessage};
use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::protocol::Outcome;
use crate::xhr::lifecycle::{Stage, XhrEventKind};
use crate::xhr::response::{XhrOutcome, XhrResponse};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

type Hook = Box<dyn FnMut(&XhrResponse) + Send>;

/// Lifecycle hooks of `GM.xmlHttpRequest`, invoked in event order
#[derive(Default)]
pub struct XhrCallbacks {
    onreadystatechange: Option<Hook>,
    onloadstart: Option<Hook>,
    onprogress: Option<Hook>,
    onload: Option<Hook>,
    onerror: Option<Hook>,
    ontimeout: Option<Hook>,
    onabort: Option<Hook>,
    onloadend: Option<Hook>,
}

macro_rules! hook_setter {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, hook: impl FnMut(&XhrResponse) + Send + 'static) -> Self {
                self.$name = Some(Box::new(hook));
                self
            }
        )*
    };
}

impl XhrCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    hook_setter!(
        onreadystatechange,
        onloadstart,
        onprogress,
        onload,
        onerror,
        ontimeout,
        onabort,
        onloadend,
    );

    fn dispatch(&mut self, kind: XhrEventKind, response: &XhrResponse) {
        let hook = match kind {
            XhrEventKind::ReadyStateChange => &mut self.onreadystatechange,
            XhrEventKind::LoadStart => &mut self.onloadstart,
            XhrEventKind::Progress => &mut self.onprogress,
            XhrEventKind::Load => &mut self.onload,
            XhrEventKind::Error => &mut self.onerror,
            XhrEventKind::Timeout => &mut self.ontimeout,
            XhrEventKind::Abort => &mut self.onabort,
            XhrEventKind::LoadEnd => &mut self.onloadend,
        };
        if let Some(hook) = hook {
            hook(response);
        }
    }
}

/// Flags shared between a handle and the task driving its hooks
#[derive(Debug, Default)]
struct Flags {
    settled: AtomicBool,
    aborted: AtomicBool,
}

/// Cancels a running request. Returned alone by the legacy call convention.
#[derive(Debug, Clone)]
pub struct XhrAbortHandle {
    id: u64,
    client: BridgeClient,
    flags: Arc<Flags>,
}

impl XhrAbortHandle {
    /// Abort the request. No-op once it has settled.
    pub fn abort(&self) {
        if self.flags.settled.load(Ordering::Acquire) {
            return;
        }
        if !self.flags.aborted.swap(true, Ordering::AcqRel) {
            tracing::debug!(id = self.id, "Aborting request");
            self.client.abort(self.id);
        }
    }

    pub fn is_settled(&self) -> bool {
        self.flags.settled.load(Ordering::Acquire)
    }
}

/// A running `GM.xmlHttpRequest`: awaitable and abortable.
///
/// Resolves with the final response when the request completes; rejects with
/// [`BridgeError::Network`] when it is aborted, errors or times out.
pub struct XhrRequest {
    handle: XhrAbortHandle,
    done: oneshot::Receiver<BridgeResult<XhrResponse>>,
}

impl XhrRequest {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn abort_handle(&self) -> XhrAbortHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> u64 {
        self.handle.id
    }
}

impl Future for XhrRequest {
    type Output = BridgeResult<XhrResponse>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().done)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(BridgeError::Disconnected)))
    }
}

/// Send the request and spawn the task that feeds its hooks
pub(crate) fn start(
    client: &BridgeClient,
    args: serde_json::Value,
    callbacks: XhrCallbacks,
) -> BridgeResult<XhrRequest> {
    let (id, events) = client.stream("xmlHttpRequest", args)?;
    let flags = Arc::new(Flags::default());
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(drive(events, callbacks, flags.clone(), done_tx));

    Ok(XhrRequest {
        handle: XhrAbortHandle {
            id,
            client: client.clone(),
            flags,
        },
        done: done_rx,
    })
}

async fn drive(
    mut events: mpsc::UnboundedReceiver<XhrMessage>,
    mut callbacks: XhrCallbacks,
    flags: Arc<Flags>,
    done_tx: oneshot::Sender<BridgeResult<XhrResponse>>,
) {
    // Events that arrive after a local abort wait for the host's verdict
    let mut held = Vec::new();
    let settled = loop {
        match events.recv().await {
            Some(XhrMessage::Event(kind, response)) => {
                if flags.aborted.load(Ordering::Acquire) {
                    held.push((kind, response));
                } else {
                    callbacks.dispatch(kind, &response);
                }
            }
            Some(XhrMessage::Settled(result)) => break result,
            None => break Err(BridgeError::Disconnected),
        }
    };
    let result = settled.and_then(into_response);

    // A request that completed before the abort reached the host keeps its
    // happy path. Otherwise only the terminal events are delivered.
    let completed = result.is_ok();
    for (kind, response) in held {
        if completed || !kind.is_happy_path() {
            callbacks.dispatch(kind, &response);
        } else {
            tracing::trace!(?kind, "Suppressed after abort");
        }
    }
    flags.settled.store(true, Ordering::Release);

    let _ = done_tx.send(result);
}

fn into_response(outcome: Outcome) -> BridgeResult<XhrResponse> {
    let value = match outcome {
        Outcome::Success { value } => value.unwrap_or_default(),
        Outcome::Failure { message } => return Err(BridgeError::Rejected(message)),
    };
    let outcome: XhrOutcome = serde_json::from_value(value)?;
    match outcome.stage {
        Stage::Done => Ok(outcome.response),
        stage => Err(BridgeError::Network {
            stage,
            message: outcome.error,
            response: Box::new(outcome.response),
        }),
    }
}
