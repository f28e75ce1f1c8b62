//! Message bridge between a userscript and the host
//!
//! - protocol: wire messages (newline-delimited JSON)
//! - client: correlation table and call futures on the script side
//! - router: operation names, grants and dispatch on the host side
//! - session: host serve loop for one connected script
//! - error: Error types

pub mod client;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;

pub use client::{BridgeClient, XhrMessage};
pub use error::{BridgeError, BridgeResult};
pub use protocol::{ClientMessage, HostMessage, Outcome};
pub use router::{Operation, Router};
pub use session::Session;

use crate::host::{BridgeHost, ScriptContext};
use std::sync::Arc;
use tokio::io::BufReader;

const IN_PROCESS_BUFFER: usize = 64 * 1024;

/// Serve a script in-process and return a client connected to it
pub fn connect(host: Arc<BridgeHost>, ctx: ScriptContext) -> BridgeClient {
    let (client_io, host_io) = tokio::io::duplex(IN_PROCESS_BUFFER);

    let (host_read, host_write) = tokio::io::split(host_io);
    let session = Session::new(host, ctx);
    tokio::spawn(async move {
        if let Err(e) = session.serve(BufReader::new(host_read), host_write).await {
            tracing::warn!("In-process session failed: {}", e);
        }
    });

    let (client_read, client_write) = tokio::io::split(client_io);
    BridgeClient::new(BufReader::new(client_read), client_write)
}
