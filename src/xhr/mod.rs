//! Cancellable network operation behind `GM.xmlHttpRequest`
//!
//! - details: request options as sent by the script
//! - lifecycle: stage machine and the notifications each transition emits
//! - response: response snapshot and body decoding
//! - engine: runs a request with reqwest, honoring abort and timeout
//! - error: Error types

pub mod details;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod response;

pub use details::{BinaryBody, RequestBody, ResponseType, XhrDetails};
pub use engine::XhrEngine;
pub use error::{XhrError, XhrResult};
pub use lifecycle::{Lifecycle, Stage, XhrEventKind};
pub use response::{XhrOutcome, XhrResponse};
