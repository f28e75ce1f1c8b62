pub mod app;
pub mod bridge;
pub mod cli;
pub mod gm;
pub mod host;
pub mod script;
pub mod util;
pub mod xhr;

pub use app::config::Config;
pub use bridge::{BridgeClient, Session};
pub use gm::{Gm, GmValue};
pub use host::{BridgeHost, ScriptContext};
