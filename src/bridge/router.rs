//! Dispatch of calls by operation name.

use crate::host::{BridgeHost, HostError, HostResult, ScriptContext};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Operations understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Info,
    AddStyle,
    SetValue,
    GetValue,
    DeleteValue,
    ListValues,
    GetTab,
    SaveTab,
    OpenInTab,
    CloseTab,
    SetClipboard,
    XmlHttpRequest,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Self::Info,
        Self::AddStyle,
        Self::SetValue,
        Self::GetValue,
        Self::DeleteValue,
        Self::ListValues,
        Self::GetTab,
        Self::SaveTab,
        Self::OpenInTab,
        Self::CloseTab,
        Self::SetClipboard,
        Self::XmlHttpRequest,
    ];

    /// Parse an operation name.
    ///
    /// `GM.` / `GM_` prefixes are accepted, as is the legacy `xmlhttpRequest` casing.
    pub fn from_name(name: &str) -> Option<Self> {
        let member = name
            .strip_prefix("GM.")
            .or_else(|| name.strip_prefix("GM_"))
            .unwrap_or(name);
        if member == "xmlhttpRequest" {
            return Some(Self::XmlHttpRequest);
        }
        Self::ALL.into_iter().find(|op| op.name() == member)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::AddStyle => "addStyle",
            Self::SetValue => "setValue",
            Self::GetValue => "getValue",
            Self::DeleteValue => "deleteValue",
            Self::ListValues => "listValues",
            Self::GetTab => "getTab",
            Self::SaveTab => "saveTab",
            Self::OpenInTab => "openInTab",
            Self::CloseTab => "closeTab",
            Self::SetClipboard => "setClipboard",
            Self::XmlHttpRequest => "xmlHttpRequest",
        }
    }

    /// Grant a script must declare, if any
    pub fn grant(self) -> Option<String> {
        match self {
            Self::Info => None,
            op => Some(format!("GM.{}", op.name())),
        }
    }

    /// Kept for old scripts; same contract as the rest
    pub fn is_deprecated(self) -> bool {
        matches!(self, Self::GetTab | Self::SaveTab | Self::SetClipboard)
    }

    /// Network operations stream events and are cancellable
    pub fn is_streaming(self) -> bool {
        self == Self::XmlHttpRequest
    }
}

#[derive(Deserialize)]
struct AddStyleArgs {
    css: String,
}

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

#[derive(Deserialize)]
struct SetValueArgs {
    key: String,
    /// Required; an explicit `null` is stored as null
    value: Value,
}

#[derive(Deserialize)]
struct GetValueArgs {
    key: String,
    /// Missing means no default; `null` is a real default
    #[serde(default, deserialize_with = "crate::bridge::protocol::deserialize_present")]
    default: Option<Value>,
}

#[derive(Deserialize)]
struct SaveTabArgs {
    #[serde(default)]
    tab: Value,
}

#[derive(Deserialize)]
struct OpenInTabArgs {
    url: String,
    #[serde(default)]
    background: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseTabArgs {
    #[serde(default)]
    tab_id: Option<u64>,
}

fn default_clipboard_type() -> String {
    "text/plain".to_string()
}

#[derive(Deserialize)]
struct SetClipboardArgs {
    data: String,
    #[serde(rename = "type", default = "default_clipboard_type")]
    mime_type: String,
}

/// Parse the arguments of `op`; a missing payload counts as `{}`
pub fn parse_args<T: DeserializeOwned>(op: Operation, args: Value) -> HostResult<T> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| HostError::invalid_arguments(op.name(), e))
}

/// Resolves operation names and runs the non-streaming ones against the host
#[derive(Clone)]
pub struct Router {
    host: Arc<BridgeHost>,
}

impl Router {
    pub fn new(host: Arc<BridgeHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &BridgeHost {
        &self.host
    }

    /// Look up an operation and check the script may call it
    pub fn resolve(&self, ctx: &ScriptContext, name: &str) -> HostResult<Operation> {
        let op = Operation::from_name(name)
            .ok_or_else(|| HostError::UnknownOperation(name.to_string()))?;

        if self.host.enforce_grants() {
            if let Some(grant) = op.grant() {
                if !ctx.info.script.is_granted(&grant) {
                    return Err(HostError::NotGranted(grant));
                }
            }
        }

        if op.is_deprecated() {
            tracing::debug!("{} called deprecated {}", ctx.namespace, op.name());
        }
        Ok(op)
    }

    /// Run a non-streaming operation
    pub async fn dispatch(
        &self,
        ctx: &ScriptContext,
        op: Operation,
        args: Value,
    ) -> HostResult<Option<Value>> {
        let host = &self.host;
        match op {
            Operation::Info => Ok(Some(
                serde_json::to_value(host.info(ctx))
                    .map_err(|e| HostError::invalid_arguments(op.name(), e))?,
            )),
            Operation::AddStyle => {
                let args: AddStyleArgs = parse_args(op, args)?;
                host.add_style(ctx, &args.css).await?;
                Ok(None)
            }
            Operation::SetValue => {
                let args: SetValueArgs = parse_args(op, args)?;
                host.set_value(ctx, &args.key, args.value).await?;
                Ok(None)
            }
            Operation::GetValue => {
                let args: GetValueArgs = parse_args(op, args)?;
                host.get_value(ctx, &args.key, args.default).await
            }
            Operation::DeleteValue => {
                let args: KeyArgs = parse_args(op, args)?;
                host.delete_value(ctx, &args.key).await?;
                Ok(None)
            }
            Operation::ListValues => Ok(Some(json!(host.list_values(ctx).await?))),
            Operation::GetTab => Ok(Some(host.get_tab(ctx).await)),
            Operation::SaveTab => {
                let args: SaveTabArgs = parse_args(op, args)?;
                host.save_tab(ctx, args.tab).await;
                Ok(None)
            }
            Operation::OpenInTab => {
                let args: OpenInTabArgs = parse_args(op, args)?;
                let tab = host.open_in_tab(ctx, &args.url, args.background).await?;
                Ok(Some(json!(tab)))
            }
            Operation::CloseTab => {
                let args: CloseTabArgs = parse_args(op, args)?;
                host.close_tab(ctx, args.tab_id).await?;
                Ok(None)
            }
            Operation::SetClipboard => {
                let args: SetClipboardArgs = parse_args(op, args)?;
                Ok(Some(json!(host.set_clipboard(&args.data, &args.mime_type).await?)))
            }
            Operation::XmlHttpRequest => Err(HostError::invalid_arguments(
                op.name(),
                "network operations are streamed",
            )),
        }
    }
}
