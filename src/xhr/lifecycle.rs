use serde::{Deserialize, Serialize};

/// Lifecycle stage of one network operation
///
/// Happy path: `Unsent → Opened → HeadersReceived → Loading → Done`.
/// `Aborted`, `Errored` and `TimedOut` are reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    #[default]
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
    Aborted,
    Errored,
    TimedOut,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Errored | Self::TimedOut)
    }

    /// `XMLHttpRequest.readyState` value for this stage
    pub fn ready_state(self) -> u8 {
        match self {
            Self::Unsent => 0,
            Self::Opened => 1,
            Self::HeadersReceived => 2,
            Self::Loading => 3,
            Self::Done | Self::Aborted | Self::Errored | Self::TimedOut => 4,
        }
    }

    /// Wire name of the stage
    pub fn name(self) -> &'static str {
        match self {
            Self::Unsent => "unsent",
            Self::Opened => "opened",
            Self::HeadersReceived => "headers-received",
            Self::Loading => "loading",
            Self::Done => "done",
            Self::Aborted => "aborted",
            Self::Errored => "errored",
            Self::TimedOut => "timed-out",
        }
    }
}

/// Notification names, matching the `on<event>` hooks of `GM.xmlHttpRequest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XhrEventKind {
    ReadyStateChange,
    LoadStart,
    Progress,
    Load,
    Error,
    Timeout,
    Abort,
    LoadEnd,
}

impl XhrEventKind {
    /// Events that must not fire once an operation was aborted
    pub fn is_happy_path(self) -> bool {
        matches!(
            self,
            Self::ReadyStateChange | Self::LoadStart | Self::Progress | Self::Load
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadyStateChange => "readystatechange",
            Self::LoadStart => "loadstart",
            Self::Progress => "progress",
            Self::Load => "load",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Abort => "abort",
            Self::LoadEnd => "loadend",
        }
    }
}

/// Transition table for one network operation
///
/// Each transition returns the notifications to emit, in order. Transitions
/// that do not apply to the current stage (including everything after a
/// terminal stage) return nothing and leave the stage unchanged.
#[derive(Debug, Default)]
pub struct Lifecycle {
    stage: Stage,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Request opened and sent
    pub fn open(&mut self) -> Vec<XhrEventKind> {
        self.advance(&[Stage::Unsent], Stage::Opened, &[
            XhrEventKind::ReadyStateChange,
            XhrEventKind::LoadStart,
        ])
    }

    /// Status line and headers arrived
    pub fn headers_received(&mut self) -> Vec<XhrEventKind> {
        self.advance(&[Stage::Opened], Stage::HeadersReceived, &[
            XhrEventKind::ReadyStateChange,
        ])
    }

    /// More body bytes arrived
    pub fn progress(&mut self) -> Vec<XhrEventKind> {
        match self.stage {
            Stage::HeadersReceived => {
                self.stage = Stage::Loading;
                vec![XhrEventKind::ReadyStateChange, XhrEventKind::Progress]
            }
            Stage::Loading => vec![XhrEventKind::Progress],
            other => self.ignored(other, "progress"),
        }
    }

    /// Body fully received
    pub fn complete(&mut self) -> Vec<XhrEventKind> {
        self.advance(&[Stage::HeadersReceived, Stage::Loading], Stage::Done, &[
            XhrEventKind::ReadyStateChange,
            XhrEventKind::Load,
            XhrEventKind::LoadEnd,
        ])
    }

    pub fn abort(&mut self) -> Vec<XhrEventKind> {
        self.interrupt(Stage::Aborted, XhrEventKind::Abort)
    }

    pub fn fail(&mut self) -> Vec<XhrEventKind> {
        self.interrupt(Stage::Errored, XhrEventKind::Error)
    }

    pub fn time_out(&mut self) -> Vec<XhrEventKind> {
        self.interrupt(Stage::TimedOut, XhrEventKind::Timeout)
    }

    fn advance(&mut self, from: &[Stage], to: Stage, events: &[XhrEventKind]) -> Vec<XhrEventKind> {
        if !from.contains(&self.stage) {
            return self.ignored(self.stage, events.last().map_or("?", |e| e.name()));
        }
        self.stage = to;
        events.to_vec()
    }

    fn interrupt(&mut self, to: Stage, event: XhrEventKind) -> Vec<XhrEventKind> {
        if self.stage.is_terminal() {
            return self.ignored(self.stage, event.name());
        }
        self.stage = to;
        vec![event, XhrEventKind::LoadEnd]
    }

    fn ignored(&self, stage: Stage, transition: &str) -> Vec<XhrEventKind> {
        tracing::trace!(?stage, "Ignoring {} transition", transition);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::XhrEventKind::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_happy_path_events() {
        let mut lc = Lifecycle::new();
        let mut events = Vec::new();
        events.extend(lc.open());
        events.extend(lc.headers_received());
        events.extend(lc.progress());
        events.extend(lc.progress());
        events.extend(lc.complete());

        assert_eq!(
            events,
            vec![
                ReadyStateChange,
                LoadStart,
                ReadyStateChange,
                ReadyStateChange,
                Progress,
                Progress,
                ReadyStateChange,
                Load,
                LoadEnd,
            ]
        );
        assert_eq!(lc.stage(), Stage::Done);
    }

    #[test]
    fn test_complete_without_body() {
        let mut lc = Lifecycle::new();
        lc.open();
        lc.headers_received();
        assert_eq!(lc.complete(), vec![ReadyStateChange, Load, LoadEnd]);
    }

    #[test]
    fn test_abort_from_every_non_terminal_stage() {
        let setups: [fn(&mut Lifecycle); 4] = [
            |_| {},
            |lc| {
                lc.open();
            },
            |lc| {
                lc.open();
                lc.headers_received();
            },
            |lc| {
                lc.open();
                lc.headers_received();
                lc.progress();
            },
        ];

        for setup in setups {
            let mut lc = Lifecycle::new();
            setup(&mut lc);
            assert_eq!(lc.abort(), vec![Abort, LoadEnd]);
            assert_eq!(lc.stage(), Stage::Aborted);
        }
    }

    #[test]
    fn test_abort_suppresses_happy_path() {
        let mut lc = Lifecycle::new();
        lc.open();
        lc.headers_received();
        assert_eq!(lc.abort(), vec![Abort, LoadEnd]);

        assert!(lc.progress().is_empty());
        assert!(lc.complete().is_empty());
        assert!(lc.abort().is_empty());
        assert!(lc.time_out().is_empty());
        assert_eq!(lc.stage(), Stage::Aborted);
    }

    #[test]
    fn test_abort_after_done_is_noop() {
        let mut lc = Lifecycle::new();
        lc.open();
        lc.headers_received();
        lc.complete();
        assert!(lc.abort().is_empty());
        assert_eq!(lc.stage(), Stage::Done);
    }

    #[test]
    fn test_timeout_and_error_paths() {
        let mut lc = Lifecycle::new();
        lc.open();
        assert_eq!(lc.time_out(), vec![Timeout, LoadEnd]);
        assert_eq!(lc.stage(), Stage::TimedOut);
        assert!(lc.complete().is_empty());

        let mut lc = Lifecycle::new();
        lc.open();
        assert_eq!(lc.fail(), vec![Error, LoadEnd]);
        assert_eq!(lc.stage(), Stage::Errored);
    }

    #[test]
    fn test_out_of_order_transitions_ignored() {
        let mut lc = Lifecycle::new();
        assert!(lc.headers_received().is_empty());
        assert!(lc.complete().is_empty());
        assert!(lc.progress().is_empty());
        assert_eq!(lc.stage(), Stage::Unsent);
    }

    #[test]
    fn test_ready_state_values() {
        assert_eq!(Stage::Unsent.ready_state(), 0);
        assert_eq!(Stage::Loading.ready_state(), 3);
        assert_eq!(Stage::TimedOut.ready_state(), 4);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_value(Stage::HeadersReceived).unwrap(), "headers-received");
        assert_eq!(serde_json::to_value(Stage::TimedOut).unwrap(), "timed-out");
        assert_eq!(serde_json::to_value(ReadyStateChange).unwrap(), "readystatechange");
        assert_eq!(serde_json::to_value(LoadEnd).unwrap(), "loadend");
    }
}
