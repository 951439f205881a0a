//! Wire routes and payloads exchanged with the automation runtime.
//!
//! Requests travel on `/mpe/*` and `/etl/*` routes, pushes from the runtime
//! arrive on `/lte/*`. Payload fields follow the runtime's snake_case names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod routes {
    // Requests.
    pub const START: &str = "/mpe/debug/start";
    pub const STOP: &str = "/mpe/debug/stop";
    pub const PAUSE: &str = "/mpe/debug/pause";
    pub const CONTINUE: &str = "/mpe/debug/continue";
    pub const STEP: &str = "/mpe/debug/step";
    pub const REQUEST_SCREENCAP: &str = "/etl/mfw/request_screencap";
    pub const OCR_RECOGNIZE: &str = "/etl/utility/ocr_recognize";

    // Pushes.
    pub const STARTED: &str = "/lte/debug/started";
    pub const STOPPED: &str = "/lte/debug/stopped";
    pub const EVENT: &str = "/lte/debug/event";
    pub const COMPLETED: &str = "/lte/debug/completed";
    pub const ERROR: &str = "/lte/debug/error";
    pub const SCREENCAP_RESULT: &str = "/lte/mfw/screencap_result";
    pub const OCR_RESULT: &str = "/lte/utility/ocr_result";
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub resource_path: Vec<String>,
    /// Document key of the entry node.
    pub entry: String,
    pub controller_id: String,
}

/// Body of stop / pause / continue / step requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreencapRequest {
    pub controller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cache: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_long_side: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_short_side: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_raw_size: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRequest {
    pub controller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// `[x, y, width, height]`
    pub roi: [i64; 4],
}

// ---------------------------------------------------------------------------
// Pushes
// ---------------------------------------------------------------------------

/// Acknowledgement on `/lte/debug/started` and `/lte/debug/stopped`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AckPayload {
    pub success: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_name: String,
    pub task_id: String,
    /// Runtime node name (a document key), not a graph id.
    #[serde(default)]
    pub node_id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub detail: Value,
}

impl EventPayload {
    pub fn new(event_name: &str, task_id: &str, node: &str, timestamp: i64) -> Self {
        Self {
            event_name: event_name.to_string(),
            task_id: task_id.to_string(),
            node_id: node.to_string(),
            timestamp,
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreencapResult {
    pub success: bool,
    /// Base64 encoded image.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OcrResult {
    pub success: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub no_content: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugEventKind {
    NodeStarting,
    NodeSucceeded,
    NodeFailed,
    RecoStarting,
    RecoSucceeded,
    RecoFailed,
    ActionStarting,
    ActionSucceeded,
    ActionFailed,
    DebugPaused,
}

impl DebugEventKind {
    /// Parse an `event_name`. Older runtimes send `node_running`,
    /// `node_completed`, `recognition` and `action`; those map onto the
    /// current names.
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "node_starting" | "node_running" => Self::NodeStarting,
            "node_succeeded" | "node_completed" => Self::NodeSucceeded,
            "node_failed" => Self::NodeFailed,
            "reco_starting" => Self::RecoStarting,
            "reco_succeeded" | "recognition" => Self::RecoSucceeded,
            "reco_failed" => Self::RecoFailed,
            "action_starting" => Self::ActionStarting,
            "action_succeeded" | "action" => Self::ActionSucceeded,
            "action_failed" => Self::ActionFailed,
            "debug_paused" => Self::DebugPaused,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NodeStarting => "node_starting",
            Self::NodeSucceeded => "node_succeeded",
            Self::NodeFailed => "node_failed",
            Self::RecoStarting => "reco_starting",
            Self::RecoSucceeded => "reco_succeeded",
            Self::RecoFailed => "reco_failed",
            Self::ActionStarting => "action_starting",
            Self::ActionSucceeded => "action_succeeded",
            Self::ActionFailed => "action_failed",
            Self::DebugPaused => "debug_paused",
        }
    }
}

impl std::fmt::Display for DebugEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names_and_aliases() {
        assert_eq!(DebugEventKind::parse("node_starting"), Some(DebugEventKind::NodeStarting));
        assert_eq!(DebugEventKind::parse("node_running"), Some(DebugEventKind::NodeStarting));
        assert_eq!(DebugEventKind::parse("node_completed"), Some(DebugEventKind::NodeSucceeded));
        assert_eq!(DebugEventKind::parse("recognition"), Some(DebugEventKind::RecoSucceeded));
        assert_eq!(DebugEventKind::parse("bogus"), None);
        assert_eq!(DebugEventKind::ActionFailed.to_string(), "action_failed");
    }

    #[test]
    fn event_payload_defaults_optional_fields() {
        let payload: EventPayload =
            serde_json::from_value(json!({ "event_name": "node_starting", "task_id": "t1" })).unwrap();
        assert_eq!(payload.node_id, "");
        assert_eq!(payload.timestamp, 0);
        assert!(payload.detail.is_null());
    }

    #[test]
    fn screencap_request_skips_unset_fields() {
        let req = ScreencapRequest {
            controller_id: "c1".into(),
            target_long_side: Some(400),
            ..ScreencapRequest::default()
        };
        assert_eq!(
            serde_json::to_value(req).unwrap(),
            json!({ "controller_id": "c1", "target_long_side": 400 })
        );
    }
}
