//! Debug log export.

use chrono::{DateTime, Utc};
use serde::Serialize;

use flowsmith_types::Result;

use crate::session::{DebugSessionMachine, NodeExecutionRecord, RecognitionRecord, TestVerdict};

#[derive(Serialize)]
struct LogExport<'a> {
    run_id: &'a str,
    session_id: Option<&'a str>,
    resource_paths: &'a [String],
    entry: &'a str,
    started_at: Option<DateTime<Utc>>,
    status: &'static str,
    breakpoints: Vec<&'a str>,
    execution_history: Vec<LogRecord<'a>>,
    recognition_records: &'a [RecognitionRecord],
    verdict: Option<&'a TestVerdict>,
    error: Option<&'a str>,
    exported_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct LogRecord<'a> {
    #[serde(flatten)]
    record: &'a NodeExecutionRecord,
    duration_ms: Option<i64>,
}

fn clock_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ms.to_string())
}

impl DebugSessionMachine {
    /// Human readable session log.
    pub fn export_log_text(&self) -> String {
        let session = self.session();
        let or_na = |s: Option<&str>| s.filter(|s| !s.is_empty()).unwrap_or("N/A").to_string();
        let mut lines = vec![
            "======== Debug session log ========".to_string(),
            format!("Run: {}", or_na(Some(session.run_id.as_str()))),
            format!("Session: {}", or_na(session.session_id.as_deref())),
            format!("Resources: {}", or_na(Some(session.resource_paths.join(", ").as_str()))),
            format!("Entry: {}", or_na(Some(session.entry.as_str()))),
            format!(
                "Started: {}",
                session.started_at.map_or_else(|| "N/A".to_string(), |t| t.to_rfc3339())
            ),
            format!("Status: {}", session.status),
        ];
        if let Some(error) = &session.error {
            lines.push(format!("Error: {error}"));
        }
        lines.push(String::new());

        if !self.breakpoints().is_empty() {
            lines.push("===== Breakpoints =====".into());
            for id in self.breakpoints() {
                match self.index().label(id) {
                    Some(label) => lines.push(format!("- {label} ({id})")),
                    None => lines.push(format!("- {id}")),
                }
            }
            lines.push(String::new());
        }

        if !session.execution_history.is_empty() {
            lines.push("===== Execution history =====".into());
            for (i, record) in session.execution_history.iter().enumerate() {
                lines.push(format!("[{}] {} ({})", i + 1, record.name, record.node_id));
                lines.push(format!("  status: {:?}", record.status).to_lowercase());
                lines.push(format!("  start: {}", clock_time(record.started_at)));
                if let (Some(end), Some(duration)) = (record.ended_at, record.duration_ms()) {
                    lines.push(format!("  end: {}", clock_time(end)));
                    lines.push(format!("  duration: {duration}ms"));
                }
                if let Some(reco) = &record.recognition {
                    let hit = if record.recognition_hit == Some(true) { "hit" } else { "miss" };
                    lines.push(format!("  recognition: {hit} {reco}"));
                }
                if let Some(action) = &record.action {
                    let ok = if record.action_succeeded == Some(true) { "ok" } else { "failed" };
                    lines.push(format!("  action: {ok} {action}"));
                }
                if let Some(error) = &record.error {
                    lines.push(format!("  error: {error}"));
                }
            }
            lines.push(String::new());
        }

        if let Some(verdict) = &session.verdict {
            let outcome = if verdict.passed { "PASS" } else { "FAIL" };
            lines.push(format!("Verdict: {outcome} ({})", verdict.reason));
            lines.push(String::new());
        }

        lines.push("======== End of log ========".into());
        lines.join("\n")
    }

    /// Machine readable session log.
    pub fn export_log_json(&self) -> Result<String> {
        let session = self.session();
        let export = LogExport {
            run_id: &session.run_id,
            session_id: session.session_id.as_deref(),
            resource_paths: &session.resource_paths,
            entry: &session.entry,
            started_at: session.started_at,
            status: session.status.as_str(),
            breakpoints: self.breakpoints().iter().map(String::as_str).collect(),
            execution_history: session
                .execution_history
                .iter()
                .map(|record| LogRecord {
                    record,
                    duration_ms: record.duration_ms(),
                })
                .collect(),
            recognition_records: &session.recognition_records,
            verdict: session.verdict.as_ref(),
            error: session.error.as_deref(),
            exported_at: Utc::now(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::EventPayload;
    use crate::session::{DebugSessionMachine, NodeIndex, StartRequest};

    fn finished_run() -> DebugSessionMachine {
        let mut index = NodeIndex::new("");
        index.insert("1", "Start");
        let mut m = DebugSessionMachine::new(index);
        m.set_breakpoint("1");
        m.start(StartRequest::new(vec!["res/base".into()], "Start", "ctrl")).unwrap();
        m.on_started("t1");
        m.handle_event(&EventPayload::new("node_starting", "t1", "Start", 1_000));
        m.resume().unwrap();
        m.handle_event(&EventPayload::new("node_failed", "t1", "Start", 1_250).with_detail(serde_json::json!({"error": "timeout"})));
        m
    }

    #[test]
    fn text_log_lists_breakpoints_and_history() {
        let text = finished_run().export_log_text();
        assert!(text.starts_with("======== Debug session log ========"));
        assert!(text.contains("Session: t1"));
        assert!(text.contains("- Start (1)"));
        assert!(text.contains("[1] Start (1)"));
        assert!(text.contains("  status: failed"));
        assert!(text.contains("  duration: 250ms"));
        assert!(text.contains("  error: timeout"));
        assert!(text.ends_with("======== End of log ========"));
    }

    #[test]
    fn json_log_has_durations() {
        let json: serde_json::Value = serde_json::from_str(&finished_run().export_log_json().unwrap()).unwrap();
        assert_eq!(json["session_id"], "t1");
        assert_eq!(json["status"], "running");
        assert_eq!(json["breakpoints"], serde_json::json!(["1"]));
        assert_eq!(json["execution_history"][0]["duration_ms"], 250);
        assert_eq!(json["execution_history"][0]["node_id"], "1");
        assert!(json["exported_at"].is_string());
    }
}
