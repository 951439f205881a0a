//! Async wiring between the session machine and the runtime transport.
//!
//! Requests that expect an answer (start, screenshot, OCR) park a oneshot
//! waiter and await it under a timeout. Pushes arrive through
//! [`DebugController::handle_message`], which applies them to the machine and
//! wakes the matching waiter. A result nobody waits for any more is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use flowsmith_types::{EditorConfig, FlowError, Result};

use crate::events::DebugUpdate;
use crate::protocol::{
    routes, AckPayload, CompletedPayload, ErrorPayload, EventPayload, OcrRequest, OcrResult, ScreencapRequest,
    ScreencapResult, TaskPayload,
};
use crate::session::{DebugSession, DebugSessionMachine, DebugStatus, EventOutcome, NodeIndex, StartRequest};
use crate::transport::Transport;

type Queue<T> = VecDeque<(u64, oneshot::Sender<T>)>;

#[derive(Default)]
struct Waiters {
    next_id: u64,
    start: Option<oneshot::Sender<AckPayload>>,
    screencap: Queue<ScreencapResult>,
    ocr: Queue<OcrResult>,
}

impl Waiters {
    fn screencaps(&mut self) -> &mut Queue<ScreencapResult> {
        &mut self.screencap
    }

    fn ocrs(&mut self) -> &mut Queue<OcrResult> {
        &mut self.ocr
    }
}

/// Hand `value` to the oldest waiter still listening.
fn deliver<T>(queue: &mut Queue<T>, mut value: T, route: &str) {
    while let Some((_, tx)) = queue.pop_front() {
        match tx.send(value) {
            Ok(()) => return,
            Err(returned) => value = returned,
        }
    }
    tracing::debug!(route, "Result with no waiter discarded");
}

pub struct DebugController {
    transport: Arc<dyn Transport>,
    machine: Mutex<DebugSessionMachine>,
    waiters: Mutex<Waiters>,
    start_timeout: Duration,
    screenshot_timeout: Duration,
    ocr_timeout: Duration,
}

impl DebugController {
    pub fn new(config: &EditorConfig, transport: Arc<dyn Transport>, index: NodeIndex) -> Self {
        Self {
            transport,
            machine: Mutex::new(DebugSessionMachine::new(index)),
            waiters: Mutex::new(Waiters::default()),
            start_timeout: Duration::from_millis(config.start_timeout_ms),
            screenshot_timeout: Duration::from_millis(config.screenshot_timeout_ms),
            ocr_timeout: Duration::from_millis(config.ocr_timeout_ms),
        }
    }

    fn machine(&self) -> MutexGuard<'_, DebugSessionMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> DebugStatus {
        self.machine().status()
    }

    /// Copy of the current session state.
    pub fn session(&self) -> DebugSession {
        self.machine().session().clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DebugUpdate> {
        self.machine().subscribe()
    }

    /// Run `f` against the machine, e.g. to edit breakpoints or export logs.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut DebugSessionMachine) -> R) -> R {
        f(&mut self.machine())
    }

    pub fn refresh_index(&self, index: NodeIndex) {
        self.machine().refresh_index(index);
    }

    // -- Session commands ----------------------------------------------------

    /// Start a session and wait for the runtime to accept it. Returns the
    /// runtime's session id.
    ///
    /// An unknown entry fails before anything is sent. A refusal, rejection
    /// or missing acknowledgement returns the machine to idle.
    pub async fn start(&self, request: StartRequest) -> Result<String> {
        let payload = self.machine().start(request)?;
        let payload = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(e) => {
                self.machine().fail_start(&e.to_string());
                return Err(e.into());
            }
        };

        let (tx, rx) = oneshot::channel();
        self.waiters().start = Some(tx);

        if !self.transport.send(routes::START, payload).await {
            self.waiters().start = None;
            self.machine().fail_start("transport refused the start request");
            return Err(FlowError::Transport {
                route: routes::START.into(),
            });
        }

        match tokio::time::timeout(self.start_timeout, rx).await {
            Ok(Ok(ack)) => match (ack.success, ack.task_id) {
                (true, Some(id)) => Ok(id),
                _ => Err(FlowError::Session(
                    ack.error.unwrap_or_else(|| "debug start failed".into()),
                )),
            },
            Ok(Err(_)) => {
                self.machine().fail_start("start cancelled");
                Err(FlowError::Cancelled {
                    operation: "debug start".into(),
                })
            }
            Err(_) => {
                self.waiters().start = None;
                let timeout_ms = self.start_timeout.as_millis() as u64;
                self.machine().fail_start(&format!("no start acknowledgement within {timeout_ms}ms"));
                Err(FlowError::Timeout {
                    operation: "debug start".into(),
                    timeout_ms,
                })
            }
        }
    }

    /// Stop at once. The stop request is sent best effort; the machine is
    /// idle whether or not it arrives. Returns the stopped session id.
    pub async fn stop(&self) -> Option<String> {
        let stopped = self.machine().stop();
        // A start still waiting for its acknowledgement resolves as cancelled.
        self.waiters().start = None;

        let id = stopped?;
        let payload = serde_json::to_value(TaskPayload { task_id: id.clone() }).ok()?;
        if !self.transport.send(routes::STOP, payload).await {
            tracing::warn!(session = %id, "Stop request not delivered");
        }
        Some(id)
    }

    pub async fn pause(&self) -> Result<()> {
        let id = self.machine().pause()?;
        self.send_task(routes::PAUSE, id).await
    }

    pub async fn resume(&self) -> Result<()> {
        let id = self.machine().resume()?;
        self.send_task(routes::CONTINUE, id).await
    }

    pub async fn step(&self) -> Result<()> {
        let id = self.machine().step()?;
        self.send_task(routes::STEP, id).await
    }

    /// The transport connection dropped. Pending requests resolve as
    /// cancelled.
    pub fn disconnect(&self) {
        self.machine().disconnect();
        *self.waiters() = Waiters::default();
    }

    async fn send_task(&self, route: &'static str, task_id: String) -> Result<()> {
        let payload = serde_json::to_value(TaskPayload { task_id })?;
        if self.transport.send(route, payload).await {
            Ok(())
        } else {
            tracing::warn!(route, "Debug command not delivered");
            Err(FlowError::Transport { route: route.into() })
        }
    }

    // -- Remote requests -----------------------------------------------------

    /// Request a screenshot. Returns the base64 image.
    pub async fn request_screenshot(&self, request: ScreencapRequest) -> Result<String> {
        let payload = serde_json::to_value(&request)?;
        let result = self
            .request(routes::REQUEST_SCREENCAP, payload, self.screenshot_timeout, Waiters::screencaps)
            .await?;
        match (result.success, result.image) {
            (true, Some(image)) => Ok(image),
            _ => Err(FlowError::Session(format!(
                "screenshot failed: {}",
                result.error.unwrap_or_else(|| "no image returned".into())
            ))),
        }
    }

    /// Run OCR over a region. `None` means the runtime found no text.
    pub async fn request_ocr(&self, request: OcrRequest) -> Result<Option<String>> {
        let payload = serde_json::to_value(&request)?;
        let result = self
            .request(routes::OCR_RECOGNIZE, payload, self.ocr_timeout, Waiters::ocrs)
            .await?;
        if !result.success {
            return Err(FlowError::Session(format!(
                "OCR failed: {}",
                result.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        Ok(if result.no_content { None } else { result.text })
    }

    async fn request<T>(
        &self,
        route: &'static str,
        payload: Value,
        timeout: Duration,
        queue: fn(&mut Waiters) -> &mut Queue<T>,
    ) -> Result<T> {
        let (id, rx) = {
            let mut waiters = self.waiters();
            waiters.next_id += 1;
            let id = waiters.next_id;
            let (tx, rx) = oneshot::channel();
            queue(&mut waiters).push_back((id, tx));
            (id, rx)
        };

        if !self.transport.send(route, payload).await {
            queue(&mut self.waiters()).retain(|(w, _)| *w != id);
            return Err(FlowError::Transport { route: route.into() });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(FlowError::Cancelled {
                operation: route.into(),
            }),
            Err(_) => {
                queue(&mut self.waiters()).retain(|(w, _)| *w != id);
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(route, timeout_ms, "Request timed out");
                Err(FlowError::Timeout {
                    operation: route.into(),
                    timeout_ms,
                })
            }
        }
    }

    // -- Pushes --------------------------------------------------------------

    /// Apply a message pushed by the runtime. Malformed payloads and unknown
    /// routes are logged and dropped.
    pub fn handle_message(&self, route: &str, payload: Value) {
        match route {
            routes::STARTED => {
                if let Some(ack) = parse::<AckPayload>(route, payload) {
                    self.on_started(ack);
                }
            }
            routes::STOPPED => {
                if let Some(ack) = parse::<AckPayload>(route, payload) {
                    self.on_stopped(ack);
                }
            }
            routes::EVENT => {
                if let Some(event) = parse::<EventPayload>(route, payload) {
                    let outcome = self.machine().handle_event(&event);
                    if let EventOutcome::Paused { node_id, reason } = outcome {
                        tracing::debug!(node = ?node_id, reason = ?reason, "Paused by event");
                    }
                }
            }
            routes::COMPLETED => {
                if let Some(done) = parse::<CompletedPayload>(route, payload) {
                    self.machine().on_completed(&done.task_id);
                }
            }
            routes::ERROR => {
                if let Some(err) = parse::<ErrorPayload>(route, payload) {
                    let message = if err.error.is_empty() { "debug error" } else { err.error.as_str() };
                    self.machine().on_error(err.task_id.as_deref(), message);
                }
            }
            routes::SCREENCAP_RESULT => {
                if let Some(result) = parse::<ScreencapResult>(route, payload) {
                    deliver(&mut self.waiters().screencap, result, route);
                }
            }
            routes::OCR_RESULT => {
                if let Some(result) = parse::<OcrResult>(route, payload) {
                    deliver(&mut self.waiters().ocr, result, route);
                }
            }
            _ => tracing::debug!(route, "Unhandled route"),
        }
    }

    fn on_started(&self, ack: AckPayload) {
        {
            let mut machine = self.machine();
            match (ack.success, ack.task_id.as_deref()) {
                (true, Some(id)) => {
                    machine.on_started(id);
                }
                _ => {
                    machine.fail_start(ack.error.as_deref().unwrap_or("debug start failed"));
                }
            }
        }
        if let Some(tx) = self.waiters().start.take() {
            let _ = tx.send(ack);
        }
    }

    fn on_stopped(&self, ack: AckPayload) {
        if !ack.success {
            tracing::warn!(error = ?ack.error, "Runtime reported a failed stop");
        }
        let mut machine = self.machine();
        let current = machine.session().session_id.clone();
        if current.is_some() && current == ack.task_id {
            // The runtime stopped on its own.
            machine.stop();
        } else {
            tracing::debug!(task = ?ack.task_id, "Stop acknowledgement for an inactive session");
        }
    }
}

fn parse<T: DeserializeOwned>(route: &str, payload: Value) -> Option<T> {
    serde_json::from_value(payload)
        .map_err(|e| tracing::warn!(route, error = %e, "Malformed payload dropped"))
        .ok()
}

impl std::fmt::Debug for DebugController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugController")
            .field("status", &self.status())
            .field("start_timeout", &self.start_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use serde_json::json;

    fn controller() -> (Arc<RecordingTransport>, DebugController) {
        let transport = Arc::new(RecordingTransport::new());
        let mut index = NodeIndex::new("");
        index.insert("1", "Start");
        let ctrl = DebugController::new(&EditorConfig::default(), transport.clone(), index);
        (transport, ctrl)
    }

    #[tokio::test]
    async fn start_waits_for_acknowledgement() {
        let (transport, ctrl) = controller();
        let (started, ()) = tokio::join!(ctrl.start(StartRequest::new(vec!["res".into()], "Start", "c1")), async {
            ctrl.handle_message(routes::STARTED, json!({ "success": true, "task_id": "t9" }));
        });
        assert_eq!(started.unwrap(), "t9");
        assert_eq!(ctrl.status(), DebugStatus::Running);
        assert_eq!(transport.sent_on(routes::START)[0]["entry"], "Start");
    }

    #[tokio::test]
    async fn rejected_start_returns_to_idle() {
        let (_, ctrl) = controller();
        let (started, ()) = tokio::join!(ctrl.start(StartRequest::new(vec![], "Start", "c1")), async {
            ctrl.handle_message(routes::STARTED, json!({ "success": false, "error": "no device" }));
        });
        assert!(matches!(started, Err(FlowError::Session(ref m)) if m == "no device"));
        assert_eq!(ctrl.status(), DebugStatus::Idle);
    }

    #[tokio::test]
    async fn unknown_entry_sends_nothing() {
        let (transport, ctrl) = controller();
        let err = ctrl.start(StartRequest::new(vec![], "Missing", "c1")).await.unwrap_err();
        assert!(matches!(err, FlowError::EntryNotFound { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn refused_send_fails_start() {
        let (transport, ctrl) = controller();
        transport.set_connected(false);
        let err = ctrl.start(StartRequest::new(vec![], "Start", "c1")).await.unwrap_err();
        assert!(matches!(err, FlowError::Transport { .. }));
        assert_eq!(ctrl.status(), DebugStatus::Idle);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let (_, ctrl) = controller();
        ctrl.handle_message(routes::EVENT, json!({ "unexpected": true }));
        ctrl.handle_message("/lte/unknown", json!({}));
        assert_eq!(ctrl.status(), DebugStatus::Idle);
    }

    #[tokio::test]
    async fn ocr_no_content_is_none() {
        let (_, ctrl) = controller();
        let request = OcrRequest {
            controller_id: "c1".into(),
            resource_id: None,
            roi: [0, 0, 10, 10],
        };
        let (text, ()) = tokio::join!(ctrl.request_ocr(request), async {
            ctrl.handle_message(routes::OCR_RESULT, json!({ "success": true, "no_content": true }));
        });
        assert_eq!(text.unwrap(), None);
    }
}
