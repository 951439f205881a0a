//! Live debugging for Flowsmith pipelines.
//!
//! [`DebugSessionMachine`] is the synchronous state machine that turns the
//! runtime's execution events into per-node history. [`DebugController`]
//! drives it over a [`Transport`], waiting for acknowledgements and
//! screenshot/OCR results with timeouts.

pub mod controller;
pub mod events;
pub mod log;
pub mod protocol;
pub mod session;
pub mod transport;

pub use controller::DebugController;
pub use events::{DebugEmitter, DebugUpdate};
pub use protocol::{routes, DebugEventKind, EventPayload, OcrRequest, ScreencapRequest};
pub use session::{
    DebugSession, DebugSessionMachine, DebugStatus, EventOutcome, ExecutionStatus, IgnoreReason, NodeExecutionRecord,
    NodeIndex, PauseReason, Phase, RecognitionRecord, RecognitionStatus, StartRequest, TestMode, TestVerdict,
};
pub use transport::{RecordingTransport, Transport};
