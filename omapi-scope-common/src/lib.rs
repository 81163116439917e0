//! # Shared Wire Schema (Instrumented Process ↔ Observer)
//!
//! Defines the data structures and constants shared between the instrumented
//! side (hooks running inside the observed process) and the observer process
//! that stores and displays call records. Both sides must agree on field names
//! and value spellings, so everything that crosses the process boundary lives
//! here.
//!
//! ## Key Types
//!
//! - [`RecordPayload`] - One call record as it travels over the socket
//! - [`CallKind`] - Which group of payload fields is meaningful
//! - [`Verbosity`] - Full or reduced payloads
//! - [`StackFrame`] - One frame of a captured call stack

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Number of records kept by a record store before the oldest is evicted.
pub const MAX_RECORDS: usize = 1000;

/// Socket the observer listens on when nothing else is configured.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/omapi-scope/records.sock";

/// Environment variable overriding the observer socket path.
pub const ENV_SOCKET_PATH: &str = "OMAPI_SCOPE_SOCKET";

/// Environment variable selecting reduced payloads (`1`/`true` or `0`/`false`).
pub const ENV_REDUCED_VERBOSITY: &str = "OMAPI_SCOPE_REDUCED";

/// Full timestamp format (`2026-01-31 13:45:07.123`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Short timestamp format used in list displays (`13:45:07.123`).
pub const SHORT_TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

// ============================================================================
// Call Kind
// ============================================================================

/// Category of an observed call.
///
/// The kind decides which payload fields carry data:
/// - `Transmit`: `apduCommand`, `apduResponse`, and `aid` when the channel is known
/// - `OpenChannel`: `aid` and `selectResponse`
/// - `Close`: `aid` of the channel being closed, when known
/// - `Other`: `details`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Transmit,
    OpenChannel,
    Close,
    Other,
}

impl CallKind {
    /// Wire spelling of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Transmit => "transmit",
            CallKind::OpenChannel => "open_channel",
            CallKind::Close => "close",
            CallKind::Other => "other",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Verbosity
// ============================================================================

/// How much of a record is shipped to the observer.
///
/// `Reduced` keeps only timestamps, source identity, function name, call kind,
/// elapsed time and error. Wire bytes, selectors, call stacks and thread/process
/// detail are left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Full,
    Reduced,
}

// ============================================================================
// Stack Frames
// ============================================================================

/// A single frame of a call stack, as reported by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Declaring class or module path (e.g. `android.se.omapi.Channel`)
    pub class_name: String,
    /// Method or function name (e.g. `transmit`)
    pub method_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

impl StackFrame {
    #[must_use]
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            file_name: None,
            line_number: None,
        }
    }

    /// Attach a source location to the frame.
    #[must_use]
    pub fn at(mut self, file_name: impl Into<String>, line_number: u32) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = Some(line_number);
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)?;
        match (&self.file_name, self.line_number) {
            (Some(file), Some(line)) => write!(f, "({file}:{line})"),
            (Some(file), None) => write!(f, "({file})"),
            _ => f.write_str("(Unknown Source)"),
        }
    }
}

// ============================================================================
// Record Payload
// ============================================================================

/// One call record on the wire, serialized as a single JSON object per line.
///
/// Field names match the observer's schema exactly. Absent fields are omitted
/// from the encoding; a reduced payload simply leaves the detail fields `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    pub timestamp: String,
    #[serde(rename = "shortTimestamp")]
    pub short_timestamp: String,
    #[serde(rename = "packageName")]
    pub package_name: String,
    #[serde(rename = "functionName")]
    pub function_name: String,
    #[serde(rename = "type")]
    pub kind: CallKind,
    #[serde(rename = "apduCommand", default, skip_serializing_if = "Option::is_none")]
    pub apdu_command: Option<String>,
    #[serde(rename = "apduResponse", default, skip_serializing_if = "Option::is_none")]
    pub apdu_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aid: Option<String>,
    #[serde(rename = "selectResponse", default, skip_serializing_if = "Option::is_none")]
    pub select_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "threadId", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
    #[serde(rename = "threadName", default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
    #[serde(rename = "processId", default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(rename = "executionTimeMs")]
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "stackTrace", default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<StackFrame>>,
}

impl RecordPayload {
    /// True when the payload carries a non-empty error description.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}
