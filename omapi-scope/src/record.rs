//! Structured call records
//!
//! A [`CallRecord`] is the telemetry unit produced for every observed call. The
//! call kind and its kind-specific fields are one enum ([`CallDetail`]), so a
//! record can't carry wire bytes and a select response at the same time.
//! Records are immutable once built.

use chrono::{DateTime, Local};
use omapi_scope_common::{CallKind, StackFrame, SHORT_TIMESTAMP_FORMAT, TIMESTAMP_FORMAT};
use std::fmt;

use crate::codec::{decode_command, decode_response};
use crate::domain::{current_thread_name, Pid, Tid};

/// Kind-specific content of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallDetail {
    Transmit {
        command_hex: Option<String>,
        response_hex: Option<String>,
        /// AID of the channel the command went through, when known
        selector: Option<String>,
    },
    OpenChannel {
        selector: Option<String>,
        selector_reply: Option<String>,
    },
    Close {
        selector: Option<String>,
    },
    Other {
        details: Option<String>,
    },
}

impl CallDetail {
    #[must_use]
    pub fn kind(&self) -> CallKind {
        match self {
            CallDetail::Transmit { .. } => CallKind::Transmit,
            CallDetail::OpenChannel { .. } => CallKind::OpenChannel,
            CallDetail::Close { .. } => CallKind::Close,
            CallDetail::Other { .. } => CallKind::Other,
        }
    }

    /// Detail of the given kind with every field empty.
    #[must_use]
    pub fn empty(kind: CallKind) -> Self {
        match kind {
            CallKind::Transmit => CallDetail::Transmit {
                command_hex: None,
                response_hex: None,
                selector: None,
            },
            CallKind::OpenChannel => CallDetail::OpenChannel {
                selector: None,
                selector_reply: None,
            },
            CallKind::Close => CallDetail::Close { selector: None },
            CallKind::Other => CallDetail::Other { details: None },
        }
    }
}

/// One observed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    timestamp: String,
    short_timestamp: String,
    source_identity: String,
    function_name: String,
    detail: CallDetail,
    thread_id: u64,
    thread_name: String,
    process_id: u32,
    elapsed_millis: u64,
    error: Option<String>,
    call_stack: Option<Vec<StackFrame>>,
}

impl CallRecord {
    /// Start building a record stamped with the current time, thread and process.
    #[must_use]
    pub fn builder(
        source_identity: impl Into<String>,
        function_name: impl Into<String>,
    ) -> RecordBuilder {
        RecordBuilder::new(source_identity, function_name)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn short_timestamp(&self) -> &str {
        &self.short_timestamp
    }

    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn kind(&self) -> CallKind {
        self.detail.kind()
    }

    pub fn detail(&self) -> &CallDetail {
        &self.detail
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed_millis
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    pub fn call_stack(&self) -> Option<&[StackFrame]> {
        self.call_stack.as_deref()
    }

    pub fn command_hex(&self) -> Option<&str> {
        match &self.detail {
            CallDetail::Transmit { command_hex, .. } => command_hex.as_deref(),
            _ => None,
        }
    }

    pub fn response_hex(&self) -> Option<&str> {
        match &self.detail {
            CallDetail::Transmit { response_hex, .. } => response_hex.as_deref(),
            _ => None,
        }
    }

    /// AID for open/close records, or for transmits on a known channel.
    pub fn selector(&self) -> Option<&str> {
        match &self.detail {
            CallDetail::Transmit { selector, .. }
            | CallDetail::OpenChannel { selector, .. }
            | CallDetail::Close { selector } => selector.as_deref(),
            CallDetail::Other { .. } => None,
        }
    }

    pub fn selector_reply(&self) -> Option<&str> {
        match &self.detail {
            CallDetail::OpenChannel { selector_reply, .. } => selector_reply.as_deref(),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match &self.detail {
            CallDetail::Other { details } => details.as_deref(),
            _ => None,
        }
    }

    /// Command rendered as `CLA INS P1 P2 ...`.
    pub fn formatted_command(&self) -> Option<String> {
        self.command_hex().map(decode_command)
    }

    /// Response rendered as `data SW1 SW2`.
    pub fn formatted_response(&self) -> Option<String> {
        self.response_hex().map(decode_response)
    }

    /// One-line summary used in logs: `[pkg] fn (kind) [TID:x, PID:y, Nms]`.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "[{}] {} ({}) [TID:{}, PID:{}, {}ms]",
            self.source_identity,
            self.function_name,
            self.kind(),
            self.thread_id,
            self.process_id,
            self.elapsed_millis
        );
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            line.push_str(" ERROR: ");
            line.push_str(error);
        }
        line
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error.as_deref().filter(|e| !e.is_empty()) {
            Some(error) => write!(
                f,
                "{} [{}] {} ERROR: {}",
                self.timestamp, self.source_identity, self.function_name, error
            ),
            None => write!(
                f,
                "{} [{}] {} ({})",
                self.timestamp,
                self.source_identity,
                self.function_name,
                self.kind()
            ),
        }
    }
}

/// Builder for [`CallRecord`].
///
/// Thread, process and timestamps are captured at construction; the overrides
/// exist for records rebuilt from a remote payload.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    timestamp: String,
    short_timestamp: String,
    source_identity: String,
    function_name: String,
    thread_id: u64,
    thread_name: String,
    process_id: u32,
    elapsed_millis: u64,
    error: Option<String>,
    call_stack: Option<Vec<StackFrame>>,
}

impl RecordBuilder {
    #[must_use]
    pub fn new(source_identity: impl Into<String>, function_name: impl Into<String>) -> Self {
        let now: DateTime<Local> = Local::now();
        Self {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            short_timestamp: now.format(SHORT_TIMESTAMP_FORMAT).to_string(),
            source_identity: source_identity.into(),
            function_name: function_name.into(),
            thread_id: Tid::current().0,
            thread_name: current_thread_name(),
            process_id: Pid::current().0,
            elapsed_millis: 0,
            error: None,
            call_stack: None,
        }
    }

    #[must_use]
    pub fn elapsed_millis(mut self, elapsed_millis: u64) -> Self {
        self.elapsed_millis = elapsed_millis;
        self
    }

    /// Attach a failure description. Empty descriptions are ignored.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        if !error.is_empty() {
            self.error = Some(error);
        }
        self
    }

    /// Attach a call stack. Empty stacks are ignored.
    #[must_use]
    pub fn call_stack(mut self, call_stack: Option<Vec<StackFrame>>) -> Self {
        self.call_stack = call_stack.filter(|s| !s.is_empty());
        self
    }

    #[must_use]
    pub fn timestamps(
        mut self,
        timestamp: impl Into<String>,
        short_timestamp: impl Into<String>,
    ) -> Self {
        self.timestamp = timestamp.into();
        self.short_timestamp = short_timestamp.into();
        self
    }

    #[must_use]
    pub fn thread(mut self, thread_id: u64, thread_name: impl Into<String>) -> Self {
        self.thread_id = thread_id;
        self.thread_name = thread_name.into();
        self
    }

    #[must_use]
    pub fn process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// Finish the record with its kind-specific content.
    #[must_use]
    pub fn build(self, detail: CallDetail) -> CallRecord {
        CallRecord {
            timestamp: self.timestamp,
            short_timestamp: self.short_timestamp,
            source_identity: self.source_identity,
            function_name: self.function_name,
            detail,
            thread_id: self.thread_id,
            thread_name: self.thread_name,
            process_id: self.process_id,
            elapsed_millis: self.elapsed_millis,
            error: self.error,
            call_stack: self.call_stack,
        }
    }

    #[must_use]
    pub fn transmit(
        self,
        command_hex: Option<String>,
        response_hex: Option<String>,
        selector: Option<String>,
    ) -> CallRecord {
        self.build(CallDetail::Transmit {
            command_hex,
            response_hex,
            selector,
        })
    }

    #[must_use]
    pub fn open_channel(
        self,
        selector: Option<String>,
        selector_reply: Option<String>,
    ) -> CallRecord {
        self.build(CallDetail::OpenChannel {
            selector,
            selector_reply,
        })
    }

    #[must_use]
    pub fn close(self, selector: Option<String>) -> CallRecord {
        self.build(CallDetail::Close { selector })
    }

    #[must_use]
    pub fn other(self, details: Option<String>) -> CallRecord {
        self.build(CallDetail::Other { details })
    }
}
