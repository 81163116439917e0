//! # Record Assembly and Fan-Out
//!
//! [`Telemetry`] is the single object the hooks talk to. It owns the per-call
//! state (correlator, channel registry), knows how to stamp records with the
//! configured source identity, and hands every finished record to each
//! registered [`RecordSink`].
//!
//! ```text
//!  hooks ──▶ Telemetry::emit ──┬──▶ RecordStore   (same-process readers)
//!                              └──▶ Transport     (observer process)
//! ```
//!
//! Sinks are shielded one by one: a faulting sink neither reaches the hook nor
//! prevents the remaining sinks from seeing the record.

use omapi_scope_common::StackFrame;
use std::fmt;
use std::sync::Arc;

use crate::capture::{
    shielded, CallCorrelator, ChannelRegistry, NoStackSource, StackSource, StackTraceFilter,
};
use crate::config::{TelemetryConfig, VerbosityToggle};
use crate::domain::TransportError;
use crate::record::{CallRecord, RecordBuilder};
use crate::store::RecordStore;
use crate::transport::Transport;

/// Function name of the record announcing that hooks are live.
pub const ATTACH_FUNCTION: &str = "Application.attach";

/// Consumer of finished records.
pub trait RecordSink: Send + Sync {
    fn accept(&self, record: &CallRecord);
}

pub struct Telemetry {
    config: TelemetryConfig,
    sinks: Vec<Arc<dyn RecordSink>>,
    correlator: CallCorrelator,
    channels: ChannelRegistry,
    stacks: Arc<dyn StackSource>,
    stack_filter: StackTraceFilter,
}

impl Telemetry {
    #[must_use]
    pub fn builder(config: TelemetryConfig) -> TelemetryBuilder {
        TelemetryBuilder {
            config,
            sinks: Vec::new(),
            stacks: Arc::new(NoStackSource),
        }
    }

    /// Telemetry feeding `store` and the observer socket named in `config`.
    ///
    /// # Errors
    /// Returns an error if the transport worker cannot be started.
    pub fn connect(
        config: TelemetryConfig,
        store: Arc<RecordStore>,
    ) -> Result<Self, TransportError> {
        let transport = Transport::unix_socket(&config.socket_path, config.verbosity.clone())?;
        Ok(Self::builder(config).sink(store).sink(Arc::new(transport)).build())
    }

    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    #[must_use]
    pub fn source_identity(&self) -> &str {
        &self.config.source_identity
    }

    #[must_use]
    pub fn verbosity(&self) -> &VerbosityToggle {
        &self.config.verbosity
    }

    #[must_use]
    pub fn correlator(&self) -> &CallCorrelator {
        &self.correlator
    }

    #[must_use]
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Filter for stack queries made by the instrumented program.
    #[must_use]
    pub fn stack_filter(&self) -> &StackTraceFilter {
        &self.stack_filter
    }

    /// Start a record for `function_name` from this process.
    #[must_use]
    pub fn record(&self, function_name: impl Into<String>) -> RecordBuilder {
        CallRecord::builder(self.config.source_identity.as_str(), function_name)
    }

    /// Current call stack, trimmed to the configured start frame.
    ///
    /// `None` when the host can't report a stack, the stack is empty, or
    /// capturing it faulted.
    #[must_use]
    pub fn capture_stack(&self) -> Option<Vec<StackFrame>> {
        shielded("stack capture", || {
            self.stacks
                .current_stack()
                .map(|frames| self.config.capture_start.trim(frames))
        })
        .ok()
        .flatten()
        .filter(|frames| !frames.is_empty())
    }

    /// Hand `record` to every sink.
    pub fn emit(&self, record: &CallRecord) {
        for sink in &self.sinks {
            shielded("record sink", || sink.accept(record)).ok();
        }
    }

    /// Emit the record announcing that hooks are installed in this process.
    pub fn announce_attach(&self) {
        let details = format!("OMAPI hooks installed for package: {}", self.source_identity());
        let attach = shielded(ATTACH_FUNCTION, || {
            self.record(ATTACH_FUNCTION).other(Some(details))
        });
        if let Ok(record) = attach {
            self.emit(&record);
        }
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .field("in_flight", &self.correlator.in_flight())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Telemetry`].
pub struct TelemetryBuilder {
    config: TelemetryConfig,
    sinks: Vec<Arc<dyn RecordSink>>,
    stacks: Arc<dyn StackSource>,
}

impl TelemetryBuilder {
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn stack_source(mut self, stacks: impl StackSource + 'static) -> Self {
        self.stacks = Arc::new(stacks);
        self
    }

    #[must_use]
    pub fn build(self) -> Telemetry {
        let stack_filter = StackTraceFilter::new(self.config.signatures.clone());
        Telemetry {
            config: self.config,
            sinks: self.sinks,
            correlator: CallCorrelator::new(),
            channels: ChannelRegistry::new(),
            stacks: self.stacks,
            stack_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureStart;
    use omapi_scope_common::CallKind;

    struct Exploding;

    impl RecordSink for Exploding {
        fn accept(&self, _: &CallRecord) {
            panic!("sink fault");
        }
    }

    struct FixedStack(Vec<StackFrame>);

    impl StackSource for FixedStack {
        fn current_stack(&self) -> Option<Vec<StackFrame>> {
            Some(self.0.clone())
        }
    }

    struct PanickingStack;

    impl StackSource for PanickingStack {
        fn current_stack(&self) -> Option<Vec<StackFrame>> {
            panic!("runtime refused stack walk");
        }
    }

    #[test]
    fn test_faulting_sink_does_not_starve_others() {
        let store = Arc::new(RecordStore::new());
        let telemetry = Telemetry::builder(TelemetryConfig::new("com.example.wallet"))
            .sink(Arc::new(Exploding))
            .sink(store.clone())
            .build();

        telemetry.emit(&telemetry.record("Channel.transmit").transmit(None, None, None));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_announce_attach() {
        let store = Arc::new(RecordStore::new());
        let telemetry = Telemetry::builder(TelemetryConfig::new("com.example.wallet"))
            .sink(store.clone())
            .build();
        telemetry.announce_attach();

        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), CallKind::Other);
        assert_eq!(records[0].function_name(), ATTACH_FUNCTION);
        assert_eq!(
            records[0].details(),
            Some("OMAPI hooks installed for package: com.example.wallet")
        );
    }

    #[test]
    fn test_capture_stack_trims_to_start() {
        let frames = vec![
            StackFrame::new("dalvik.system.VMStack", "getThreadStackTrace"),
            StackFrame::new("de.robv.android.xposed.XC_MethodHook", "callBeforeHookedMethod"),
            StackFrame::new("com.example.wallet.Pay", "run"),
        ];
        let telemetry = Telemetry::builder(TelemetryConfig::new("pkg"))
            .stack_source(FixedStack(frames))
            .build();

        let stack = telemetry.capture_stack().unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[1].method_name, "run");
    }

    #[test]
    fn test_capture_stack_absorbs_fault() {
        let config = TelemetryConfig::new("pkg").with_capture_start(CaptureStart::whole_stack());
        let telemetry = Telemetry::builder(config).stack_source(PanickingStack).build();
        assert!(telemetry.capture_stack().is_none());
    }

    #[test]
    fn test_records_carry_source_identity() {
        let telemetry = Telemetry::builder(TelemetryConfig::new("com.example.wallet")).build();
        let record = telemetry.record("Channel.close").close(None);
        assert_eq!(record.source_identity(), "com.example.wallet");
        assert_eq!(telemetry.sink_count(), 0);
    }
}
