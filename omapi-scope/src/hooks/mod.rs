//! # Host-Facing Hook Adapters
//!
//! The interception host calls these around each observed OMAPI function:
//! `before` on entry, `after` on exit, both on the calling thread.
//!
//! | Hook                  | Intercepted function(s)                                  |
//! |-----------------------|----------------------------------------------------------|
//! | [`TransmitHook`]      | `Channel.transmit`, `[SYSTEM] Terminal.transmit`         |
//! | [`OpenChannelHook`]   | `Session.openBasicChannel`, `Session.openLogicalChannel` |
//! | [`CloseChannelHook`]  | `Channel.close`                                          |
//!
//! Hooks only observe. They never see or alter the observed call's return
//! value or error, and nothing they do (including a panic) escapes `before` or
//! `after`. A fault while assembling a record on exit is reported as an
//! error-tagged record of the hook's kind instead.

pub mod close_channel;
pub mod open_channel;
pub mod transmit;

use omapi_scope_common::{CallKind, StackFrame};
use std::sync::Arc;

pub use close_channel::CloseChannelHook;
pub use open_channel::OpenChannelHook;
pub use transmit::TransmitHook;

use crate::capture::{shielded, silence_shielded_panics, Completion, InvocationKey};
use crate::domain::CallSiteId;
use crate::record::{CallDetail, CallRecord};
use crate::telemetry::Telemetry;

/// A channel handle as seen by the hooks.
///
/// Channels are tracked by identity, so two handles compare equal only if they
/// are the same allocation.
pub trait ObservedChannel: Send + Sync + 'static {
    /// Device response to the SELECT issued when the channel was opened.
    fn select_response(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Every hook for one instrumented process.
#[derive(Debug)]
pub struct OmapiHooks {
    pub transmit: TransmitHook,
    pub terminal_transmit: TransmitHook,
    pub open_basic_channel: OpenChannelHook,
    pub open_logical_channel: OpenChannelHook,
    pub close_channel: CloseChannelHook,
}

impl OmapiHooks {
    /// Create all hooks and announce the attach.
    ///
    /// Also keeps faults absorbed inside the hooks away from the process
    /// panic hook, so the instrumented program's stderr stays untouched.
    #[must_use]
    pub fn install(telemetry: &Arc<Telemetry>) -> Self {
        silence_shielded_panics();
        let hooks = Self {
            transmit: TransmitHook::channel(Arc::clone(telemetry)),
            terminal_transmit: TransmitHook::terminal(Arc::clone(telemetry)),
            open_basic_channel: OpenChannelHook::basic(Arc::clone(telemetry)),
            open_logical_channel: OpenChannelHook::logical(Arc::clone(telemetry)),
            close_channel: CloseChannelHook::new(Arc::clone(telemetry)),
        };
        telemetry.announce_attach();
        hooks
    }
}

/// Take the entry slot for `key`, degrading to a zero-elapsed completion.
fn complete(telemetry: &Telemetry, site: CallSiteId, key: InvocationKey) -> Completion {
    shielded(site.as_str(), || telemetry.correlator().on_exit(site, key))
        .unwrap_or(Completion {
            slot: None,
            elapsed_millis: 0,
        })
}

/// Emit the record produced by `assemble`, or an error-tagged record of `kind`
/// if assembling faults. The error-tagged record keeps `call_stack`.
fn report(
    telemetry: &Telemetry,
    function_name: &str,
    kind: CallKind,
    error_prefix: &str,
    call_stack: Option<Vec<StackFrame>>,
    assemble: impl FnOnce() -> CallRecord,
) {
    match shielded(function_name, assemble) {
        Ok(record) => telemetry.emit(&record),
        Err(fault) => {
            let tagged = shielded(function_name, || {
                telemetry
                    .record(function_name)
                    .error(format!("{error_prefix}: {fault}"))
                    .call_stack(call_stack)
                    .build(CallDetail::empty(kind))
            });
            if let Ok(record) = tagged {
                telemetry.emit(&record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::store::RecordStore;

    fn wired() -> (Arc<Telemetry>, Arc<RecordStore>) {
        let store = Arc::new(RecordStore::new());
        let telemetry = Arc::new(
            Telemetry::builder(TelemetryConfig::new("com.example.wallet"))
                .sink(store.clone())
                .build(),
        );
        (telemetry, store)
    }

    #[test]
    fn test_install_announces_attach() {
        let (telemetry, store) = wired();
        let hooks = OmapiHooks::install(&telemetry);
        assert_eq!(hooks.terminal_transmit.function_name(), "[SYSTEM] Terminal.transmit");
        assert_eq!(store.snapshot()[0].function_name(), "Application.attach");
    }

    #[test]
    fn test_report_turns_fault_into_error_record() {
        let (telemetry, store) = wired();
        report(
            &telemetry,
            "Channel.transmit",
            CallKind::Transmit,
            "Error logging transmit",
            None,
            || panic!("decoder blew up"),
        );

        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), CallKind::Transmit);
        assert_eq!(records[0].error(), Some("Error logging transmit: decoder blew up"));
        assert_eq!(records[0].command_hex(), None);
    }

    #[test]
    fn test_error_record_keeps_entry_stack() {
        let (telemetry, store) = wired();
        let stack = vec![
            StackFrame::new("com.example.wallet.Pay", "charge").at("Pay.java", 88),
            StackFrame::new("com.example.wallet.Main", "onClick").at("Main.java", 12),
        ];
        report(
            &telemetry,
            "Channel.transmit",
            CallKind::Transmit,
            "Error logging transmit",
            Some(stack.clone()),
            || panic!("decoder blew up"),
        );

        let records = store.snapshot();
        assert!(records[0].has_error());
        assert_eq!(records[0].call_stack(), Some(stack.as_slice()));
    }

    #[test]
    fn test_complete_without_entry_is_zero_elapsed() {
        let (telemetry, _) = wired();
        let completion =
            complete(&telemetry, CallSiteId("Channel.close"), InvocationKey::current_thread());
        assert!(completion.slot.is_none());
        assert_eq!(completion.elapsed_millis, 0);
    }
}
