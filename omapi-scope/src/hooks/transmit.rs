//! Hooks around APDU exchange: `Channel.transmit` in client processes and
//! `Terminal.transmit` inside the system secure-element service.

use omapi_scope_common::CallKind;
use std::sync::Arc;

use super::{complete, report, ObservedChannel};
use crate::capture::{shielded, CorrelationSlot, InvocationKey};
use crate::codec::encode_hex;
use crate::domain::CallSiteId;
use crate::telemetry::Telemetry;

const CHANNEL_TRANSMIT: &str = "Channel.transmit";
const TERMINAL_TRANSMIT: &str = "[SYSTEM] Terminal.transmit";
const ERROR_PREFIX: &str = "Error logging transmit";

#[derive(Debug)]
pub struct TransmitHook {
    telemetry: Arc<Telemetry>,
    site: CallSiteId,
}

impl TransmitHook {
    /// Hook for `Channel.transmit` in an application process.
    #[must_use]
    pub fn channel(telemetry: Arc<Telemetry>) -> Self {
        Self {
            telemetry,
            site: CallSiteId(CHANNEL_TRANSMIT),
        }
    }

    /// Hook for the system service's `Terminal.transmit`, which has no channel.
    #[must_use]
    pub fn terminal(telemetry: Arc<Telemetry>) -> Self {
        Self {
            telemetry,
            site: CallSiteId(TERMINAL_TRANSMIT),
        }
    }

    #[must_use]
    pub fn function_name(&self) -> &'static str {
        self.site.as_str()
    }

    /// Entry: remember the command, start time and call stack.
    pub fn before(&self, key: InvocationKey, command: &[u8]) {
        shielded(self.site.as_str(), || {
            let slot = CorrelationSlot::start()
                .with_command(Some(encode_hex(command)))
                .with_stack(self.telemetry.capture_stack());
            self.telemetry.correlator().on_enter(self.site, key, slot);
        })
        .ok();
    }

    /// Exit without a known channel. `response` is `None` when the call failed.
    pub fn after(&self, key: InvocationKey, response: Option<&[u8]>) {
        self.finish(key, response, || None);
    }

    /// Exit for a transmit on `channel`; the record carries the channel's AID
    /// when the channel was opened under observation.
    pub fn after_on_channel<C: ObservedChannel>(
        &self,
        key: InvocationKey,
        channel: &Arc<C>,
        response: Option<&[u8]>,
    ) {
        self.finish(key, response, || self.telemetry.channels().lookup(channel));
    }

    fn finish(
        &self,
        key: InvocationKey,
        response: Option<&[u8]>,
        selector: impl FnOnce() -> Option<String>,
    ) {
        let completion = complete(&self.telemetry, self.site, key);
        let function_name = self.site.as_str();

        let (command_hex, call_stack) =
            completion.slot.map(CorrelationSlot::into_parts).unwrap_or_default();
        let fallback_stack = call_stack.clone();

        report(
            &self.telemetry,
            function_name,
            CallKind::Transmit,
            ERROR_PREFIX,
            fallback_stack,
            || {
                self.telemetry
                    .record(function_name)
                    .elapsed_millis(completion.elapsed_millis)
                    .call_stack(call_stack)
                    .transmit(command_hex, response.map(encode_hex), selector())
            },
        );
    }
}
