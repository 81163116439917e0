//! Hook around `Channel.close`.

use omapi_scope_common::CallKind;
use std::sync::Arc;

use super::{complete, report, ObservedChannel};
use crate::capture::{shielded, CorrelationSlot, InvocationKey};
use crate::domain::CallSiteId;
use crate::telemetry::Telemetry;

const CHANNEL_CLOSE: &str = "Channel.close";
const ERROR_PREFIX: &str = "Error logging close";

#[derive(Debug)]
pub struct CloseChannelHook {
    telemetry: Arc<Telemetry>,
    site: CallSiteId,
}

impl CloseChannelHook {
    #[must_use]
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        Self {
            telemetry,
            site: CallSiteId(CHANNEL_CLOSE),
        }
    }

    pub fn before(&self, key: InvocationKey) {
        shielded(self.site.as_str(), || {
            self.telemetry.correlator().on_enter(self.site, key, CorrelationSlot::start());
        })
        .ok();
    }

    /// Exit: drop the channel's association and record which AID was closed.
    pub fn after<C: ObservedChannel>(&self, key: InvocationKey, channel: &Arc<C>) {
        let completion = complete(&self.telemetry, self.site, key);

        report(
            &self.telemetry,
            CHANNEL_CLOSE,
            CallKind::Close,
            ERROR_PREFIX,
            None,
            || {
                let selector = self.telemetry.channels().forget(channel);
                self.telemetry
                    .record(CHANNEL_CLOSE)
                    .elapsed_millis(completion.elapsed_millis)
                    .close(selector)
            },
        );
    }
}
