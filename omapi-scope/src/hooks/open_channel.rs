//! Hooks around `Session.openBasicChannel` and `Session.openLogicalChannel`.
//!
//! On a successful open the returned channel is associated with the AID it
//! was opened for, so later transmits on it can be attributed.

use omapi_scope_common::CallKind;
use std::sync::Arc;

use super::{complete, report, ObservedChannel};
use crate::capture::{shielded, CorrelationSlot, InvocationKey};
use crate::codec::encode_hex;
use crate::domain::CallSiteId;
use crate::telemetry::Telemetry;

const OPEN_BASIC: &str = "Session.openBasicChannel";
const OPEN_LOGICAL: &str = "Session.openLogicalChannel";
const ERROR_PREFIX: &str = "Error logging open channel";

#[derive(Debug)]
pub struct OpenChannelHook {
    telemetry: Arc<Telemetry>,
    site: CallSiteId,
}

impl OpenChannelHook {
    #[must_use]
    pub fn basic(telemetry: Arc<Telemetry>) -> Self {
        Self {
            telemetry,
            site: CallSiteId(OPEN_BASIC),
        }
    }

    #[must_use]
    pub fn logical(telemetry: Arc<Telemetry>) -> Self {
        Self {
            telemetry,
            site: CallSiteId(OPEN_LOGICAL),
        }
    }

    #[must_use]
    pub fn function_name(&self) -> &'static str {
        self.site.as_str()
    }

    pub fn before(&self, key: InvocationKey) {
        shielded(self.site.as_str(), || {
            self.telemetry.correlator().on_enter(self.site, key, CorrelationSlot::start());
        })
        .ok();
    }

    /// Exit.
    ///
    /// `aid` and `p2` are the call's arguments (`aid` may be absent for the
    /// default application); `channel` is its result, `None` if the call failed
    /// or returned no channel.
    pub fn after<C: ObservedChannel>(
        &self,
        key: InvocationKey,
        aid: Option<&[u8]>,
        p2: Option<u8>,
        channel: Option<&Arc<C>>,
    ) {
        let completion = complete(&self.telemetry, self.site, key);
        let base_name = self.site.as_str();

        report(
            &self.telemetry,
            base_name,
            CallKind::OpenChannel,
            ERROR_PREFIX,
            None,
            || {
                let selector = aid.map(encode_hex);
                let mut select_response = None;
                if let Some(channel) = channel {
                    if let Some(selector) = &selector {
                        self.telemetry.channels().associate(channel, selector);
                    }
                    select_response = channel.select_response().map(|bytes| encode_hex(&bytes));
                }

                let function_name = match p2 {
                    Some(p2) => format!("{base_name}(P2=0x{p2:02X})"),
                    None => base_name.to_owned(),
                };
                self.telemetry
                    .record(function_name)
                    .elapsed_millis(completion.elapsed_millis)
                    .open_channel(selector, select_response)
            },
        );
    }
}
