//! CallRecord → wire payload conversion.

use omapi_scope_common::{RecordPayload, Verbosity};

use crate::record::{CallDetail, CallRecord};

/// Build the payload for `record` at the given verbosity.
///
/// `Reduced` keeps timestamps, source identity, function name, kind, elapsed
/// time and error; everything else is left out even when the record has it.
#[must_use]
pub fn encode_payload(record: &CallRecord, verbosity: Verbosity) -> RecordPayload {
    let mut payload = RecordPayload {
        timestamp: record.timestamp().to_owned(),
        short_timestamp: record.short_timestamp().to_owned(),
        package_name: record.source_identity().to_owned(),
        function_name: record.function_name().to_owned(),
        kind: record.kind(),
        apdu_command: None,
        apdu_response: None,
        aid: None,
        select_response: None,
        details: None,
        thread_id: None,
        thread_name: None,
        process_id: None,
        execution_time_ms: record.elapsed_millis(),
        error: record.error().map(str::to_owned),
        stack_trace: None,
    };

    if verbosity == Verbosity::Reduced {
        return payload;
    }

    match record.detail() {
        CallDetail::Transmit {
            command_hex,
            response_hex,
            selector,
        } => {
            payload.apdu_command.clone_from(command_hex);
            payload.apdu_response.clone_from(response_hex);
            payload.aid.clone_from(selector);
        }
        CallDetail::OpenChannel {
            selector,
            selector_reply,
        } => {
            payload.aid.clone_from(selector);
            payload.select_response.clone_from(selector_reply);
        }
        CallDetail::Close { selector } => payload.aid.clone_from(selector),
        CallDetail::Other { details } => payload.details.clone_from(details),
    }
    payload.thread_id = Some(record.thread_id());
    payload.thread_name = Some(record.thread_name().to_owned());
    payload.process_id = Some(record.process_id());
    payload.stack_trace = record.call_stack().map(<[_]>::to_vec);
    payload
}
