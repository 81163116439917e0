//! Console rendering of received records.

use std::fmt::Write as _;
use std::time::Duration;

use super::ReceiverStats;
use crate::record::CallRecord;

/// Render `record` for the console.
///
/// The first line is `<short time> [<package>] <function> (<kind>) <N>ms`, or
/// the error form. Decoded APDUs, selector, select response and details follow
/// on indented lines. `verbose` adds thread/process and the call stack.
#[must_use]
pub fn format_record(record: &CallRecord, verbose: bool) -> String {
    let mut out = String::new();
    match record.error() {
        Some(error) if record.has_error() => {
            let _ = write!(
                out,
                "{} [{}] {} ERROR: {error}",
                record.short_timestamp(),
                record.source_identity(),
                record.function_name()
            );
        }
        _ => {
            let _ = write!(
                out,
                "{} [{}] {} ({}) {}ms",
                record.short_timestamp(),
                record.source_identity(),
                record.function_name(),
                record.kind(),
                record.elapsed_millis()
            );
        }
    }

    if let Some(command) = record.formatted_command() {
        let _ = write!(out, "\n  > {command}");
    }
    if let Some(response) = record.formatted_response() {
        let _ = write!(out, "\n  < {response}");
    }
    if let Some(aid) = record.selector() {
        let _ = write!(out, "\n  aid: {aid}");
    }
    if let Some(reply) = record.selector_reply() {
        let _ = write!(out, "\n  select response: {reply}");
    }
    if let Some(details) = record.details() {
        let _ = write!(out, "\n  {details}");
    }

    if verbose {
        let _ = write!(
            out,
            "\n  thread: {} (TID:{}) PID:{}",
            record.thread_name(),
            record.thread_id(),
            record.process_id()
        );
        for frame in record.call_stack().unwrap_or_default() {
            let _ = write!(out, "\n    at {frame}");
        }
    }
    out
}

pub fn print_record(record: &CallRecord, verbose: bool) {
    println!("{}", format_record(record, verbose));
}

/// Exit summary, e.g.
/// `interrupted: 12.3s, 40 records (stored: 40, malformed: 0, ignored: 0, connections: 2)`.
pub fn print_summary(reason: &str, elapsed: Duration, stored: usize, stats: &ReceiverStats) {
    eprintln!(
        "\n{reason}: {:.1}s, {} records (stored: {stored}, malformed: {}, ignored: {}, connections: {})",
        elapsed.as_secs_f64(),
        stats.received(),
        stats.malformed(),
        stats.ignored(),
        stats.connections(),
    );
}

/// Periodic statistics line for headless runs.
pub fn print_statistics(stored: usize, stats: &ReceiverStats) {
    eprintln!(
        "stats: received={} stored={stored} malformed={} ignored={}",
        stats.received(),
        stats.malformed(),
        stats.ignored()
    );
}
