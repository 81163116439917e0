//! # Call Correlation
//!
//! Pairs the entry and exit observations of one intercepted call.
//!
//! Many calls to the same function may be in flight at once on different
//! threads, but a single call's entry and exit always run in order on the same
//! thread. State is therefore keyed by `(call site, invocation)`, where the
//! invocation is the calling thread or, when the host can supply one, an
//! explicit per-invocation token. There is no shared "current call" field that
//! one thread could overwrite while another is mid-call.

use log::debug;
use omapi_scope_common::StackFrame;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::domain::CallSiteId;

/// Identity of one in-flight invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationKey {
    /// The calling thread; valid because entry/exit never interleave per thread
    Thread(ThreadId),
    /// A token supplied by the interception host for this specific call
    Token(u64),
}

impl InvocationKey {
    /// Key for the calling thread.
    #[must_use]
    pub fn current_thread() -> Self {
        InvocationKey::Thread(thread::current().id())
    }
}

/// State captured when a call begins and consumed once when it ends.
#[derive(Debug, Clone)]
pub struct CorrelationSlot {
    started_at: Instant,
    command_hex: Option<String>,
    call_stack: Option<Vec<StackFrame>>,
}

impl CorrelationSlot {
    /// Start a slot now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
            command_hex: None,
            call_stack: None,
        }
    }

    #[must_use]
    pub fn with_command(mut self, command_hex: Option<String>) -> Self {
        self.command_hex = command_hex;
        self
    }

    #[must_use]
    pub fn with_stack(mut self, call_stack: Option<Vec<StackFrame>>) -> Self {
        self.call_stack = call_stack;
        self
    }

    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    #[must_use]
    pub fn command_hex(&self) -> Option<&str> {
        self.command_hex.as_deref()
    }

    /// Time since the slot was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Split into the owned command and stack.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, Option<Vec<StackFrame>>) {
        (self.command_hex, self.call_stack)
    }
}

/// What the exit side of a call gets back.
#[derive(Debug)]
pub struct Completion {
    /// The matching slot, or `None` when no entry was observed
    pub slot: Option<CorrelationSlot>,
    /// Elapsed time in milliseconds; zero when no entry was observed
    pub elapsed_millis: u64,
}

/// Keyed store of in-flight call state.
#[derive(Debug, Default)]
pub struct CallCorrelator {
    slots: Mutex<HashMap<(CallSiteId, InvocationKey), CorrelationSlot>>,
}

impl CallCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a call.
    ///
    /// A slot left behind by an entry whose exit never fired is replaced.
    pub fn on_enter(&self, site: CallSiteId, key: InvocationKey, slot: CorrelationSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.insert((site, key), slot).is_some() {
            debug!("{site}: replaced stale slot for {key:?}");
        }
    }

    /// Take the slot of the matching entry.
    ///
    /// The slot is removed before anything else happens, so the key is clear
    /// for the next call on this thread whatever the caller does with it.
    pub fn on_exit(&self, site: CallSiteId, key: InvocationKey) -> Completion {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(site, key));

        let elapsed_millis = slot
            .as_ref()
            .map_or(0, |s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX));
        if slot.is_none() {
            debug!("{site}: exit without matching entry for {key:?}");
        }

        Completion {
            slot,
            elapsed_millis,
        }
    }

    /// Number of calls currently between entry and exit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: CallSiteId = CallSiteId("Channel.transmit");

    #[test]
    fn test_enter_then_exit_returns_slot() {
        let correlator = CallCorrelator::new();
        let key = InvocationKey::current_thread();
        correlator.on_enter(SITE, key, CorrelationSlot::start().with_command(Some("00A4".into())));

        let done = correlator.on_exit(SITE, key);
        assert_eq!(done.slot.unwrap().command_hex(), Some("00A4"));
        assert_eq!(correlator.in_flight(), 0);
    }

    #[test]
    fn test_exit_without_entry_degrades() {
        let correlator = CallCorrelator::new();
        let done = correlator.on_exit(SITE, InvocationKey::current_thread());
        assert!(done.slot.is_none());
        assert_eq!(done.elapsed_millis, 0);
    }

    #[test]
    fn test_slot_consumed_once() {
        let correlator = CallCorrelator::new();
        let key = InvocationKey::Token(9);
        correlator.on_enter(SITE, key, CorrelationSlot::start());
        assert!(correlator.on_exit(SITE, key).slot.is_some());
        assert!(correlator.on_exit(SITE, key).slot.is_none());
    }

    #[test]
    fn test_sites_do_not_share_state() {
        let correlator = CallCorrelator::new();
        let key = InvocationKey::current_thread();
        let other = CallSiteId("Session.openLogicalChannel");
        correlator.on_enter(SITE, key, CorrelationSlot::start().with_command(Some("AA".into())));
        correlator.on_enter(other, key, CorrelationSlot::start());

        let other_slot = correlator.on_exit(other, key).slot.unwrap();
        assert!(other_slot.command_hex().is_none());
        let slot = correlator.on_exit(SITE, key).slot.unwrap();
        assert_eq!(slot.command_hex(), Some("AA"));
    }

    #[test]
    fn test_tokens_on_same_thread_are_distinct() {
        let correlator = CallCorrelator::new();
        let slot = |command: &str| CorrelationSlot::start().with_command(Some(command.into()));
        correlator.on_enter(SITE, InvocationKey::Token(1), slot("01"));
        correlator.on_enter(SITE, InvocationKey::Token(2), slot("02"));

        let second = correlator.on_exit(SITE, InvocationKey::Token(2)).slot.unwrap();
        let first = correlator.on_exit(SITE, InvocationKey::Token(1)).slot.unwrap();
        assert_eq!(second.command_hex(), Some("02"));
        assert_eq!(first.command_hex(), Some("01"));
    }

    #[test]
    fn test_elapsed_reflects_entry_time() {
        let correlator = CallCorrelator::new();
        let key = InvocationKey::current_thread();
        correlator.on_enter(SITE, key, CorrelationSlot::start());
        std::thread::sleep(Duration::from_millis(15));
        assert!(correlator.on_exit(SITE, key).elapsed_millis >= 15);
    }
}
