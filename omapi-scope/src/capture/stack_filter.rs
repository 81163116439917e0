//! # Stack Trace Filtering
//!
//! When the instrumented program inspects its own call stack (or an error's
//! stack), frames belonging to the interception framework or to this crate
//! would reveal that the process is being observed. This module removes them.
//!
//! # Matching Strategy
//!
//! A frame is an observer frame when:
//!
//! 1. **Class identifier** contains any configured class signature
//!    - `de.robv.android.xposed`, `XposedBridge`, `XC_MethodHook` → interception framework
//!    - `omapi_scope` → this crate's own frames
//!
//! 2. **Method name** contains any configured method signature
//!    - `hooked`, `Hooked` → trampolines generated by the framework
//!
//! A filtered stack is never empty: an empty stack is itself an anomaly a
//! suspicious caller could test for.

use omapi_scope_common::StackFrame;
use std::sync::atomic::{AtomicU64, Ordering};

use super::boundary::shielded;

// =============================================================================
// SIGNATURE TABLES
// =============================================================================

/// Class identifiers that mark a frame as belonging to the observer
const DEFAULT_CLASS_SIGNATURES: &[&str] = &[
    "de.robv.android.xposed",
    "omapi_scope",
    "XposedBridge",
    "XC_MethodHook",
    "EdXposed",
    "LSPosed",
];

/// Method names generated by the interception framework
const DEFAULT_METHOD_SIGNATURES: &[&str] = &["hooked", "Hooked"];

/// Substrings identifying frames that must not be visible to the observed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSignatures {
    class_patterns: Vec<String>,
    method_patterns: Vec<String>,
}

impl ObserverSignatures {
    #[must_use]
    pub fn new(class_patterns: Vec<String>, method_patterns: Vec<String>) -> Self {
        Self {
            class_patterns,
            method_patterns,
        }
    }

    /// Add a class signature, e.g. the package of a companion module.
    #[must_use]
    pub fn with_class_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.class_patterns.push(pattern.into());
        self
    }

    /// True if the frame carries any observer signature.
    #[must_use]
    pub fn matches(&self, frame: &StackFrame) -> bool {
        self.class_patterns
            .iter()
            .any(|p| frame.class_name.contains(p.as_str()))
            || self
                .method_patterns
                .iter()
                .any(|p| frame.method_name.contains(p.as_str()))
    }
}

impl Default for ObserverSignatures {
    fn default() -> Self {
        Self {
            class_patterns: DEFAULT_CLASS_SIGNATURES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            method_patterns: DEFAULT_METHOD_SIGNATURES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Removes observer frames from stacks handed back to the instrumented program.
#[derive(Debug, Default)]
pub struct StackTraceFilter {
    signatures: ObserverSignatures,
    stats: FilterStats,
}

impl StackTraceFilter {
    #[must_use]
    pub fn new(signatures: ObserverSignatures) -> Self {
        Self {
            signatures,
            stats: FilterStats::default(),
        }
    }

    #[must_use]
    pub fn signatures(&self) -> &ObserverSignatures {
        &self.signatures
    }

    /// Filter `frames`, keeping the relative order of the retained frames.
    ///
    /// If every frame matches, one frame is kept: the deepest frame that does
    /// not match, or failing that the original deepest frame. An empty input
    /// stays empty.
    #[must_use]
    pub fn filter(&self, frames: &[StackFrame]) -> Vec<StackFrame> {
        let mut kept: Vec<StackFrame> =
            frames.iter().filter(|f| !self.signatures.matches(f)).cloned().collect();

        if kept.is_empty() {
            if let Some(fallback) = frames
                .iter()
                .rev()
                .find(|f| !self.signatures.matches(f))
                .or_else(|| frames.last())
            {
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                kept.push(fallback.clone());
            }
        }

        self.stats.record(frames.len(), kept.len());
        kept
    }

    /// Hook adapter for a stack query made by the instrumented program.
    ///
    /// Replaces `result` with its filtered form. If filtering faults, `result`
    /// is left exactly as the runtime produced it.
    pub fn on_stack_query(&self, result: &mut Vec<StackFrame>) {
        if result.is_empty() {
            return;
        }
        if let Ok(filtered) = shielded("stack query", || self.filter(result)) {
            *result = filtered;
        }
    }

    #[must_use]
    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }
}

// =============================================================================
// FILTER DIAGNOSTICS
// =============================================================================

/// Counters describing how much the filter has been removing.
#[derive(Debug, Default)]
pub struct FilterStats {
    queries: AtomicU64,
    frames_removed: AtomicU64,
    /// Queries where every frame matched and a fallback frame was kept
    fallbacks: AtomicU64,
}

impl FilterStats {
    fn record(&self, before: usize, after: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let removed = before.saturating_sub(after) as u64;
        if removed > 0 {
            self.frames_removed.fetch_add(removed, Ordering::Relaxed);
        }
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn frames_removed(&self) -> u64 {
        self.frames_removed.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}
