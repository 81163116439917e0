//! Call stack capture for records.
//!
//! The host runtime owns the real stack; it is reached through [`StackSource`].
//! Where a captured stack should begin is host- and version-specific, so it is
//! a predicate ([`CaptureStart`]) rather than a fixed frame index.

use omapi_scope_common::StackFrame;
use std::fmt;
use std::sync::Arc;

/// Supplies the calling thread's stack, innermost frame first.
pub trait StackSource: Send + Sync {
    /// Stack of the calling thread, or `None` if it cannot be obtained.
    fn current_stack(&self) -> Option<Vec<StackFrame>>;
}

/// Source for hosts that cannot report stacks. Records carry no call stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStackSource;

impl StackSource for NoStackSource {
    fn current_stack(&self) -> Option<Vec<StackFrame>> {
        None
    }
}

type StartPredicate = dyn Fn(&StackFrame) -> bool + Send + Sync;

/// Chooses the first frame kept in a captured stack.
///
/// Frames before the first match are dropped. When no frame matches, the whole
/// stack is kept.
#[derive(Clone)]
pub struct CaptureStart {
    predicate: Arc<StartPredicate>,
}

impl CaptureStart {
    pub fn new(predicate: impl Fn(&StackFrame) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Start at the first frame whose class contains `pattern`.
    #[must_use]
    pub fn class_contains(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self::new(move |frame| frame.class_name.contains(pattern.as_str()))
    }

    /// Keep every frame.
    #[must_use]
    pub fn whole_stack() -> Self {
        Self::new(|_| true)
    }

    /// Drop the frames preceding the start frame.
    #[must_use]
    pub fn trim(&self, mut frames: Vec<StackFrame>) -> Vec<StackFrame> {
        let start = frames.iter().position(|f| (self.predicate)(f)).unwrap_or(0);
        frames.drain(..start);
        frames
    }
}

impl Default for CaptureStart {
    /// First frame of the interception framework's hook dispatcher.
    fn default() -> Self {
        Self::class_contains("XC_MethodHook")
    }
}

impl fmt::Debug for CaptureStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureStart").finish_non_exhaustive()
    }
}
