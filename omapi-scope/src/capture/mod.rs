//! Capture-side building blocks
//!
//! Everything that runs inline with an intercepted call:
//! - Entry/exit correlation across concurrent threads
//! - Channel identity → selector association
//! - Call stack capture and stack-query filtering
//! - Fault containment at the hook boundary

pub mod boundary;
pub mod channel_registry;
pub mod correlator;
pub mod stack_capture;
pub mod stack_filter;

pub use boundary::{shielded, silence_shielded_panics};
pub use channel_registry::ChannelRegistry;
pub use correlator::{CallCorrelator, Completion, CorrelationSlot, InvocationKey};
pub use stack_capture::{CaptureStart, NoStackSource, StackSource};
pub use stack_filter::{FilterStats, ObserverSignatures, StackTraceFilter};
