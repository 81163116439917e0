//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep process IDs, thread IDs and call-site names from
//! being mixed up in hook and record signatures.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process ID
///
/// Represents the ID of the process a record was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// ID of the calling process.
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Thread ID
///
/// A process-unique sequence number assigned to each thread the first time it
/// produces a record. Numbers are never reused while the process lives, unlike
/// kernel TIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(pub u64);

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
}

impl Tid {
    /// ID of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Tid(CURRENT_TID.with(|tid| *tid))
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Name of an intercepted function, used to key in-flight calls.
///
/// Two hooks with different call-site IDs never share correlation state, so a
/// call that nests another intercepted call on the same thread stays separate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSiteId(pub &'static str);

impl CallSiteId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Name of the calling thread, falling back to `Thread-<tid>` for unnamed threads.
#[must_use]
pub fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .map_or_else(|| format!("Thread-{}", Tid::current().0), str::to_owned)
}
