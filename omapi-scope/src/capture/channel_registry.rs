//! # Channel → Selector Association
//!
//! Remembers which AID each open channel was opened with, so later transmits
//! on that channel can be attributed to the selected application.
//!
//! Keys are channel *identities*: two channels are the same key only if they
//! are the same allocation. The registry holds [`Weak`] references, never the
//! channel itself, so it is never the reason a channel stays alive.
//!
//! ## Lifetime
//!
//! - Created when an open call returns a channel
//! - Removed by [`ChannelRegistry::forget`] when the channel is closed
//! - Reclaimed lazily once the channel has been dropped without a close: every
//!   `associate`, `lookup` and `len` prunes entries whose channel is gone
//!
//! Holding a `Weak` keeps the allocation's address reserved until the entry is
//! pruned, so an address can't be reused by a new channel while a stale entry
//! still points at it.

use log::debug;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

struct Association {
    channel: Weak<dyn Any + Send + Sync>,
    selector_hex: String,
}

impl Association {
    fn is_live(&self) -> bool {
        self.channel.strong_count() > 0
    }
}

/// Identity-keyed, weakly-held map from channel to selector hex.
#[derive(Default)]
pub struct ChannelRegistry {
    entries: Mutex<HashMap<usize, Association>>,
}

/// Identity of a channel allocation.
fn identity<C: Send + Sync + 'static>(channel: &Arc<C>) -> usize {
    Arc::as_ptr(channel).cast::<()>() as usize
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `channel` with the selector it was opened with.
    ///
    /// An empty selector is ignored. Re-associating a channel replaces its selector.
    pub fn associate<C: Send + Sync + 'static>(&self, channel: &Arc<C>, selector_hex: &str) {
        if selector_hex.is_empty() {
            return;
        }
        let weak: Weak<C> = Arc::downgrade(channel);
        let weak: Weak<dyn Any + Send + Sync> = weak;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut entries);
        entries.insert(
            identity(channel),
            Association {
                channel: weak,
                selector_hex: selector_hex.to_owned(),
            },
        );
    }

    /// Selector associated with `channel`, if any.
    #[must_use]
    pub fn lookup<C: Send + Sync + 'static>(&self, channel: &Arc<C>) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut entries);
        entries.get(&identity(channel)).map(|a| a.selector_hex.clone())
    }

    /// Drop the association for `channel`, returning the selector it had.
    ///
    /// Forgetting an unknown channel is a no-op.
    pub fn forget<C: Send + Sync + 'static>(&self, channel: &Arc<C>) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identity(channel))
            .map(|a| a.selector_hex)
    }

    /// Number of associations whose channel is still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut entries);
        entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune(entries: &mut HashMap<usize, Association>) {
    let before = entries.len();
    entries.retain(|_, a| a.is_live());
    let reclaimed = before - entries.len();
    if reclaimed > 0 {
        debug!("reclaimed {reclaimed} association(s) for dropped channels");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakeChannel {
        number: u8,
    }

    #[test]
    fn test_associate_then_lookup() {
        let registry = ChannelRegistry::new();
        let ch = Arc::new(FakeChannel { number: 1 });
        registry.associate(&ch, "A0000002471001");
        assert_eq!(registry.lookup(&ch).as_deref(), Some("A0000002471001"));
    }

    #[test]
    fn test_forget_clears_and_is_idempotent() {
        let registry = ChannelRegistry::new();
        let ch = Arc::new(FakeChannel { number: 1 });
        registry.associate(&ch, "A000000003");
        assert_eq!(registry.forget(&ch).as_deref(), Some("A000000003"));
        assert_eq!(registry.lookup(&ch), None);
        assert_eq!(registry.forget(&ch), None);
    }

    #[test]
    fn test_lookup_unknown_is_empty() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.lookup(&Arc::new(FakeChannel { number: 0 })), None);
    }

    #[test]
    fn test_identity_not_equality() {
        let registry = ChannelRegistry::new();
        let a = Arc::new(FakeChannel { number: 1 });
        let b = Arc::new(FakeChannel { number: 1 });
        assert_eq!(a, b);

        registry.associate(&a, "A0000001");
        assert_eq!(registry.lookup(&b), None);
        registry.associate(&b, "A0000002");
        assert_eq!(registry.lookup(&a).as_deref(), Some("A0000001"));
        assert_eq!(registry.lookup(&b).as_deref(), Some("A0000002"));
    }

    #[test]
    fn test_registry_does_not_retain_channel() {
        let registry = ChannelRegistry::new();
        let ch = Arc::new(FakeChannel { number: 2 });
        registry.associate(&ch, "A000000151000000");
        assert_eq!(Arc::strong_count(&ch), 1);
        assert_eq!(registry.len(), 1);

        drop(ch);
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_selector_ignored() {
        let registry = ChannelRegistry::new();
        let ch = Arc::new(FakeChannel { number: 3 });
        registry.associate(&ch, "");
        assert_eq!(registry.lookup(&ch), None);
    }
}
