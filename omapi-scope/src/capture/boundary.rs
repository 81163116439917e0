//! Fault containment at the instrumentation boundary.
//!
//! Hook code runs inline with the observed call. Anything that goes wrong in
//! here must stay in here, so every entry point funnels its work through
//! [`shielded`]. Once [`silence_shielded_panics`] has run, a panic raised
//! inside [`shielded`] no longer reaches the process panic hook either.

use log::warn;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    /// Nesting depth of [`shielded`] on this thread.
    static SHIELD_DEPTH: Cell<u32> = const { Cell::new(0) };
}

static SILENCER: Once = Once::new();

/// Marks the current thread as inside [`shielded`] until dropped.
struct ShieldGuard;

impl ShieldGuard {
    fn enter() -> Self {
        SHIELD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for ShieldGuard {
    fn drop(&mut self) {
        SHIELD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Whether the current thread is running inside [`shielded`].
#[must_use]
pub fn inside_shield() -> bool {
    SHIELD_DEPTH.with(Cell::get) > 0
}

/// Chain a panic hook that stays quiet for panics raised inside [`shielded`].
///
/// Any other panic goes to whichever hook was installed before. Only the
/// first call installs anything.
pub fn silence_shielded_panics() {
    SILENCER.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !inside_shield() {
                previous(info);
            }
        }));
    });
}

/// Run `f`, converting a panic into `Err(message)`.
///
/// The closure only ever touches telemetry state whose invariants hold across
/// an unwind (maps behind poison-tolerant locks, atomics), which is what makes
/// the `AssertUnwindSafe` wrapper sound here.
pub fn shielded<T>(site: &str, f: impl FnOnce() -> T) -> Result<T, String> {
    let outcome = {
        let _guard = ShieldGuard::enter();
        catch_unwind(AssertUnwindSafe(f))
    };
    outcome.map_err(|payload| {
        let message = panic_message(payload.as_ref());
        warn!("{site}: absorbed fault: {message}");
        message
    })
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_owned()
    }
}
