//! The panic hook is process-wide, so this file keeps to a single test.

use omapi_scope::capture::InvocationKey;
use omapi_scope::config::TelemetryConfig;
use omapi_scope::hooks::{ObservedChannel, OmapiHooks};
use omapi_scope::store::RecordStore;
use omapi_scope::telemetry::Telemetry;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static HOST_HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

struct BrokenChannel;

impl ObservedChannel for BrokenChannel {
    fn select_response(&self) -> Option<Vec<u8>> {
        panic!("select response unavailable")
    }
}

#[test]
fn test_absorbed_faults_skip_host_panic_hook() {
    panic::set_hook(Box::new(|_| {
        HOST_HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }));

    let store = Arc::new(RecordStore::new());
    let telemetry = Arc::new(
        Telemetry::builder(TelemetryConfig::new("com.example.wallet"))
            .sink(store.clone())
            .build(),
    );
    let hooks = OmapiHooks::install(&telemetry);
    let key = InvocationKey::current_thread();
    let channel = Arc::new(BrokenChannel);

    hooks.open_basic_channel.before(key);
    hooks
        .open_basic_channel
        .after(key, Some(&[0xA0, 0x00, 0x00, 0x01, 0x51]), None, Some(&channel));

    let records = store.snapshot();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[1].error(),
        Some("Error logging open channel: select response unavailable")
    );
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 0);

    // Panics outside the hooks still reach the host's hook.
    let outside = panic::catch_unwind(|| panic!("application fault"));
    assert!(outside.is_err());
    assert_eq!(HOST_HOOK_CALLS.load(Ordering::SeqCst), 1);
}
