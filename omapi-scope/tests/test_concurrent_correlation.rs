use omapi_scope::capture::{CallCorrelator, CorrelationSlot, InvocationKey};
use omapi_scope::config::TelemetryConfig;
use omapi_scope::domain::CallSiteId;
use omapi_scope::hooks::TransmitHook;
use omapi_scope::store::RecordStore;
use omapi_scope::telemetry::Telemetry;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: u16 = 16;

fn sleep_for(marker: u16) -> u64 {
    // Spread exits so entries and exits of different threads interleave
    u64::from((marker * 7) % 23)
}

#[test]
fn test_concurrent_transmits_never_cross_talk() {
    let store = Arc::new(RecordStore::new());
    let telemetry = Arc::new(
        Telemetry::builder(TelemetryConfig::new("com.example.wallet")).sink(store.clone()).build(),
    );
    let hook = Arc::new(TransmitHook::channel(Arc::clone(&telemetry)));
    let barrier = Arc::new(Barrier::new(usize::from(THREADS)));

    let handles: Vec<_> = (0..THREADS)
        .map(|marker| {
            let hook = Arc::clone(&hook);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let [hi, lo] = marker.to_be_bytes();
                let key = InvocationKey::current_thread();
                barrier.wait();
                hook.before(key, &[0x80, 0xCA, hi, lo]);
                thread::sleep(Duration::from_millis(sleep_for(marker)));
                hook.after(key, Some(&[hi, lo, 0x90, 0x00]));
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    let records = store.snapshot();
    assert_eq!(records.len(), usize::from(THREADS));
    for record in &records {
        let command = record.command_hex().expect("command missing");
        let response = record.response_hex().expect("response missing");
        // Command marker comes from the entry slot, response marker from the exit
        assert_eq!(&command[4..8], &response[..4], "exit paired with a foreign entry");

        let marker = u16::from_str_radix(&command[4..8], 16).expect("marker");
        assert!(record.elapsed_millis() >= sleep_for(marker));
    }
    assert_eq!(telemetry.correlator().in_flight(), 0);
}

#[test]
fn test_tokens_separate_calls_on_one_thread() {
    let correlator = CallCorrelator::new();
    let site = CallSiteId("Channel.transmit");

    let slot = |command: &str| CorrelationSlot::start().with_command(Some(command.into()));
    correlator.on_enter(site, InvocationKey::Token(1), slot("01"));
    correlator.on_enter(site, InvocationKey::Token(2), slot("02"));

    let second = correlator.on_exit(site, InvocationKey::Token(2));
    let first = correlator.on_exit(site, InvocationKey::Token(1));
    assert_eq!(second.slot.expect("slot 2").command_hex(), Some("02"));
    assert_eq!(first.slot.expect("slot 1").command_hex(), Some("01"));

    // Each slot is consumed exactly once
    assert!(correlator.on_exit(site, InvocationKey::Token(1)).slot.is_none());
}

#[test]
fn test_same_thread_different_sites_stay_separate() {
    let correlator = CallCorrelator::new();
    let key = InvocationKey::current_thread();
    let outer = CallSiteId("Session.openLogicalChannel");
    let inner = CallSiteId("[SYSTEM] Terminal.transmit");

    correlator.on_enter(outer, key, CorrelationSlot::start());
    correlator.on_enter(inner, key, CorrelationSlot::start().with_command(Some("00A4".into())));

    assert_eq!(correlator.on_exit(inner, key).slot.expect("inner").command_hex(), Some("00A4"));
    assert!(correlator.on_exit(outer, key).slot.expect("outer").command_hex().is_none());
}
