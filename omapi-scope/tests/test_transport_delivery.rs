use omapi_scope::capture::InvocationKey;
use omapi_scope::config::{TelemetryConfig, VerbosityToggle};
use omapi_scope::hooks::{ObservedChannel, OmapiHooks};
use omapi_scope::observer::Receiver;
use omapi_scope::record::CallRecord;
use omapi_scope::store::RecordStore;
use omapi_scope::telemetry::Telemetry;
use omapi_scope::transport::Transport;
use omapi_scope_common::{CallKind, RecordPayload, StackFrame, Verbosity};
use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn full_transmit() -> CallRecord {
    CallRecord::builder("com.example.wallet", "Channel.transmit")
        .call_stack(Some(vec![StackFrame::new("com.example.wallet.Payment", "authorize")]))
        .transmit(
            Some("00A4040007A0000002471001".into()),
            Some("9000".into()),
            Some("A0000002471001".into()),
        )
}

/// Collect `expected` JSON lines from the first connection to `path`.
fn collect_lines(path: &Path, expected: usize) -> thread::JoinHandle<Vec<serde_json::Value>> {
    let listener = UnixListener::bind(path).expect("bind");
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        BufReader::new(stream)
            .lines()
            .take(expected)
            .map(|line| serde_json::from_str(&line.expect("line")).expect("json"))
            .collect()
    })
}

#[test]
fn test_reduced_payload_never_carries_detail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("records.sock");
    let collector = collect_lines(&path, 2);

    let transport =
        Transport::unix_socket(&path, VerbosityToggle::new(Verbosity::Reduced)).expect("transport");
    transport.send(&full_transmit());
    transport.send_with(&full_transmit(), Verbosity::Full);
    transport.shutdown();

    let lines = collector.join().expect("collector");
    let reduced = lines[0].as_object().expect("object");
    let hidden = [
        "apduCommand",
        "apduResponse",
        "aid",
        "stackTrace",
        "threadId",
        "threadName",
        "processId",
    ];
    for key in hidden {
        assert!(!reduced.contains_key(key), "reduced payload leaked {key}");
    }
    assert_eq!(reduced["type"], "transmit");
    assert_eq!(reduced["functionName"], "Channel.transmit");

    let full = lines[1].as_object().expect("object");
    assert_eq!(full["apduCommand"], "00A4040007A0000002471001");
    assert_eq!(full["aid"], "A0000002471001");
    assert_eq!(full["stackTrace"][0]["methodName"], "authorize");
}

#[test]
fn test_missing_observer_drops_silently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transport =
        Transport::unix_socket(dir.path().join("nobody.sock"), VerbosityToggle::default())
            .expect("transport");
    for _ in 0..5 {
        transport.send(&full_transmit());
    }
    let stats = transport.stats();
    transport.shutdown();

    assert_eq!(stats.enqueued(), 5);
    assert_eq!(stats.dropped(), 5);
    assert_eq!(stats.delivered(), 0);
}

#[test]
fn test_delivery_preserves_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("records.sock");
    let collector = collect_lines(&path, 20);

    let transport = Transport::unix_socket(&path, VerbosityToggle::default()).expect("transport");
    for n in 0..20 {
        transport.send(&CallRecord::builder("pkg", format!("call-{n}")).other(None));
    }
    transport.shutdown();

    let names: Vec<String> = collector
        .join()
        .expect("collector")
        .iter()
        .map(|v| v["functionName"].as_str().expect("name").to_owned())
        .collect();
    let expected: Vec<String> = (0..20).map(|n| format!("call-{n}")).collect();
    assert_eq!(names, expected);
}

struct Channel;
impl ObservedChannel for Channel {}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hooks_to_observer_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("records.sock");

    let observed = Arc::new(RecordStore::new());
    let receiver = Receiver::bind(&path, Arc::clone(&observed)).expect("bind");
    let receiver_task = tokio::spawn(receiver.run());

    let local = Arc::new(RecordStore::new());
    let config = TelemetryConfig::new("com.example.wallet").with_socket_path(&path);
    let telemetry = Arc::new(Telemetry::connect(config, Arc::clone(&local)).expect("telemetry"));
    let hooks = OmapiHooks::install(&telemetry);

    let key = InvocationKey::current_thread();
    let channel = Arc::new(Channel);
    hooks.open_basic_channel.before(key);
    hooks
        .open_basic_channel
        .after(key, Some(&[0xA0, 0x00, 0x00, 0x00, 0x03]), None, Some(&channel));
    hooks.transmit.before(key, &[0x00, 0xB0, 0x00, 0x00, 0x10]);
    hooks.transmit.after_on_channel(key, &channel, Some(&[0x6A, 0x82]));

    for _ in 0..200 {
        if observed.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let received = observed.snapshot();
    assert_eq!(received.len(), 3);
    assert_eq!(local.len(), 3);
    assert_eq!(received[0].kind(), CallKind::Other);
    assert_eq!(received[1].selector(), Some("A000000003"));
    assert_eq!(received[2].selector(), Some("A000000003"));
    assert_eq!(received[2].formatted_response().as_deref(), Some("6A 82"));
    assert_eq!(received[2].process_id(), std::process::id());
    assert_eq!(received[2].timestamp(), local.snapshot()[2].timestamp());

    receiver_task.abort();
    let _ = receiver_task.await;
}

#[test]
fn test_payload_schema_round_trip_via_json() {
    let payload: RecordPayload = serde_json::from_str(
        r#"{"timestamp":"t","shortTimestamp":"s","packageName":"p","functionName":"Channel.close","type":"close","executionTimeMs":2}"#,
    )
    .expect("payload");
    let record = CallRecord::from(payload);
    assert_eq!(record.kind(), CallKind::Close);
    assert_eq!(record.elapsed_millis(), 2);
}
