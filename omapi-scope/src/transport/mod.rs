//! # Cross-Process Record Delivery
//!
//! Ships records from the instrumented process to the observer without ever
//! holding up the observed call.
//!
//! ```text
//! hook thread(s)                     transport worker (one thread)
//! ──────────────                     ─────────────────────────────
//! send(record) ──payload──▶ queue ──▶ resolve endpoint (lazily)
//!   returns immediately               deliver, in enqueue order
//!                                     on failure: drop record, forget endpoint
//! ```
//!
//! Delivery is at-most-once: a record whose delivery fails is dropped, never
//! retried. Faults on either side of the queue are absorbed and counted.

pub mod payload;
pub mod unix_socket;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use omapi_scope_common::{RecordPayload, Verbosity};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub use payload::encode_payload;
pub use unix_socket::UnixSocketResolver;

use crate::capture::shielded;
use crate::config::VerbosityToggle;
use crate::domain::TransportError;
use crate::record::CallRecord;
use crate::telemetry::RecordSink;

/// Name of the delivery worker thread.
const WORKER_THREAD_NAME: &str = "omapi-scope-transport";

/// A connected destination for payloads.
pub trait Endpoint: Send {
    /// Deliver one payload.
    ///
    /// # Errors
    /// Any error drops the payload and makes the worker resolve a fresh endpoint
    /// for the next one.
    fn deliver(&mut self, payload: &RecordPayload) -> Result<(), TransportError>;
}

/// Finds the observer. Called by the worker whenever it has no live endpoint.
pub trait EndpointResolver: Send + 'static {
    /// # Errors
    /// Returns an error when the observer can't be reached right now; the
    /// payload being delivered is dropped.
    fn resolve(&mut self) -> Result<Box<dyn Endpoint>, TransportError>;
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct TransportStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl TransportStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Non-blocking, best-effort sender of records to the observer process.
pub struct Transport {
    queue: Option<Sender<RecordPayload>>,
    worker: Option<JoinHandle<()>>,
    verbosity: VerbosityToggle,
    stats: Arc<TransportStats>,
}

impl Transport {
    /// Start the delivery worker.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn spawn(
        resolver: impl EndpointResolver,
        verbosity: VerbosityToggle,
    ) -> Result<Self, TransportError> {
        let (tx, rx) = unbounded();
        let stats = Arc::new(TransportStats::default());
        let worker_stats = Arc::clone(&stats);
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || run_worker(&rx, resolver, &worker_stats))?;

        Ok(Self {
            queue: Some(tx),
            worker: Some(worker),
            verbosity,
            stats,
        })
    }

    /// Transport delivering to the observer socket at `path`.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn unix_socket(
        path: impl Into<PathBuf>,
        verbosity: VerbosityToggle,
    ) -> Result<Self, TransportError> {
        Self::spawn(UnixSocketResolver::new(path), verbosity)
    }

    /// Queue `record` at the verbosity currently selected by the toggle.
    pub fn send(&self, record: &CallRecord) {
        self.send_with(record, self.verbosity.get());
    }

    /// Queue `record` at an explicit verbosity.
    ///
    /// Returns as soon as the payload is queued. Never fails from the caller's
    /// point of view.
    pub fn send_with(&self, record: &CallRecord, verbosity: Verbosity) {
        let queued = shielded("transport send", || {
            let Some(queue) = &self.queue else {
                return Err(TransportError::QueueClosed);
            };
            debug!("{}", record.summary());
            queue.send(encode_payload(record, verbosity)).map_err(|_| TransportError::QueueClosed)
        });
        match queued {
            Ok(Ok(())) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                debug!("dropped {}: {e}", record.function_name());
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn verbosity(&self) -> &VerbosityToggle {
        &self.verbosity
    }

    /// Stop accepting records and wait for the worker to drain the queue.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RecordSink for Transport {
    fn accept(&self, record: &CallRecord) {
        self.send(record);
    }
}

fn run_worker(
    queue: &Receiver<RecordPayload>,
    mut resolver: impl EndpointResolver,
    stats: &TransportStats,
) {
    let mut endpoint: Option<Box<dyn Endpoint>> = None;

    for payload in queue {
        let outcome =
            shielded("transport worker", || deliver_one(&mut endpoint, &mut resolver, &payload));
        match outcome {
            Ok(Ok(())) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                debug!("dropped {}: {e}", payload.function_name);
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                endpoint = None;
            }
            Err(_) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                endpoint = None;
            }
        }
    }
    debug!("transport worker exiting");
}

fn deliver_one(
    endpoint: &mut Option<Box<dyn Endpoint>>,
    resolver: &mut impl EndpointResolver,
    payload: &RecordPayload,
) -> Result<(), TransportError> {
    let live = match endpoint.take() {
        Some(live) => live,
        None => resolver.resolve()?,
    };
    endpoint.insert(live).deliver(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Inbox = Arc<Mutex<Vec<RecordPayload>>>;

    /// Resolver whose endpoint appends to a shared inbox.
    struct InboxResolver {
        inbox: Inbox,
        resolutions: Arc<AtomicU64>,
        fail_first: u64,
    }

    struct InboxEndpoint {
        inbox: Inbox,
    }

    impl Endpoint for InboxEndpoint {
        fn deliver(&mut self, payload: &RecordPayload) -> Result<(), TransportError> {
            self.inbox.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    impl EndpointResolver for InboxResolver {
        fn resolve(&mut self) -> Result<Box<dyn Endpoint>, TransportError> {
            let n = self.resolutions.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(TransportError::EndpointUnresolved(PathBuf::from("/nowhere")));
            }
            Ok(Box::new(InboxEndpoint {
                inbox: Arc::clone(&self.inbox),
            }))
        }
    }

    fn inbox_transport(
        fail_first: u64,
        verbosity: VerbosityToggle,
    ) -> (Transport, Inbox, Arc<AtomicU64>) {
        let inbox: Inbox = Arc::default();
        let resolutions = Arc::new(AtomicU64::new(0));
        let resolver = InboxResolver {
            inbox: Arc::clone(&inbox),
            resolutions: Arc::clone(&resolutions),
            fail_first,
        };
        (Transport::spawn(resolver, verbosity).unwrap(), inbox, resolutions)
    }

    fn transmit(n: usize) -> CallRecord {
        CallRecord::builder("pkg", format!("call-{n}")).transmit(
            Some("00A4040007A0000002471001".into()),
            Some("9000".into()),
            Some("A0000002471001".into()),
        )
    }

    #[test]
    fn test_delivers_in_enqueue_order() {
        let (transport, inbox, _) = inbox_transport(0, VerbosityToggle::default());
        for n in 0..50 {
            transport.send(&transmit(n));
        }
        let stats = transport.stats();
        transport.shutdown();

        let names: Vec<String> = inbox
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.function_name.clone())
            .collect();
        let expected: Vec<String> = (0..50).map(|n| format!("call-{n}")).collect();
        assert_eq!(names, expected);
        assert_eq!(stats.delivered(), 50);
        assert_eq!(stats.dropped(), 0);
    }

    #[test]
    fn test_unresolved_endpoint_drops_without_retry() {
        let (transport, inbox, resolutions) = inbox_transport(2, VerbosityToggle::default());
        for n in 0..3 {
            transport.send(&transmit(n));
        }
        let stats = transport.stats();
        transport.shutdown();

        let delivered = inbox.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].function_name, "call-2");
        assert_eq!(stats.dropped(), 2);
        assert_eq!(resolutions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_toggle_read_at_send_time() {
        let toggle = VerbosityToggle::default();
        let (transport, inbox, _) = inbox_transport(0, toggle.clone());
        transport.send(&transmit(0));
        toggle.set(Verbosity::Reduced);
        transport.send(&transmit(1));
        transport.shutdown();

        let delivered = inbox.lock().unwrap();
        assert!(delivered[0].apdu_command.is_some());
        assert!(delivered[1].apdu_command.is_none());
        assert!(delivered[1].aid.is_none());
        assert!(delivered[1].stack_trace.is_none());
    }

    #[test]
    fn test_panicking_endpoint_is_absorbed() {
        struct Exploding;
        impl Endpoint for Exploding {
            fn deliver(&mut self, _: &RecordPayload) -> Result<(), TransportError> {
                panic!("endpoint fault");
            }
        }
        struct ExplodingResolver;
        impl EndpointResolver for ExplodingResolver {
            fn resolve(&mut self) -> Result<Box<dyn Endpoint>, TransportError> {
                Ok(Box::new(Exploding))
            }
        }

        let transport = Transport::spawn(ExplodingResolver, VerbosityToggle::default()).unwrap();
        transport.send(&transmit(0));
        transport.send(&transmit(1));
        let stats = transport.stats();
        transport.shutdown();
        assert_eq!(stats.dropped(), 2);
        assert_eq!(stats.delivered(), 0);
    }
}
