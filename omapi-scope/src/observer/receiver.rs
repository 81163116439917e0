//! Socket receiver.
//!
//! Binds the observer socket, serves every producer connection on its own
//! task, and turns each JSON line back into a [`CallRecord`] carrying the
//! producer's timestamps, thread and process.

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};
use omapi_scope_common::{CallKind, RecordPayload};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::domain::ReceiverError;
use crate::record::{CallDetail, CallRecord};
use crate::store::RecordStore;

/// Ingestion counters.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    connections: AtomicU64,
    received: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
}

impl ReceiverStats {
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Payloads without a `type`.
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Decode one line.
///
/// Returns `Ok(None)` for a well-formed object that has no `type`.
///
/// # Errors
/// Returns [`ReceiverError::MalformedPayload`] when the line isn't a valid record.
pub fn decode_line(line: &str) -> Result<Option<CallRecord>, ReceiverError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if !matches!(value.get("type"), Some(kind) if !kind.is_null()) {
        return Ok(None);
    }
    let payload: RecordPayload = serde_json::from_value(value)?;
    Ok(Some(CallRecord::from(payload)))
}

impl From<RecordPayload> for CallRecord {
    fn from(payload: RecordPayload) -> Self {
        let detail = match payload.kind {
            CallKind::Transmit => CallDetail::Transmit {
                command_hex: payload.apdu_command,
                response_hex: payload.apdu_response,
                selector: payload.aid,
            },
            CallKind::OpenChannel => CallDetail::OpenChannel {
                selector: payload.aid,
                selector_reply: payload.select_response,
            },
            CallKind::Close => CallDetail::Close {
                selector: payload.aid,
            },
            CallKind::Other => CallDetail::Other {
                details: payload.details,
            },
        };

        let mut builder = CallRecord::builder(payload.package_name, payload.function_name)
            .timestamps(payload.timestamp, payload.short_timestamp)
            .thread(payload.thread_id.unwrap_or(0), payload.thread_name.unwrap_or_default())
            .process_id(payload.process_id.unwrap_or(0))
            .elapsed_millis(payload.execution_time_ms)
            .call_stack(payload.stack_trace);
        if let Some(error) = payload.error {
            builder = builder.error(error);
        }
        builder.build(detail)
    }
}

/// Where decoded records go.
struct Ingest {
    store: Arc<RecordStore>,
    live: Option<Sender<CallRecord>>,
    stats: Arc<ReceiverStats>,
}

impl Ingest {
    fn line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match decode_line(line) {
            Ok(Some(record)) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                debug!("received {}", record.summary());
                if let Some(live) = &self.live {
                    // A slow display must not hold up ingestion; the store keeps the record.
                    if let Err(TrySendError::Full(_)) = live.try_send(record.clone()) {
                        debug!("live feed full, skipping display");
                    }
                }
                self.store.append(record);
            }
            Ok(None) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                warn!("Received record without type - ignoring");
            }
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn!("{e}");
            }
        }
    }
}

/// Listens on the observer socket. The socket file is removed on drop.
pub struct Receiver {
    listener: UnixListener,
    path: PathBuf,
    ingest: Arc<Ingest>,
}

impl Receiver {
    /// Bind `path`, replacing a stale socket file and creating its directory.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the directory can't be created, if something other
    /// than a socket already sits at `path`, or if the bind fails.
    pub fn bind(
        path: impl Into<PathBuf>,
        store: Arc<RecordStore>,
    ) -> Result<Self, ReceiverError> {
        let path = path.into();
        let bind_failed = |error| ReceiverError::BindFailed {
            path: path.clone(),
            error,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(bind_failed)?;
        }
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => {
                info!("Removing stale socket {}", path.display());
                std::fs::remove_file(&path).map_err(bind_failed)?;
            }
            Ok(_) => {
                return Err(bind_failed(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "path exists and is not a socket",
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_failed(e)),
        }
        let listener = UnixListener::bind(&path).map_err(bind_failed)?;

        let ingest = Arc::new(Ingest {
            store,
            live: None,
            stats: Arc::default(),
        });
        Ok(Self {
            listener,
            path,
            ingest,
        })
    }

    /// Also forward each record to `live` for display.
    #[must_use]
    pub fn with_live_feed(mut self, live: Sender<CallRecord>) -> Self {
        let ingest = Ingest {
            store: Arc::clone(&self.ingest.store),
            live: Some(live),
            stats: Arc::clone(&self.ingest.stats),
        };
        self.ingest = Arc::new(ingest);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn stats(&self) -> Arc<ReceiverStats> {
        Arc::clone(&self.ingest.stats)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    self.ingest.stats.connections.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(serve(stream, Arc::clone(&self.ingest)));
                }
                Err(e) => warn!("accept failed on {}: {e}", self.path.display()),
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}

async fn serve(stream: UnixStream, ingest: Arc<Ingest>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => ingest.line(&line),
            Ok(None) => break,
            Err(e) => {
                debug!("producer connection closed: {e}");
                break;
            }
        }
    }
}
