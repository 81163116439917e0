//! Unix domain socket endpoint.
//!
//! Each payload is one JSON object followed by `\n`. The connection is opened
//! lazily by the transport worker and reused until a write fails.

use log::debug;
use omapi_scope_common::RecordPayload;
use std::io::{BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Endpoint, EndpointResolver};
use crate::domain::TransportError;

/// Upper bound on a single write, so a stalled observer can't wedge the worker.
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Resolves the observer's socket at a fixed path.
#[derive(Debug, Clone)]
pub struct UnixSocketResolver {
    path: PathBuf,
}

impl UnixSocketResolver {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EndpointResolver for UnixSocketResolver {
    fn resolve(&mut self) -> Result<Box<dyn Endpoint>, TransportError> {
        if !self.path.exists() {
            return Err(TransportError::EndpointUnresolved(self.path.clone()));
        }
        let stream = UnixStream::connect(&self.path)
            .map_err(|error| TransportError::ConnectFailed {
                path: self.path.clone(),
                error,
            })?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        debug!("connected to observer at {}", self.path.display());
        Ok(Box::new(UnixSocketEndpoint {
            writer: BufWriter::new(stream),
        }))
    }
}

struct UnixSocketEndpoint {
    writer: BufWriter<UnixStream>,
}

impl Endpoint for UnixSocketEndpoint {
    fn deliver(&mut self, payload: &RecordPayload) -> Result<(), TransportError> {
        serde_json::to_writer(&mut self.writer, payload)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
