//! Buffered deadline writer.
//!
//! The sink a supervised handler writes into. Nothing reaches the real
//! connection until the supervisor has decided the outcome.
//!
//! # Design Decisions
//! - One mutex guards status, body and the sticky error together
//! - The pending header map belongs to the handler side; the first
//!   `write_header`/`write` snapshots it under the lock
//! - Once a sticky error is installed every write returns that same error

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::BytesMut;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::http::sink::{coerce_status, Connection, Diagnostics, Flusher, Hijacker, ResponseStatus, ResponseWriter};

/// State shared between the handler task and the supervisor.
#[derive(Debug, Default)]
pub(crate) struct Buffered {
    pub(crate) status: ResponseStatus,
    pub(crate) headers: Option<HeaderMap>,
    pub(crate) body: BytesMut,
    pub(crate) size: usize,
    pub(crate) err: Option<Error>,
    suppress_body: bool,
}

impl Buffered {
    fn commit(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.status = ResponseStatus::Code(status);
        self.headers = Some(headers.clone());
    }

    /// Returns true when the call was superfluous.
    fn write_header(&mut self, code: u16, headers: &HeaderMap) -> bool {
        let status = coerce_status(code);
        if self.err.is_some() {
            return false;
        }
        if self.status.is_written() {
            return true;
        }
        self.commit(status, headers);
        false
    }
}

pub(crate) type SharedBuffer = Arc<Mutex<Buffered>>;

pub(crate) fn lock(state: &Mutex<Buffered>) -> MutexGuard<'_, Buffered> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory stand-in for the real response sink.
pub struct TimeoutWriter {
    headers: HeaderMap,
    state: SharedBuffer,
    flusher: Option<Arc<dyn Flusher>>,
    hijacker: Option<Arc<dyn Hijacker>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl TimeoutWriter {
    /// Buffer a response to `method`, delegating flush and takeover to the
    /// capabilities of `real`.
    pub fn new(real: &dyn ResponseWriter, method: &Method, diagnostics: Arc<dyn Diagnostics>) -> Self {
        let state = Buffered {
            suppress_body: method == Method::HEAD,
            ..Buffered::default()
        };
        Self {
            headers: HeaderMap::new(),
            state: Arc::new(Mutex::new(state)),
            flusher: real.flusher(),
            hijacker: real.hijacker(),
            diagnostics,
        }
    }

    pub(crate) fn shared(&self) -> SharedBuffer {
        Arc::clone(&self.state)
    }

    /// Split into the pending headers and the shared state.
    pub(crate) fn into_parts(self) -> (HeaderMap, SharedBuffer) {
        (self.headers, self.state)
    }

    pub fn status(&self) -> ResponseStatus {
        lock(&self.state).status
    }

    /// Body bytes buffered so far.
    pub fn size(&self) -> usize {
        lock(&self.state).size
    }

    pub fn written(&self) -> bool {
        self.status().is_written()
    }
}

impl ResponseWriter for TimeoutWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, code: u16) {
        let caller = Location::caller();
        let superfluous = lock(&self.state).write_header(code, &self.headers);
        if superfluous {
            self.diagnostics.superfluous_write_header(caller);
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut state = lock(&self.state);
        if let Some(err) = &state.err {
            return Err(err.clone());
        }
        match state.status {
            ResponseStatus::TakenOver => return Err(Error::Hijacked),
            ResponseStatus::Pending => state.commit(StatusCode::OK, &self.headers),
            ResponseStatus::Code(_) => {}
        }
        if !state.suppress_body {
            state.body.extend_from_slice(buf);
            state.size += buf.len();
        }
        Ok(buf.len())
    }

    fn flusher(&self) -> Option<Arc<dyn Flusher>> {
        self.flusher.clone()
    }

    fn hijacker(&self) -> Option<Arc<dyn Hijacker>> {
        let inner = self.hijacker.clone()?;
        Some(Arc::new(TimeoutHijacker {
            inner,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Takeover that is refused once the supervisor resolved a timeout.
struct TimeoutHijacker {
    inner: Arc<dyn Hijacker>,
    state: SharedBuffer,
}

impl Hijacker for TimeoutHijacker {
    fn hijack(&self) -> Result<Connection, Error> {
        let mut state = lock(&self.state);
        if let Some(err) = &state.err {
            return Err(err.clone());
        }
        let conn = self.inner.hijack()?;
        state.status = ResponseStatus::TakenOver;
        Ok(conn)
    }
}
