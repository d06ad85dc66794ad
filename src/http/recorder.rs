//! In-memory response sink.
//!
//! # Responsibilities
//! - Act as the real connection sink behind the server adapter
//! - Record status, headers and body for tests
//! - Optionally offer connection takeover over a supplied stream
//!
//! # Design Decisions
//! - The first status wins; later `write_header` calls are counted, not applied
//! - Headers are snapshotted when the status is written
//! - HEAD responses keep no body

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Error;
use crate::http::sink::{coerce_status, Connection, Flusher, Hijacker, Io, ResponseWriter};

/// Records a handler's response.
#[derive(Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    committed: Option<HeaderMap>,
    body: BytesMut,
    suppress_body: bool,
    superfluous: usize,
    flushes: Arc<FlushCounter>,
    connection: Option<Arc<ConnectionSlot>>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder for a response to `method`; HEAD keeps no body.
    pub fn for_method(method: &Method) -> Self {
        Self {
            suppress_body: method == Method::HEAD,
            ..Self::default()
        }
    }

    /// Offer `conn` to handlers that take over the connection.
    pub fn with_connection(mut self, conn: impl Io) -> Self {
        self.connection = Some(Arc::new(ConnectionSlot {
            conn: Mutex::new(Some(Box::new(conn))),
            taken: AtomicBool::new(false),
        }));
        self
    }

    /// Status written so far.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Headers sent with the status, or the pending ones if none was sent.
    pub fn headers(&self) -> &HeaderMap {
        self.committed.as_ref().unwrap_or(&self.headers)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of `write_header` calls that came after the status was sent.
    pub fn superfluous_writes(&self) -> usize {
        self.superfluous
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.0.load(Ordering::SeqCst)
    }

    /// True once a handler took over the connection.
    pub fn is_taken_over(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|slot| slot.taken.load(Ordering::SeqCst))
    }

    fn commit(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.committed = Some(self.headers.clone());
    }

    /// Build the HTTP response.
    ///
    /// `Content-Length` is taken from the recorded body, except for HEAD
    /// responses where the handler's value is kept.
    pub fn into_response(mut self) -> Response {
        let status = self.status.unwrap_or(StatusCode::OK);
        let mut headers = self.committed.take().unwrap_or(self.headers);
        let body = self.body.freeze();
        if !self.suppress_body {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, code: u16) {
        if self.is_taken_over() {
            tracing::debug!(code, "write_header on a taken over connection");
            return;
        }
        if self.status.is_some() {
            self.superfluous += 1;
            return;
        }
        self.commit(coerce_status(code));
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if self.is_taken_over() {
            return Err(Error::Hijacked);
        }
        if self.status.is_none() {
            self.commit(StatusCode::OK);
        }
        if !self.suppress_body {
            self.body.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flusher(&self) -> Option<Arc<dyn Flusher>> {
        Some(self.flushes.clone())
    }

    fn hijacker(&self) -> Option<Arc<dyn Hijacker>> {
        self.connection
            .clone()
            .map(|slot| slot as Arc<dyn Hijacker>)
    }
}

#[derive(Debug, Default)]
struct FlushCounter(AtomicUsize);

impl Flusher for FlushCounter {
    fn flush(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct ConnectionSlot {
    conn: Mutex<Option<Connection>>,
    taken: AtomicBool,
}

impl Hijacker for ConnectionSlot {
    fn hijack(&self) -> Result<Connection, Error> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match conn.take() {
            Some(conn) => {
                self.taken.store(true, Ordering::SeqCst);
                Ok(conn)
            }
            None => Err(Error::Hijacked),
        }
    }
}
