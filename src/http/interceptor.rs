//! Response interceptor.
//!
//! # Responsibilities
//! - Pass writes through to the wrapped sink unchanged
//! - Record the status and the number of body bytes sent
//! - Tee body bytes into a secondary writer
//!
//! # Design Decisions
//! - Out-of-range status codes become 500, on the wire and in the record
//! - HEAD bodies are neither sent nor counted
//! - One mutex guards the tee and the recorded metadata

use axum::http::{HeaderMap, Method, StatusCode};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::http::sink::{coerce_status, Connection, Flusher, Hijacker, ResponseStatus, ResponseWriter};

/// Secondary consumer of the bytes written to an [`Interceptor`].
pub type Tee = Box<dyn Write + Send>;

#[derive(Default)]
struct Tracked {
    status: ResponseStatus,
    size: usize,
    tee: Option<Tee>,
}

/// Pass-through sink that records response metadata.
pub struct Interceptor<W> {
    inner: W,
    suppress_body: bool,
    tracked: Arc<Mutex<Tracked>>,
}

impl<W: ResponseWriter> Interceptor<W> {
    /// Wrap `inner` for a response to `method`.
    pub fn wrap(inner: W, method: &Method) -> Self {
        Self {
            inner,
            suppress_body: method == Method::HEAD,
            tracked: Arc::new(Mutex::new(Tracked::default())),
        }
    }

    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a copy of every body byte to `tee`, replacing any previous tee.
    pub fn tee(&self, tee: Tee) {
        self.tracked().tee = Some(tee);
    }

    pub fn status(&self) -> ResponseStatus {
        self.tracked().status
    }

    /// Body bytes sent so far.
    pub fn size(&self) -> usize {
        self.tracked().size
    }

    pub fn written(&self) -> bool {
        self.status().is_written()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for Interceptor<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, code: u16) {
        let status = coerce_status(code);
        self.inner.write_header(status.as_u16());
        self.tracked().status = ResponseStatus::Code(status);
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if !self.written() {
            self.write_header(StatusCode::OK.as_u16());
        }
        if self.suppress_body {
            return Ok(buf.len());
        }

        let mut result = self.inner.write(buf);
        let n = match &result {
            Ok(n) => (*n).min(buf.len()),
            Err(_) => 0,
        };

        let mut tracked = self.tracked();
        if let Some(tee) = tracked.tee.as_mut() {
            if let Err(err) = tee.write_all(&buf[..n]) {
                if result.is_ok() {
                    result = Err(Error::from(err));
                }
            }
        }
        tracked.size += n;
        result
    }

    fn flusher(&self) -> Option<Arc<dyn Flusher>> {
        self.inner.flusher()
    }

    fn hijacker(&self) -> Option<Arc<dyn Hijacker>> {
        let inner = self.inner.hijacker()?;
        Some(Arc::new(TrackedHijacker {
            inner,
            tracked: Arc::clone(&self.tracked),
        }))
    }
}

struct TrackedHijacker {
    inner: Arc<dyn Hijacker>,
    tracked: Arc<Mutex<Tracked>>,
}

impl Hijacker for TrackedHijacker {
    fn hijack(&self) -> Result<Connection, Error> {
        let conn = self.inner.hijack()?;
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status = ResponseStatus::TakenOver;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::recorder::ResponseRecorder;
    use std::io;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenTee;

    impl Write for BrokenTee {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "tee closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn records_status_and_size() {
        let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::GET);
        assert!(!w.written());
        assert_eq!(w.status().as_i32(), 0);

        w.write(b"hello ").unwrap();
        w.write(b"world").unwrap();

        assert_eq!(w.status(), ResponseStatus::Code(StatusCode::OK));
        assert_eq!(w.size(), 11);
        assert_eq!(w.into_inner().body(), b"hello world");
    }

    #[test]
    fn invalid_status_is_recorded_as_500() {
        for code in [0u16, 99, 1000] {
            let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::GET);
            w.write_header(code);
            assert!(w.written());
            assert_eq!(w.status().as_i32(), 500);
            assert_eq!(w.into_inner().status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        }
        for code in [100u16, 999] {
            let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::GET);
            w.write_header(code);
            assert_eq!(w.status().as_i32(), i32::from(code));
        }
    }

    #[test]
    fn tee_receives_body_bytes() {
        let buf = SharedBuf::default();
        let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::GET);
        w.tee(Box::new(buf.clone()));
        w.write_header(418);
        w.write(b"short and stout").unwrap();

        assert_eq!(buf.0.lock().unwrap().as_slice(), b"short and stout");
    }

    #[test]
    fn tee_failure_is_reported_after_primary_write() {
        let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::GET);
        w.tee(Box::new(BrokenTee));

        let err = w.write(b"data").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(w.size(), 4);
        assert_eq!(w.into_inner().body(), b"data");
    }

    #[test]
    fn primary_error_is_not_masked_by_tee() {
        let (conn, _peer) = tokio::io::duplex(8);
        let mut rec = ResponseRecorder::new().with_connection(conn);
        let _conn = rec.hijack().unwrap();

        let mut w = Interceptor::wrap(rec, &Method::GET);
        w.tee(Box::new(BrokenTee));
        assert!(matches!(w.write(b"x"), Err(Error::Hijacked)));
        assert_eq!(w.size(), 0);
    }

    #[test]
    fn head_body_is_not_sent() {
        let buf = SharedBuf::default();
        let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::HEAD);
        w.tee(Box::new(buf.clone()));

        assert_eq!(w.write(b"body").unwrap(), 4);
        assert_eq!(w.size(), 0);
        assert!(buf.0.lock().unwrap().is_empty());
        assert!(w.into_inner().body().is_empty());
    }

    #[test]
    fn hijack_marks_taken_over() {
        let (conn, _peer) = tokio::io::duplex(8);
        let mut w = Interceptor::wrap(ResponseRecorder::new().with_connection(conn), &Method::GET);

        assert!(w.hijack().is_ok());
        assert_eq!(w.status(), ResponseStatus::TakenOver);
        assert_eq!(w.status().as_i32(), -1);
        assert!(w.written());
    }

    #[test]
    fn hijack_unsupported_leaves_status_alone() {
        let mut w = Interceptor::wrap(ResponseRecorder::new(), &Method::GET);
        assert!(matches!(w.hijack(), Err(Error::HijackUnsupported)));
        assert!(!w.written());
    }
}
