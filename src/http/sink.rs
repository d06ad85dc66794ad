//! Response sink contract.
//!
//! # Responsibilities
//! - Define the capability set a handler writes its response into
//! - Model optional flush and connection takeover support
//! - Coerce malformed status codes
//!
//! # Design Decisions
//! - Optional capabilities are probed, never assumed; absence degrades to a
//!   no-op (flush) or `Error::HijackUnsupported` (takeover)
//! - Capabilities are `Arc` handles so a handler on another task can use them
//!   without borrowing the sink

use axum::http::{HeaderMap, StatusCode};
use std::panic::Location;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;

/// Raw byte stream handed out by a connection takeover.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connection seized from the server.
pub type Connection = Box<dyn Io>;

/// Incremental flushing support.
pub trait Flusher: Send + Sync {
    fn flush(&self);
}

/// Connection takeover support.
pub trait Hijacker: Send + Sync {
    /// Take the raw connection. After success, no response is written by
    /// anyone but the new owner.
    fn hijack(&self) -> Result<Connection, Error>;
}

/// Something that accepts a status line, headers and body bytes.
pub trait ResponseWriter: Send {
    /// Header map sent with the status. Mutations after the status is
    /// written have no effect.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Send the status line. Codes outside `100..=999` are replaced by 500.
    #[track_caller]
    fn write_header(&mut self, code: u16);

    /// Write body bytes, sending status 200 first if nothing was sent yet.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error>;

    /// Flush capability, if the sink has one.
    fn flusher(&self) -> Option<Arc<dyn Flusher>> {
        None
    }

    /// Takeover capability, if the sink has one.
    fn hijacker(&self) -> Option<Arc<dyn Hijacker>> {
        None
    }

    /// Flush buffered data to the client when supported.
    fn flush(&mut self) {
        if let Some(flusher) = self.flusher() {
            flusher.flush();
        }
    }

    /// Take over the underlying connection when supported.
    fn hijack(&mut self) -> Result<Connection, Error> {
        match self.hijacker() {
            Some(hijacker) => hijacker.hijack(),
            None => Err(Error::HijackUnsupported),
        }
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    #[track_caller]
    fn write_header(&mut self, code: u16) {
        (**self).write_header(code)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        (**self).write(buf)
    }

    fn flusher(&self) -> Option<Arc<dyn Flusher>> {
        (**self).flusher()
    }

    fn hijacker(&self) -> Option<Arc<dyn Hijacker>> {
        (**self).hijacker()
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for Box<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    #[track_caller]
    fn write_header(&mut self, code: u16) {
        (**self).write_header(code)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        (**self).write(buf)
    }

    fn flusher(&self) -> Option<Arc<dyn Flusher>> {
        (**self).flusher()
    }

    fn hijacker(&self) -> Option<Arc<dyn Hijacker>> {
        (**self).hijacker()
    }
}

/// Recorded response status of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseStatus {
    /// Nothing sent yet.
    #[default]
    Pending,
    /// A status line was sent.
    Code(StatusCode),
    /// The connection was taken over; no status will ever be sent.
    TakenOver,
}

impl ResponseStatus {
    /// True once anything but `Pending`.
    pub fn is_written(&self) -> bool {
        !matches!(self, ResponseStatus::Pending)
    }

    pub fn code(&self) -> Option<StatusCode> {
        match self {
            ResponseStatus::Code(code) => Some(*code),
            _ => None,
        }
    }

    /// Numeric form: 0 while pending, -1 once taken over.
    pub fn as_i32(&self) -> i32 {
        match self {
            ResponseStatus::Pending => 0,
            ResponseStatus::Code(code) => i32::from(code.as_u16()),
            ResponseStatus::TakenOver => -1,
        }
    }
}

/// Map a raw status code onto `100..=999`, substituting 500 otherwise.
pub fn coerce_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Receiver of advisory events raised while writing a response.
pub trait Diagnostics: Send + Sync {
    /// `write_header` was called after the status had already been written.
    fn superfluous_write_header(&self, caller: &'static Location<'static>);
}

/// Reports diagnostics as `tracing` warnings.
///
/// `Location` only knows file, line and column. The event is emitted on the
/// calling task inside its current span, so a handler running under
/// `#[tracing::instrument]` is named by that span.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn superfluous_write_header(&self, caller: &'static Location<'static>) {
        crate::observability::metrics::record_superfluous_write_header();
        tracing::warn!(caller = %caller, "superfluous write_header call");
    }
}

/// Discards every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn superfluous_write_header(&self, _caller: &'static Location<'static>) {}
}
