//! Access log middleware.
//!
//! # Responsibilities
//! - Wrap the sink in an [`Interceptor`] to learn status and size
//! - Capture the head of error bodies through a [`LimitBuffer`] tee
//! - Emit one structured event per request
//!
//! # Design Decisions
//! - 1xx through 4xx log at INFO, 5xx at ERROR, no status at WARN
//! - Bodies are only attached for status >= 400

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::Level;

use crate::http::handler::{BoxHandler, Handler, Middleware};
use crate::http::interceptor::Interceptor;
use crate::http::request::Request;
use crate::http::sink::ResponseWriter;

/// Bytes of an error body kept by default.
pub const DEFAULT_ERROR_BODY_LIMIT: usize = 512;

/// Writer keeping the first `limit` bytes and silently dropping the rest.
///
/// Memory grows with what is written, never up front.
#[derive(Debug, Clone)]
pub struct LimitBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
    limit: usize,
}

impl LimitBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
            limit,
        }
    }

    /// Captured bytes, lossily decoded and trimmed.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).trim().to_owned()
    }
}

impl Write for LimitBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        let room = self.limit.saturating_sub(buf.len());
        buf.extend_from_slice(&data[..room.min(data.len())]);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Logs every request passing through the wrapped handler.
pub struct AccessLog<H> {
    handler: H,
    limit: usize,
}

impl<H: Handler> AccessLog<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            limit: DEFAULT_ERROR_BODY_LIMIT,
        }
    }

    /// Bytes of an error body attached to the event.
    pub fn error_body_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Middleware form of [`AccessLog`].
pub fn access_log(limit: usize) -> Middleware {
    Arc::new(move |inner: BoxHandler| Arc::new(AccessLog::new(inner).error_body_limit(limit)) as BoxHandler)
}

pub(crate) fn status_level(status: i32) -> Level {
    match status {
        s if s <= 0 => Level::WARN,
        s if s < 500 => Level::INFO,
        _ => Level::ERROR,
    }
}

pub(crate) fn status_label(status: i32) -> &'static str {
    match status {
        100..=299 => "OK",
        300..=399 => "Redirect",
        400..=499 => "Client Error",
        s if s >= 500 => "Server Error",
        _ => "Unknown",
    }
}

macro_rules! log_at {
    ($level:expr, $($rest:tt)+) => {
        let level = $level;
        if level == Level::ERROR {
            tracing::error!($($rest)+)
        } else if level == Level::WARN {
            tracing::warn!($($rest)+)
        } else {
            tracing::info!($($rest)+)
        }
    };
}

#[async_trait]
impl<H: Handler> Handler for AccessLog<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request) {
        let path = req.uri().path().to_owned();
        let method = req.method().clone();
        let remote = req
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut ww = Interceptor::wrap(&mut *w, &method);
        let buf = LimitBuffer::new(self.limit);
        ww.tee(Box::new(buf.clone()));

        let started = Instant::now();
        self.handler.serve(&mut ww, req).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = ww.status().as_i32();
        let bytes = ww.size();
        let label = status_label(status);
        if status >= 400 {
            let body = buf.contents();
            log_at!(status_level(status), %path, %method, %remote, status, bytes, elapsed_ms, %body, "{label}");
        } else {
            log_at!(status_level(status), %path, %method, %remote, status, bytes, elapsed_ms, "{label}");
        }
    }
}
