//! Timeout enforcement.
//!
//! # Responsibilities
//! - Run a handler on its own task under a deadline
//! - Decide exactly one outcome per request: completed, timed out or faulted
//! - Flush the buffered response, or replace it with a 503
//! - Re-raise handler panics on the caller's task
//!
//! # Outcome Selection
//! ```text
//! spawn(handler → TimeoutWriter)
//!     ├─ task panicked      → resume_unwind(payload)
//!     ├─ task finished      → copy headers, write status, write body
//!     └─ context done
//!          ├─ deadline      → 503 + timeout body, sticky HandlerTimeout
//!          └─ cancellation  → 503, sticky cancellation cause
//! ```
//!
//! # Design Decisions
//! - The handler task is never aborted; late writes hit the sticky error
//! - Nothing is written to the real sink after a connection takeover
//! - Timed-out requests return 503 Service Unavailable

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TimeoutConfig;
use crate::error::Error;
use crate::http::handler::{BoxHandler, Handler, Middleware};
use crate::http::request::Request;
use crate::http::sink::{Diagnostics, ResponseStatus, ResponseWriter, TracingDiagnostics};
use crate::observability::metrics;
use crate::resilience::context::{Context, ContextError};
use crate::resilience::timeout_writer::{lock, SharedBuffer, TimeoutWriter};

/// Body sent with a 503 when no message is configured.
pub const DEFAULT_TIMEOUT_BODY: &str =
    "<html><head><title>Timeout</title></head><body><h1>Timeout</h1></body></html>";

/// Resolved fate of one supervised request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler returned; its buffered response was flushed.
    Completed,
    /// The handler returned after taking over the connection.
    TakenOver,
    /// The deadline passed first.
    TimedOut,
    /// The request context was cancelled first.
    Canceled,
    /// The handler panicked.
    Faulted,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::TakenOver => "taken_over",
            Outcome::TimedOut => "timed_out",
            Outcome::Canceled => "canceled",
            Outcome::Faulted => "faulted",
        }
    }
}

/// Runs a handler with a time limit.
///
/// If the handler runs longer than its limit, the client receives a 503
/// Service Unavailable with the configured body, and every later write by
/// the handler returns [`Error::HandlerTimeout`].
pub struct TimeoutHandler<H> {
    handler: Arc<H>,
    dt: Duration,
    body: String,
    diagnostics: Arc<dyn Diagnostics>,
    /// When set, no context is derived and this one is used instead.
    context: Option<Context>,
}

/// Wrap `handler` with a deadline of `dt`. An empty `msg` selects
/// [`DEFAULT_TIMEOUT_BODY`].
pub fn supervise<H: Handler>(handler: H, dt: Duration, msg: impl Into<String>) -> TimeoutHandler<H> {
    TimeoutHandler::new(handler, dt, msg)
}

/// Middleware form of [`supervise`].
pub fn set_timeout(dt: Duration, msg: impl Into<String>) -> Middleware {
    let msg = msg.into();
    Arc::new(move |inner: BoxHandler| Arc::new(TimeoutHandler::new(inner, dt, msg.clone())) as BoxHandler)
}

impl<H: Handler> TimeoutHandler<H> {
    pub fn new(handler: H, dt: Duration, msg: impl Into<String>) -> Self {
        Self {
            handler: Arc::new(handler),
            dt,
            body: msg.into(),
            diagnostics: Arc::new(TracingDiagnostics),
            context: None,
        }
    }

    /// Supervise `handler` with a caller-controlled context instead of a
    /// deadline. The supervisor never cancels `ctx` itself.
    pub fn with_context(handler: H, ctx: Context) -> Self {
        Self {
            context: Some(ctx),
            ..Self::new(handler, Duration::ZERO, String::new())
        }
    }

    /// Supervise `handler` with the `[timeouts]` section of the config.
    pub fn from_config(handler: H, config: &TimeoutConfig) -> Self {
        Self::new(handler, config.duration(), config.message.clone())
    }

    /// Replace the sink receiving superfluous `write_header` reports.
    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.body = msg.into();
        self
    }

    fn error_body(&self) -> &str {
        if self.body.is_empty() {
            DEFAULT_TIMEOUT_BODY
        } else {
            &self.body
        }
    }

    fn complete(&self, w: &mut dyn ResponseWriter, tw: TimeoutWriter) -> Outcome {
        let (pending, state) = tw.into_parts();
        let mut buffered = lock(&state);
        if buffered.status == ResponseStatus::TakenOver {
            return Outcome::TakenOver;
        }

        let headers = buffered.headers.take().unwrap_or(pending);
        copy_headers(w.headers_mut(), headers);
        let status = buffered.status.code().unwrap_or(StatusCode::OK);
        w.write_header(status.as_u16());
        if let Err(err) = w.write(&buffered.body) {
            tracing::debug!(error = %err, "failed to write buffered response");
        }
        Outcome::Completed
    }

    fn time_out(&self, w: &mut dyn ResponseWriter, state: &SharedBuffer, cause: ContextError) -> Outcome {
        let mut buffered = lock(state);
        let (err, body, outcome) = match cause {
            ContextError::DeadlineExceeded => {
                (Error::HandlerTimeout, Some(self.error_body()), Outcome::TimedOut)
            }
            ContextError::Canceled => (Error::Context(cause), None, Outcome::Canceled),
        };

        if buffered.status != ResponseStatus::TakenOver {
            if let Some(body) = body {
                w.headers_mut().insert(header::CONTENT_TYPE, content_type_for(body));
            }
            w.write_header(StatusCode::SERVICE_UNAVAILABLE.as_u16());
            if let Some(body) = body {
                if let Err(err) = w.write(body.as_bytes()) {
                    tracing::debug!(error = %err, "failed to write timeout response");
                }
            }
        }
        buffered.err = Some(err);
        outcome
    }
}

#[async_trait]
impl<H: Handler> Handler for TimeoutHandler<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request) {
        let started = Instant::now();
        let (ctx, _cancel) = match &self.context {
            Some(ctx) => (ctx.clone(), None),
            None => {
                let ctx = req.context().with_timeout(self.dt);
                let guard = ctx.cancel_on_drop();
                (ctx, Some(guard))
            }
        };
        let path = req.uri().path().to_owned();
        let req = req.with_context(ctx.clone());

        let tw = TimeoutWriter::new(&*w, req.method(), Arc::clone(&self.diagnostics));
        let state = tw.shared();
        let handler = Arc::clone(&self.handler);
        let mut task = tokio::spawn(async move {
            let mut tw = tw;
            handler.serve(&mut tw, req).await;
            tw
        });

        let outcome = tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(tw) => self.complete(w, tw),
                Err(err) if err.is_panic() => {
                    let payload = err.into_panic();
                    tracing::error!(path = %path, panic = %panic_message(&*payload), "handler panicked");
                    metrics::record_outcome(Outcome::Faulted.as_str(), started.elapsed());
                    std::panic::resume_unwind(payload);
                }
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "handler task was cancelled");
                    self.time_out(w, &state, ContextError::Canceled)
                }
            },
            () = ctx.done() => {
                let cause = ctx.err().unwrap_or(ContextError::Canceled);
                self.time_out(w, &state, cause)
            }
        };

        let elapsed = started.elapsed();
        match outcome {
            Outcome::TimedOut => tracing::warn!(
                path = %path,
                timeout_ms = self.dt.as_millis() as u64,
                "handler timed out"
            ),
            Outcome::Canceled => tracing::debug!(path = %path, "request cancelled before handler finished"),
            _ => tracing::trace!(path = %path, outcome = outcome.as_str(), "handler finished"),
        }
        metrics::record_outcome(outcome.as_str(), elapsed);
    }
}

/// Copy `src` into `dst`, replacing every key present in `src`.
fn copy_headers(dst: &mut HeaderMap, src: HeaderMap) {
    let mut current = None;
    for (name, value) in src {
        if let Some(name) = name {
            dst.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            dst.append(name.clone(), value);
        }
    }
}

fn content_type_for(body: &str) -> HeaderValue {
    if body.trim_start().starts_with('<') {
        HeaderValue::from_static("text/html; charset=utf-8")
    } else {
        HeaderValue::from_static("text/plain; charset=utf-8")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "Box<dyn Any>"
    }
}
