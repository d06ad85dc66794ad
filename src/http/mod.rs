//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, body read, HandlerService)
//!     → request.rs (Request with a root Context)
//!     → handler.rs (middleware chain: access_log → supervisor → handler)
//!     → interceptor.rs (status/size/tee bookkeeping)
//!     → recorder.rs (real sink, converted into the HTTP response)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Handlers write into a `ResponseWriter`, never return a response value
//! - The body is read fully before any handler runs

pub mod access_log;
pub mod handler;
pub mod interceptor;
pub mod recorder;
pub mod request;
pub mod server;
pub mod sink;

pub use access_log::{access_log, AccessLog, LimitBuffer};
pub use handler::{chain, handler_fn, BoxHandler, Handler, HandlerFn, Middleware};
pub use interceptor::{Interceptor, Tee};
pub use recorder::ResponseRecorder;
pub use request::Request;
pub use server::{HandlerService, HttpServer};
pub use sink::{
    coerce_status, Connection, Diagnostics, Flusher, Hijacker, Io, NoopDiagnostics, ResponseStatus,
    ResponseWriter, TracingDiagnostics,
};
