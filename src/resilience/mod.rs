//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request enters TimeoutHandler:
//!     → context.rs (derive a deadline context from the request's)
//!     → timeout_writer.rs (handler writes into an in-memory buffer)
//!     → timeouts.rs (race handler task against the deadline)
//!          → flush buffer to the real sink, or send 503
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every supervised handler has a deadline
//! - One outcome per request, decided under the buffer lock
//! - Late handler writes fail with a sticky error instead of racing the 503

pub mod context;
pub mod timeout_writer;
pub mod timeouts;

pub use context::{CancelGuard, Context, ContextError};
pub use timeout_writer::TimeoutWriter;
pub use timeouts::{set_timeout, supervise, Outcome, TimeoutHandler, DEFAULT_TIMEOUT_BODY};
