//! Bounded-time request execution for HTTP handlers.
//!
//! A [`TimeoutHandler`] runs a handler against an in-memory response
//! buffer and races it with a deadline. The client sees either the
//! handler's complete response or a 503, never a mix of both.

pub mod config;
pub mod demo;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServerConfig;
pub use error::Error;
pub use http::{chain, handler_fn, Handler, HttpServer, Request, ResponseWriter};
pub use lifecycle::Shutdown;
pub use resilience::{set_timeout, supervise, Context, TimeoutHandler};
