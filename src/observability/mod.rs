//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor, access log, server:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured key/value events, never preformatted strings
//! - Metrics are cheap (atomic increments) and off by default

pub mod logging;
pub mod metrics;
