//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to the server and the supervisors it builds
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - Every field has a default; an empty file is a valid config
//! - CLI flags override file values before validation

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::*;
pub use validation::{validate_config, ValidationError};
