//! Error types shared by the response sinks and the supervisor.

use std::io;
use std::sync::Arc;

use crate::resilience::context::ContextError;

/// Error returned by [`ResponseWriter`](crate::http::ResponseWriter) operations.
///
/// The type is `Clone` because a timed-out writer hands the very same error
/// back on every subsequent call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The handler outlived its deadline and its response was replaced.
    #[error("http: Handler timeout")]
    HandlerTimeout,

    /// The request context was cancelled for a reason other than its deadline.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The underlying sink has no connection takeover support.
    #[error("the response writer doesn't support connection takeover")]
    HijackUnsupported,

    /// The connection has already been taken over by the handler.
    #[error("http: connection has been taken over")]
    Hijacked,

    /// Failure reported by the wrapped sink or a tee.
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),
}

impl Error {
    /// Returns true for the distinguished handler timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::HandlerTimeout)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_timeout_message() {
        assert_eq!(Error::HandlerTimeout.to_string(), "http: Handler timeout");
        assert!(Error::HandlerTimeout.is_timeout());
    }

    #[test]
    fn context_error_is_transparent() {
        let err = Error::from(ContextError::Canceled);
        assert_eq!(err.to_string(), "context canceled");
        assert!(!err.is_timeout());
    }

    #[test]
    fn io_errors_are_shared_between_clones() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        let copy = err.clone();
        match (err, copy) {
            (Error::Io(a), Error::Io(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected errors: {:?}", other),
        }
    }
}
