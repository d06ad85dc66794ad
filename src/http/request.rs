//! Request handed to handlers.
//!
//! # Responsibilities
//! - Carry method, URI, headers and the fully-read body
//! - Carry the cancellation/deadline [`Context`]
//!
//! # Design Decisions
//! - The body is read before the handler runs; handlers never see a stream
//! - Replacing the context yields a new request, the original is consumed

use axum::http::{self, HeaderMap, Method, Uri, Version};
use bytes::Bytes;
use std::net::SocketAddr;

use crate::resilience::context::Context;

/// An inbound request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    ctx: Context,
}

impl Request {
    /// Create a request with an empty body and a fresh root context.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            ctx: Context::new(),
        }
    }

    /// Shorthand for a `GET` of `uri`.
    pub fn get(uri: &'static str) -> Self {
        Self::new(Method::GET, Uri::from_static(uri))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// The request's cancellation/deadline context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Replace the context.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: None,
            ctx: Context::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_http_request_keeps_parts() {
        let req = http::Request::post("/upload?x=1")
            .header("content-type", "text/plain")
            .body(Bytes::from_static(b"payload"))
            .unwrap();

        let req = Request::from(req);
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/upload");
        assert_eq!(req.headers()["content-type"], "text/plain");
        assert_eq!(req.body().as_ref(), b"payload");
        assert!(!req.context().is_done());
    }

    #[test]
    fn with_context_replaces_context() {
        let ctx = Context::new();
        let req = Request::get("/").with_context(ctx.clone());
        ctx.cancel();
        assert!(req.context().is_done());
    }
}
