//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Adapt a [`Handler`] into a `tower::Service` for axum
//! - Read request bodies up to the configured limit
//! - Turn the recorded response into an HTTP response
//! - Bind server to listener with graceful shutdown

use axum::{
    extract::ConnectInfo,
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::Service;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::handler::Handler;
use crate::http::recorder::ResponseRecorder;
use crate::http::request::Request;

/// Serves a [`Handler`] as a `tower::Service`.
///
/// Each call gets a fresh root context, cancelled when the call's future
/// is dropped or completes.
pub struct HandlerService<H> {
    handler: Arc<H>,
    max_body_bytes: usize,
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl<H: Handler> HandlerService<H> {
    pub fn new(handler: H, max_body_bytes: usize) -> Self {
        Self {
            handler: Arc::new(handler),
            max_body_bytes,
        }
    }
}

impl<H: Handler> Service<axum::extract::Request> for HandlerService<H> {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: axum::extract::Request) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let limit = self.max_body_bytes;
        Box::pin(async move { Ok(dispatch(&*handler, limit, req).await) })
    }
}

async fn dispatch<H: Handler>(handler: &H, limit: usize, req: axum::extract::Request) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(path = %parts.uri.path(), error = %err, "request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let mut request = Request::from(http::Request::from_parts(parts, body));
    if let Some(addr) = remote {
        request = request.with_remote_addr(addr);
    }
    let _cancel = request.context().cancel_on_drop();

    let mut recorder = ResponseRecorder::for_method(request.method());
    handler.serve(&mut recorder, request).await;
    recorder.into_response()
}

/// HTTP server running one handler for every path.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new<H: Handler>(config: ServerConfig, handler: H) -> Self {
        let service = HandlerService::new(handler, config.listener.max_body_bytes);
        let router = Router::new()
            .fallback_service(service)
            .layer(TraceLayer::new_for_http());
        Self { router, config }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_ms = self.config.timeouts.request_ms,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::handler_fn;
    use crate::http::sink::ResponseWriter;
    use axum::body::Body;
    use tower::ServiceExt;

    fn echo() -> impl Handler {
        handler_fn(|w, req| {
            Box::pin(async move {
                w.headers_mut()
                    .insert("x-method", http::HeaderValue::from_str(req.method().as_str()).unwrap());
                let _ = w.write(req.body());
            })
        })
    }

    #[tokio::test]
    async fn service_runs_handler() {
        let svc = HandlerService::new(echo(), 1024);
        let req = http::Request::post("/").body(Body::from("ping")).unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-method"], "POST");
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(body.as_ref(), b"ping");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let svc = HandlerService::new(echo(), 4);
        let req = http::Request::post("/").body(Body::from("too long")).unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn context_is_cancelled_after_call() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let handler = handler_fn(move |_w, req| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(req.context().clone());
            }
            Box::pin(async {})
        });

        let svc = HandlerService::new(handler, 16);
        let req = http::Request::get("/").body(Body::empty()).unwrap();
        svc.oneshot(req).await.unwrap();

        let ctx = rx.await.unwrap();
        assert!(ctx.is_done());
    }
}
