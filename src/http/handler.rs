//! Handler abstraction and composition.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::http::request::Request;
use crate::http::sink::ResponseWriter;

/// A unit of request-processing logic.
///
/// A handler writes its response into `w`. It may block, write any number
/// of times, panic, or take over the connection.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request);
}

/// Shared, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

/// Wraps one handler into another.
pub type Middleware = Arc<dyn Fn(BoxHandler) -> BoxHandler + Send + Sync>;

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request) {
        (**self).serve(w, req).await
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request) {
        (**self).serve(w, req).await
    }
}

/// Handler backed by a closure, see [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Build a handler from a closure returning a boxed future.
///
/// ```ignore
/// let hello = handler_fn(|w, _req| Box::pin(async move {
///     let _ = w.write(b"hello");
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request) {
        (self.f)(w, req).await
    }
}

/// Apply middlewares to a handler. The first middleware wraps the handler
/// directly, the last one ends up outermost.
pub fn chain<I>(handler: BoxHandler, middlewares: I) -> BoxHandler
where
    I: IntoIterator<Item = Middleware>,
{
    middlewares
        .into_iter()
        .fold(handler, |handler, middleware| middleware(handler))
}
