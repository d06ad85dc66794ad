//! Demonstration handler served by the binary.
//!
//! - `/echo` writes the request body back
//! - `/sleep/{ms}` waits, then writes `slept {ms}ms`
//! - `/status/{code}` answers with that status and no body

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use std::time::Duration;

use crate::http::handler::Handler;
use crate::http::request::Request;
use crate::http::sink::ResponseWriter;

pub struct Demo;

#[async_trait]
impl Handler for Demo {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: Request) {
        let path = req.uri().path().to_owned();
        let mut segments = path.trim_start_matches('/').splitn(2, '/');
        match (segments.next(), segments.next()) {
            (Some("echo"), None) => echo(w, &req),
            (Some("sleep"), Some(ms)) => match ms.parse::<u64>() {
                Ok(ms) => sleep(w, &req, ms).await,
                Err(_) => reply(w, StatusCode::BAD_REQUEST, "invalid duration"),
            },
            (Some("status"), Some(code)) => match code.parse::<u16>() {
                Ok(code) => w.write_header(code),
                Err(_) => reply(w, StatusCode::BAD_REQUEST, "invalid status code"),
            },
            _ => reply(w, StatusCode::NOT_FOUND, "not found"),
        }
    }
}

fn echo(w: &mut dyn ResponseWriter, req: &Request) {
    if let Some(content_type) = req.headers().get(header::CONTENT_TYPE) {
        w.headers_mut().insert(header::CONTENT_TYPE, content_type.clone());
    }
    if let Err(err) = w.write(req.body()) {
        tracing::debug!(error = %err, "echo write failed");
    }
}

async fn sleep(w: &mut dyn ResponseWriter, req: &Request, ms: u64) {
    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(ms)) => {
            if let Err(err) = w.write(format!("slept {ms}ms").as_bytes()) {
                tracing::debug!(error = %err, "sleep write failed");
            }
        }
        () = req.context().done() => {
            tracing::debug!(ms, "sleep abandoned, request context done");
        }
    }
}

fn reply(w: &mut dyn ResponseWriter, status: StatusCode, body: &str) {
    w.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    w.write_header(status.as_u16());
    let _ = w.write(body.as_bytes());
}
