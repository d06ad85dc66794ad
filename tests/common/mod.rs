//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use request_deadline::config::ServerConfig;
use request_deadline::http::{Diagnostics, Handler, HttpServer};
use request_deadline::lifecycle::Shutdown;

/// A server running on an ephemeral local port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start `handler` behind an `HttpServer` bound to 127.0.0.1:0.
#[allow(dead_code)]
pub async fn start_server<H: Handler>(config: ServerConfig, handler: H) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    let server = HttpServer::new(config, handler);
    let task = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestServer { addr, shutdown, task }
}

/// Diagnostics sink remembering every reported caller.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingDiagnostics {
    callers: Mutex<Vec<&'static Location<'static>>>,
}

#[allow(dead_code)]
impl RecordingDiagnostics {
    pub fn callers(&self) -> Vec<&'static Location<'static>> {
        self.callers.lock().unwrap().clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn superfluous_write_header(&self, caller: &'static Location<'static>) {
        self.callers.lock().unwrap().push(caller);
    }
}
