//! Common test utilities and fixtures.

#![allow(dead_code)]

use quarry_lib::core::{Config, ConfigBuilder};
use quarry_lib::{Application, RunningApplication};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Config listening on ephemeral loopback ports with the memory index.
pub fn test_config() -> ConfigBuilder {
    ConfigBuilder::new()
        .bind_address([127, 0, 0, 1].into())
        .plaintext_port(0)
        .pickle_port(0)
        .connection_timeout(Duration::from_secs(5))
        .index_url("memory://")
}

/// Start a full application from `config`.
pub async fn start(config: Config) -> RunningApplication {
    Application::new(config).unwrap().start().await.unwrap()
}

/// Connect, write `payload`, and half-close the connection.
pub async fn send(addr: std::net::SocketAddr, payload: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
    stream
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
