#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use prompt_studio::slots::LocalFile;
use prompt_studio::transport::HttpTransport;
use wiremock::MockServer;

pub const TOKEN: &str = "test-csrf-token";

/// PNG signature and header tag. Not a decodable image.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(&server.uri(), Duration::from_secs(5))
        .unwrap_or_else(|err| panic!("failed to build transport: {err}"))
        .with_csrf_token(TOKEN)
}

pub fn png(name: &str) -> LocalFile {
    LocalFile::new(name, "image/png", Bytes::from_static(PNG))
}

/// A base URL nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("failed to bind: {err}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("no local addr: {err}"));
    drop(listener);
    format!("http://{addr}")
}
