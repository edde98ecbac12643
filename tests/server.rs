// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GenericImageView, ImageFormat};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mandelserver::server::ConnectionRegistry;
use mandelserver::{Server, ServerConfig};

const QUERY: &str = "centerX=-0.5&centerY=0&scaleFactor=0.1&resultWidth=20\
                     &resultHeight=10&pixelRatio=1.5&color=16744448";

struct Running {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    async fn start() -> Running {
        let server = Server::bind(ServerConfig::default()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });
        Running {
            addr,
            registry,
            stop,
            task,
        }
    }

    async fn exchange(&self, request: &str) -> Response {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        tokio::time::timeout(Duration::from_secs(20), stream.read_to_end(&mut raw))
            .await
            .unwrap()
            .unwrap();
        Response::parse(&raw)
    }

    fn get(&self, query: &str) -> String {
        format!(
            "GET /?{} HTTP/1.1\r\nHost: {}\r\nAccept: text/plain\r\n\r\n",
            query, self.addr
        )
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap();
    }
}

struct Response {
    status: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Response {
    fn parse(raw: &[u8]) -> Response {
        let text = String::from_utf8(raw.to_vec()).unwrap();
        let mut parts = text.splitn(2, "\r\n\r\n");
        let mut head = parts.next().unwrap().split("\r\n");
        let status = head.next().unwrap().to_string();
        let headers = head
            .map(|line| {
                let index = line.find(':').unwrap();
                (line[..index].to_string(), line[index + 1..].trim().to_string())
            })
            .collect();
        Response {
            status,
            headers,
            body: parts.next().unwrap_or("").to_string(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[tokio::test]
async fn renders_the_first_pass() {
    let server = Running::start().await;
    let response = server.exchange(&server.get(QUERY)).await;

    assert_eq!(response.status, "HTTP/1.1 200 OK");
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert_eq!(response.header("Connection"), Some("close"));
    assert_eq!(response.header("Scale-Factor"), Some("0.10000"));
    assert_eq!(
        response.header("Content-Length"),
        Some(response.body.len().to_string().as_str())
    );
    assert!(response
        .header("Info")
        .unwrap()
        .starts_with("Pass 1/2, max iterations: 96, time: "));
    assert!(response.header("ETag").is_some());
    assert!(response.header("Date").unwrap().ends_with(" GMT"));
    assert!(response.header("Server").unwrap().starts_with("mandelserver/"));

    let bmp = STANDARD.decode(response.body.as_bytes()).unwrap();
    let image = image::load_from_memory_with_format(&bmp, ImageFormat::BMP).unwrap();
    assert_eq!(image.dimensions(), (30, 15));

    assert!(server.registry.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn serves_requests_one_after_another() {
    let server = Running::start().await;
    for _ in 0..3 {
        let response = server.exchange(&server.get(QUERY)).await;
        assert_eq!(response.status, "HTTP/1.1 200 OK");
    }
    server.stop().await;
}

#[tokio::test]
async fn rejects_foreign_host() {
    let server = Running::start().await;
    let request = format!("GET /?{} HTTP/1.1\r\nHost: 10.1.2.3:80\r\n\r\n", QUERY);
    let response = server.exchange(&request).await;
    assert_eq!(response.status, "HTTP/1.1 406 Not Acceptable");
    assert_eq!(response.header("Connection"), Some("close"));
    assert!(response.header("Date").is_some());
    assert!(response.header("Server").is_some());
    assert_eq!(response.body, "");
    assert!(server.registry.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn rejects_missing_parameter() {
    let server = Running::start().await;
    let query = QUERY.replace("&pixelRatio=1.5", "");
    let response = server.exchange(&server.get(&query)).await;
    assert_eq!(response.status, "HTTP/1.1 400 Bad Request");
    server.stop().await;
}

#[tokio::test]
async fn rejects_unknown_resource() {
    let server = Running::start().await;
    let request = format!("GET /index.html HTTP/1.1\r\nHost: {}\r\n\r\n", server.addr);
    let response = server.exchange(&request).await;
    assert_eq!(response.status, "HTTP/1.1 404 Not Found");
    server.stop().await;
}

#[tokio::test]
async fn rejects_other_methods_and_versions() {
    let server = Running::start().await;
    let post = server.get(QUERY).replacen("GET", "POST", 1);
    assert_eq!(
        server.exchange(&post).await.status,
        "HTTP/1.1 501 Not Implemented"
    );
    let old = server.get(QUERY).replacen("HTTP/1.1", "HTTP/1.0", 1);
    assert_eq!(
        server.exchange(&old).await.status,
        "HTTP/1.1 501 Not Implemented"
    );
    server.stop().await;
}

#[tokio::test]
async fn unparseable_value_is_an_internal_error() {
    let server = Running::start().await;
    let query = QUERY.replace("centerX=-0.5", "centerX=abc");
    let response = server.exchange(&server.get(&query)).await;
    assert_eq!(response.status, "HTTP/1.1 500 Internal Server Error");
    server.stop().await;
}

#[tokio::test]
async fn malformed_or_empty_requests_are_bad() {
    let server = Running::start().await;
    let response = server.exchange("GET /?a=1\r\n\r\n").await;
    assert_eq!(response.status, "HTTP/1.1 400 Bad Request");

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    assert_eq!(Response::parse(&raw).status, "HTTP/1.1 400 Bad Request");
    server.stop().await;
}

#[tokio::test]
async fn accepts_lf_only_requests() {
    let server = Running::start().await;
    let request = format!("GET /?{} HTTP/1.1\nHost: {}\n\n", QUERY, server.addr);
    let response = server.exchange(&request).await;
    assert_eq!(response.status, "HTTP/1.1 200 OK");
    server.stop().await;
}

#[tokio::test]
async fn departed_clients_are_forgotten() {
    let server = Running::start().await;
    let query = QUERY
        .replace("resultWidth=20", "resultWidth=800")
        .replace("resultHeight=10", "resultHeight=800")
        .replace("pixelRatio=1.5", "pixelRatio=2");
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(server.get(&query).as_bytes())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    stream.set_linger(Some(Duration::from_secs(0))).unwrap();
    drop(stream);

    let response = server.exchange(&server.get(QUERY)).await;
    assert_eq!(response.status, "HTTP/1.1 200 OK");

    for _ in 0..100 {
        if server.registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.registry.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn half_closed_clients_still_get_their_frame() {
    let server = Running::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(server.get(QUERY).as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(20), stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    let response = Response::parse(&raw);
    assert_eq!(response.status, "HTTP/1.1 200 OK");
    assert!(server.registry.is_empty());
    server.stop().await;
}
