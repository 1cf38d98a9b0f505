// ABOUTME: Minimal HTTP/1.1 client over hyper for health probes and webhooks.
// ABOUTME: One connection per request; plain http:// only.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid URL {0}: {1}")]
    InvalidUrl(String, String),

    #[error("connection to {0} failed: {1}")]
    Connect(String, String),

    #[error("request to {0} failed: {1}")]
    Request(String, String),
}

/// A completed response with its body collected.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Send a single request and collect the response body.
pub async fn send(
    method: Method,
    uri: &Uri,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<Response, HttpError> {
    let host = uri
        .host()
        .ok_or_else(|| HttpError::InvalidUrl(uri.to_string(), "missing host".to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(HttpError::InvalidUrl(
            uri.to_string(),
            "only http:// is supported".to_string(),
        ));
    }
    let port = uri.port_u16().unwrap_or(80);
    let authority = format!("{}:{}", host, port);

    let stream = TcpStream::connect(&authority)
        .await
        .map_err(|e| HttpError::Connect(authority.clone(), e.to_string()))?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| HttpError::Connect(authority.clone(), e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("http connection closed with error: {}", e);
        }
    });

    let path = uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/")
        .to_string();

    let mut builder = hyper::Request::builder()
        .method(method)
        .uri(path)
        .header(hyper::header::HOST, authority.as_str())
        .header(hyper::header::USER_AGENT, concat!("convoy/", env!("CARGO_PKG_VERSION")));
    if let Some(content_type) = content_type {
        builder = builder.header(hyper::header::CONTENT_TYPE, content_type);
    }
    let req = builder
        .body(Full::new(body))
        .map_err(|e| HttpError::Request(uri.to_string(), e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| HttpError::Request(uri.to_string(), e.to_string()))?;

    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| HttpError::Request(uri.to_string(), e.to_string()))?
        .to_bytes();

    Ok(Response { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_https() {
        let uri: Uri = "https://example.com/health".parse().unwrap();
        let err = send(Method::GET, &uri, None, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidUrl(_, _)));
    }

    #[tokio::test]
    async fn reads_status_and_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let uri: Uri = format!("http://{}/health", addr).parse().unwrap();
        let resp = send(Method::GET, &uri, None, Bytes::new()).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(&resp.body[..], b"ok");
    }
}
