// ABOUTME: HTTP health probe issuing GET requests against per-environment URLs.
// ABOUTME: Environments without a URL defer to a fallback probe.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, Uri};
use std::collections::HashMap;
use std::sync::Arc;

use super::{HealthProbe, Observation, ProbeError};
use crate::config::EnvironmentDescriptor;
use crate::http;
use crate::types::EnvironmentName;

/// Probes `health_url` endpoints; a 2xx response counts as one healthy instance.
pub struct HttpProbe {
    endpoints: HashMap<EnvironmentName, Uri>,
    fallback: Option<Arc<dyn HealthProbe>>,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            endpoints: HashMap::new(),
            fallback: None,
        }
    }

    /// Register the `health_url` of every descriptor that has one.
    pub fn from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = &'a EnvironmentDescriptor>,
    ) -> Result<Self, ProbeError> {
        let mut probe = Self::new();
        for descriptor in descriptors {
            if let Some(ref url) = descriptor.health_url {
                probe = probe.with_endpoint(descriptor.name, url)?;
            }
        }
        Ok(probe)
    }

    pub fn with_endpoint(mut self, environment: EnvironmentName, url: &str) -> Result<Self, ProbeError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ProbeError::Unreachable(format!("invalid URL '{}': {}", url, e)))?;
        self.endpoints.insert(environment, uri);
        Ok(self)
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn HealthProbe>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn observe(&self, environment: EnvironmentName) -> Result<Observation, ProbeError> {
        let Some(uri) = self.endpoints.get(&environment) else {
            return match self.fallback {
                Some(ref fallback) => fallback.observe(environment).await,
                None => Err(ProbeError::NotConfigured(environment)),
            };
        };

        let response = http::send(Method::GET, uri, None, Bytes::new())
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;

        tracing::debug!(%environment, status = %response.status, "health endpoint responded");

        if response.status.is_success() {
            Ok(Observation::healthy(1))
        } else {
            Ok(Observation::unhealthy(1, 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            let reply = format!("HTTP/1.1 {}\r\ncontent-length: 0\r\n\r\n", status_line);
            socket.write_all(reply.as_bytes()).await.unwrap();
        });
        format!("http://{}/health", addr)
    }

    #[tokio::test]
    async fn success_status_is_healthy() {
        let url = serve_once("200 OK").await;
        let probe = HttpProbe::new()
            .with_endpoint(EnvironmentName::Dev, &url)
            .unwrap();

        let obs = probe.observe(EnvironmentName::Dev).await.unwrap();
        assert!(obs.is_healthy());
    }

    #[tokio::test]
    async fn error_status_is_unhealthy() {
        let url = serve_once("503 Service Unavailable").await;
        let probe = HttpProbe::new()
            .with_endpoint(EnvironmentName::Dev, &url)
            .unwrap();

        let obs = probe.observe(EnvironmentName::Dev).await.unwrap();
        assert!(!obs.is_healthy());
        assert_eq!(obs.running, 1);
    }

    #[tokio::test]
    async fn missing_endpoint_without_fallback_is_not_configured() {
        let probe = HttpProbe::new();
        let err = probe.observe(EnvironmentName::Staging).await.unwrap_err();
        assert!(matches!(err, ProbeError::NotConfigured(EnvironmentName::Staging)));
    }

    #[tokio::test]
    async fn missing_endpoint_uses_fallback() {
        struct AlwaysHealthy;

        #[async_trait]
        impl HealthProbe for AlwaysHealthy {
            async fn observe(&self, _: EnvironmentName) -> Result<Observation, ProbeError> {
                Ok(Observation::healthy(3))
            }
        }

        let probe = HttpProbe::new().with_fallback(Arc::new(AlwaysHealthy));
        let obs = probe.observe(EnvironmentName::Prod).await.unwrap();
        assert_eq!(obs.running, 3);
    }
}
