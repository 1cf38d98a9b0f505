// ABOUTME: Alert sink POSTing each event as JSON to an HTTP endpoint.
// ABOUTME: Any non-2xx response is a transport error.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, Uri};

use super::{AlertEvent, AlertSink, TransportError};
use crate::http::{self, HttpError};

pub struct WebhookSink {
    url: Uri,
}

impl WebhookSink {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| {
                HttpError::InvalidUrl(url.to_string(), e.to_string())
            })?;
        Ok(Self { url })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), TransportError> {
        let mut payload = serde_json::to_value(event)?;
        payload["severity"] = serde_json::Value::String(event.severity().to_string());
        payload["summary"] = serde_json::Value::String(event.summary());
        let body = Bytes::from(serde_json::to_vec(&payload)?);

        let response = http::send(Method::POST, &self.url, Some("application/json"), body).await?;
        if !response.status.is_success() {
            return Err(TransportError::Status(response.status.as_u16()));
        }
        Ok(())
    }
}
