//! Seam between the dispatch queue and an HTTP engine.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{NetworkResponse, RequestMethod, TransportError};
use indexmap::IndexMap;
use url::Url;

/// Everything a transport needs to put one envelope on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    /// HTTP verb.
    pub method: RequestMethod,
    /// Final URL, query parameters included.
    pub url: Url,
    /// Request headers, `Content-Type` included when a body is present.
    pub headers: IndexMap<String, String>,
    /// Encoded body.
    pub body: Option<Bytes>,
    /// Deadline for the whole exchange, if the queue imposes one.
    pub timeout: Option<Duration>,
}

impl OutgoingRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP engine used by a [`RequestQueue`](crate::RequestQueue).
///
/// Implementations return every response the server produced, whatever its
/// status; the queue turns non-2xx statuses into
/// [`TransportError::status`] errors. `Err` is reserved for exchanges that
/// produced no usable response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Performs one exchange.
    async fn execute(&self, request: OutgoingRequest) -> Result<NetworkResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, request: OutgoingRequest) -> Result<NetworkResponse, TransportError> {
        (**self).execute(request).await
    }
}
