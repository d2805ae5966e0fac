use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier::{NetworkResponse, OutgoingRequest, Transport, TransportError, TransportErrorKind};
use http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue};
use tracing::debug;

/// Failure while configuring a [`ReqwestTransport`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A default header name is not a valid HTTP token.
    #[error("invalid default header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),

    /// A default header value contains forbidden bytes.
    #[error("invalid default header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),

    /// reqwest rejected the client configuration.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Courier transport that performs exchanges with a [`reqwest::Client`].
///
/// Non-2xx responses are returned as `Ok`; the queue decides what counts as
/// a failure.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Starts configuring a transport with its own client.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Underlying client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self::new(client)
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    default_headers: Vec<(String, String)>,
}

impl ReqwestTransportBuilder {
    /// Deadline applied to every exchange unless the queue sets a shorter one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deadline for establishing connections.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Header sent with every request that doesn't set it itself.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<ReqwestTransport, BuildError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(ReqwestTransport::new(builder.build()?))
    }
}

/// Flattens response headers, joining repeated names with `", "`.
fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            debug!(header = %name, "Skipping non-ASCII response header");
            continue;
        };
        collected
            .entry(name.as_str().to_owned())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }
    collected
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::connection(error.to_string())
    } else {
        TransportError::new(TransportErrorKind::Other, error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<NetworkResponse, TransportError> {
        let OutgoingRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        debug!(%method, %url, "Sending request");
        let mut builder = self.client.request(http::Method::from(method), url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(map_error)?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(map_error)?;
        let network_time = start.elapsed();
        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = network_time.as_millis(),
            "Received response"
        );

        let mut response = NetworkResponse::new(status, body);
        response.headers = headers;
        response.network_time = network_time;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("etag", HeaderValue::from_static("\"v1\""));

        let collected = collect_headers(&headers);
        assert_eq!(collected["set-cookie"], "a=1, b=2");
        assert_eq!(collected["etag"], "\"v1\"");
    }

    #[test]
    fn invalid_default_header_is_rejected() {
        let result = ReqwestTransport::builder()
            .default_header("bad header", "value")
            .build();
        assert!(matches!(result, Err(BuildError::HeaderName(_))));
    }
}
