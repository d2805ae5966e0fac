//! Wire responses and the per-request result holder.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::error::RequestError;

/// Response headers, keyed by name as received.
pub type Headers = HashMap<String, String>;

/// Raw response handed back by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Undecoded body.
    pub body: Bytes,
    /// The server answered `304 Not Modified`.
    pub not_modified: bool,
    /// Time spent on the wire.
    pub network_time: Duration,
}

impl NetworkResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
            not_modified: status == 304,
            network_time: Duration::ZERO,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Case-insensitive lookup in a header map.
pub fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Outcome of one request.
///
/// Created empty with the envelope and replaced wholesale when the request
/// completes. Callers receive a copy.
#[derive(Debug, Clone)]
pub struct ResponseData<R, E = ()> {
    /// Decoded body of a successful response. `None` for empty bodies.
    pub result: Option<R>,
    /// Decoded body of an error response, when an error type is configured.
    pub parsed_error: Option<E>,
    /// Status code, when a response was received.
    pub status_code: Option<u16>,
    /// Response headers.
    pub headers: Headers,
    /// Transport or parse failure.
    pub error: Option<RequestError>,
}

impl<R, E> Default for ResponseData<R, E> {
    fn default() -> Self {
        Self {
            result: None,
            parsed_error: None,
            status_code: None,
            headers: Headers::new(),
            error: None,
        }
    }
}

impl<R, E> ResponseData<R, E> {
    /// Fresh holder carrying the status and headers of a response.
    pub fn from_response(response: &NetworkResponse) -> Self {
        Self {
            status_code: Some(response.status),
            headers: response.headers.clone(),
            ..Self::default()
        }
    }

    /// Whether a response was received and no error was recorded.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code.is_some()
    }

    /// Whether an error was recorded.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}
