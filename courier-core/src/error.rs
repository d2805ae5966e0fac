//! Error taxonomy.
//!
//! - [`ConfigurationError`] is fatal and raised while an envelope is built.
//! - [`FormatError`] covers body encoding and decoding. Encoding failures
//!   degrade to an empty body, decoding failures become a failed delivery.
//! - [`TransportError`] is a network-layer failure reported by the transport.
//! - [`RequestError`] is what ends up in `ResponseData::error`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::charset::Charset;
use crate::format::FormatTag;
use crate::response::NetworkResponse;

/// Invalid envelope or registry configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A format name that does not map to any known tag.
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// A known tag with no handler in the registry in use.
    #[error("no handler registered for format {0}")]
    UnregisteredFormat(FormatTag),

    /// A verb name that does not map to any request method.
    #[error("unknown request method: {0}")]
    UnknownMethod(String),

    /// The request URL cannot be parsed.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as given by the caller.
        url: String,
        /// Parser message.
        reason: String,
    },
}

/// Serializing or deserializing a body failed.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The requested charset is not supported.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// A character has no representation in the target charset.
    #[error("character {character:?} cannot be encoded as {charset}")]
    Unmappable {
        /// Target charset.
        charset: Charset,
        /// Offending character.
        character: char,
    },

    /// The body object could not be serialized.
    #[error(transparent)]
    Serialize(Box<dyn std::error::Error + Send + Sync>),

    /// The payload is malformed.
    #[error(transparent)]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),

    /// The format only writes request bodies.
    #[error("{0} format cannot decode response bodies")]
    WriteOnly(FormatTag),

    /// The format only reads response bodies.
    #[error("{0} format cannot encode request bodies")]
    ReadOnly(FormatTag),

    /// The decoded payload kind does not fit the requested result type.
    #[error("cannot build {target} from a {payload} payload")]
    Mismatch {
        /// Requested result type.
        target: &'static str,
        /// Payload variant produced by the handler.
        payload: &'static str,
    },
}

impl FormatError {
    /// Wraps any error raised while writing a body.
    pub fn serialize(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        FormatError::Serialize(Box::new(error))
    }

    /// Wraps any error raised while reading a body.
    pub fn deserialize(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        FormatError::Deserialize(Box::new(error))
    }

    /// True for charset problems, the encoding errors that degrade to an empty body.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            FormatError::UnsupportedCharset(_) | FormatError::Unmappable { .. }
        )
    }
}

/// Category of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request did not finish in time.
    Timeout,
    /// The connection could not be established or broke.
    Connection,
    /// The server answered with a non-2xx status.
    Status,
    /// The request was cancelled before the transport finished.
    Cancelled,
    /// Anything else reported by the engine.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connection => "connection error",
            TransportErrorKind::Status => "error status",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// Network-layer failure.
///
/// Carries the error response when the server produced one, so its status,
/// headers and body can be surfaced to the caller.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    response: Option<NetworkResponse>,
}

impl TransportError {
    /// Creates an error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            response: None,
        }
    }

    /// Error for a response with a non-2xx status.
    pub fn status(response: NetworkResponse) -> Self {
        Self {
            kind: TransportErrorKind::Status,
            message: format!("server responded with status {}", response.status),
            response: Some(response),
        }
    }

    /// Shorthand for a [`TransportErrorKind::Timeout`] error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Shorthand for a [`TransportErrorKind::Connection`] error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, message)
    }

    /// Attaches the response the server sent along with the failure.
    pub fn with_response(mut self, response: NetworkResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Error category.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Human readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Response received with the failure, if any.
    pub fn response(&self) -> Option<&NetworkResponse> {
        self.response.as_ref()
    }
}

/// Terminal failure recorded on a `ResponseData`.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The transport failed or the server answered with an error status.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(Arc<FormatError>),
}

impl From<FormatError> for RequestError {
    fn from(error: FormatError) -> Self {
        RequestError::Parse(Arc::new(error))
    }
}

impl RequestError {
    /// Status code of the error response, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Transport(error) => error.response().map(|response| response.status),
            RequestError::Parse(_) => None,
        }
    }
}
