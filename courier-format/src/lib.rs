//! Body format handlers.
//!
//! A [`FormatHandler`] writes request bodies and decodes response bodies for
//! one [`FormatTag`](courier_core::FormatTag). Handlers are object safe and
//! resolved through a [`FormatRegistry`] when an envelope is built; the
//! generic helpers of [`FormatHandlerExt`] are available on every handler,
//! including `dyn FormatHandler`.
mod byte;
mod json;
mod multipart;
mod raster;
mod registry;
mod text;
mod xml;

use bytes::Bytes;
use courier_core::{Charset, FormatError, FormatTag, FromPayload, Headers, Payload};
use serde::Serialize;

pub use byte::ByteFormat;
pub use raster::ImageFormat;
pub use json::{JsonFormat, JsonHalFormat};
pub use multipart::MultipartFormat;
pub use registry::{FormatRegistry, HandlerFactory};
pub use text::TextFormat;
pub use xml::XmlFormat;

/// Object-safe serializer/deserializer for one body format.
pub trait FormatHandler: std::fmt::Debug + Send + Sync {
    /// Registry key of the handler.
    fn tag(&self) -> FormatTag;

    /// `Content-Type` of bodies written by this handler.
    fn content_type(&self, charset: Charset) -> String;

    /// Value for the `Accept` header, `None` when the format accepts anything.
    fn accept_value(&self) -> Option<&str> {
        None
    }

    /// Writes a body object.
    ///
    /// Fails with an encoding error when the text cannot be represented in
    /// `charset`.
    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError>;

    /// Decodes a response body.
    ///
    /// Empty bodies decode to [`Payload::Empty`].
    fn deserialize(&self, raw: &[u8], status: u16, headers: &Headers)
    -> Result<Payload, FormatError>;
}

/// Generic helpers available on every [`FormatHandler`].
pub trait FormatHandlerExt: FormatHandler {
    /// Writes any serializable value.
    fn serialize_value<T>(&self, value: &T, charset: Charset) -> Result<Bytes, FormatError>
    where
        T: Serialize,
    {
        self.serialize_body(value, charset)
    }

    /// Decodes a response body into the caller's type.
    ///
    /// Returns `Ok(None)` for empty bodies.
    fn deserialize_into<M>(
        &self,
        raw: &[u8],
        status: u16,
        headers: &Headers,
    ) -> Result<Option<M>, FormatError>
    where
        M: FromPayload,
    {
        match self.deserialize(raw, status, headers)? {
            Payload::Empty => Ok(None),
            payload => M::from_payload(payload).map(Some),
        }
    }
}

impl<T: FormatHandler + ?Sized> FormatHandlerExt for T {}

/// Charset announced by the `Content-Type` response header, UTF-8 otherwise.
pub(crate) fn response_charset(headers: &Headers) -> Charset {
    courier_core::response::header(headers, "content-type")
        .and_then(Charset::from_content_type)
        .unwrap_or_default()
}

/// Whether a response should be treated as having no body.
pub(crate) fn is_empty_body(raw: &[u8], status: u16) -> bool {
    status == 204 || raw.iter().all(u8::is_ascii_whitespace)
}
