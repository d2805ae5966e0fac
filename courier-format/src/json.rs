use bytes::Bytes;
use courier_core::{Charset, FormatError, FormatTag, Headers, Payload};

use super::{FormatHandler, is_empty_body, response_charset};

/// JSON format (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

/// JSON-HAL. Same wire encoding as JSON, different media type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHalFormat;

fn write_json(body: &dyn erased_serde::Serialize, charset: Charset) -> Result<Bytes, FormatError> {
    let text = serde_json::to_string(body).map_err(FormatError::serialize)?;
    charset.encode(&text).map(Bytes::from)
}

fn read_json(raw: &[u8], status: u16, headers: &Headers) -> Result<Payload, FormatError> {
    if is_empty_body(raw, status) {
        return Ok(Payload::Empty);
    }
    let value = match response_charset(headers) {
        Charset::Utf8 => serde_json::from_slice(raw),
        charset => serde_json::from_str(&charset.decode(raw)?),
    }
    .map_err(FormatError::deserialize)?;
    Ok(Payload::Json(value))
}

impl FormatHandler for JsonFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::Json
    }

    fn content_type(&self, charset: Charset) -> String {
        format!("application/json; charset={charset}")
    }

    fn accept_value(&self) -> Option<&str> {
        Some("application/json")
    }

    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError> {
        write_json(body, charset)
    }

    fn deserialize(
        &self,
        raw: &[u8],
        status: u16,
        headers: &Headers,
    ) -> Result<Payload, FormatError> {
        read_json(raw, status, headers)
    }
}

impl FormatHandler for JsonHalFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::JsonHal
    }

    fn content_type(&self, charset: Charset) -> String {
        format!("application/hal+json; charset={charset}")
    }

    fn accept_value(&self) -> Option<&str> {
        Some("application/hal+json")
    }

    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError> {
        write_json(body, charset)
    }

    fn deserialize(
        &self,
        raw: &[u8],
        status: u16,
        headers: &Headers,
    ) -> Result<Payload, FormatError> {
        read_json(raw, status, headers)
    }
}
