use bytes::Bytes;
use courier_core::{Charset, FormatError, FormatTag, Headers, Payload};

use super::{FormatHandler, response_charset};

/// Plain text.
///
/// String bodies are written as-is, any other value as its JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormat;

impl FormatHandler for TextFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::Text
    }

    fn content_type(&self, charset: Charset) -> String {
        format!("text/plain; charset={charset}")
    }

    fn accept_value(&self) -> Option<&str> {
        Some("text/plain")
    }

    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError> {
        let text = match serde_json::to_value(body).map_err(FormatError::serialize)? {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };
        charset.encode(&text).map(Bytes::from)
    }

    fn deserialize(
        &self,
        raw: &[u8],
        _status: u16,
        headers: &Headers,
    ) -> Result<Payload, FormatError> {
        if raw.is_empty() {
            return Ok(Payload::Empty);
        }
        response_charset(headers).decode(raw).map(Payload::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatHandlerExt;
    use courier_core::Typed;

    #[test]
    fn test_round_trip() {
        let bytes = TextFormat
            .serialize_value(&"hello world", Charset::Utf16Le)
            .unwrap();
        let mut headers = Headers::new();
        headers.insert("content-type".into(), "text/plain; charset=UTF-16LE".into());
        let text: String = TextFormat
            .deserialize_into(&bytes, 200, &headers)
            .unwrap()
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_json_looking_strings_round_trip() {
        let headers = Headers::new();
        for text in ["\"quoted\"", "42", "[1, 2]", "{\"a\":1}", "true"] {
            let bytes = TextFormat.serialize_value(&text, Charset::Utf8).unwrap();
            let typed: Typed<String> = TextFormat
                .deserialize_into(&bytes, 200, &headers)
                .unwrap()
                .unwrap();
            assert_eq!(typed.into_inner(), text);
        }
    }

    #[test]
    fn test_empty_string_reads_back_as_no_body() {
        let bytes = TextFormat.serialize_value(&"", Charset::Utf8).unwrap();
        let text: Option<String> = TextFormat
            .deserialize_into(&bytes, 200, &Headers::new())
            .unwrap();
        assert_eq!(text, None);
    }

    #[test]
    fn test_non_string_values_use_json_text() {
        let bytes = TextFormat.serialize_value(&42, Charset::Utf8).unwrap();
        assert_eq!(bytes.as_ref(), b"42");
    }
}
