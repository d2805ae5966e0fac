use bytes::Bytes;
use courier_core::{Charset, FormatError, FormatTag, Headers, Payload};

use super::FormatHandler;

/// Raw bytes, passed through untouched.
///
/// Accepts byte sequences (`Vec<u8>`, `Bytes`, arrays of `u8`) and strings
/// as body objects; the charset only applies to strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteFormat;

impl FormatHandler for ByteFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::Byte
    }

    fn content_type(&self, _charset: Charset) -> String {
        "application/octet-stream".to_owned()
    }

    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError> {
        match serde_json::to_value(body).map_err(FormatError::serialize)? {
            serde_json::Value::String(text) => charset.encode(&text).map(Bytes::from),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|byte| u8::try_from(byte).ok())
                        .ok_or_else(|| {
                            FormatError::serialize(std::io::Error::other(format!(
                                "{item} is not a byte"
                            )))
                        })
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Bytes::from),
            other => Err(FormatError::serialize(std::io::Error::other(format!(
                "cannot write a {} as raw bytes",
                json_kind(&other)
            )))),
        }
    }

    fn deserialize(
        &self,
        raw: &[u8],
        _status: u16,
        _headers: &Headers,
    ) -> Result<Payload, FormatError> {
        if raw.is_empty() {
            return Ok(Payload::Empty);
        }
        Ok(Payload::Bytes(Bytes::copy_from_slice(raw)))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatHandlerExt;

    #[test]
    fn test_round_trip() {
        let data = vec![0u8, 1, 254, 255];
        let bytes = ByteFormat.serialize_value(&data, Charset::Utf8).unwrap();
        let decoded: Vec<u8> = ByteFormat
            .deserialize_into(&bytes, 200, &Headers::new())
            .unwrap()
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_rejects_non_bytes() {
        assert!(ByteFormat.serialize_value(&vec![300u32], Charset::Utf8).is_err());
        assert!(ByteFormat.serialize_value(&true, Charset::Utf8).is_err());
    }

    #[test]
    fn test_no_accept_value() {
        assert_eq!(ByteFormat.accept_value(), None);
    }
}
