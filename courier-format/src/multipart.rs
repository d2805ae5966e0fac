use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};
use courier_core::{Charset, FormatError, FormatTag, Headers, Payload};
use serde_json::Value;

use super::FormatHandler;

/// `multipart/form-data` writer.
///
/// Each top-level field of the body object becomes one part. Strings,
/// numbers and booleans are sent as text parts, nested arrays and objects as
/// JSON parts, `null` fields are skipped.
///
/// Every instance owns a fresh boundary, so the `Content-Type` and the body it
/// writes always agree. Write-only: decoding fails with
/// [`FormatError::WriteOnly`].
#[derive(Debug, Clone)]
pub struct MultipartFormat {
    boundary: String,
}

impl MultipartFormat {
    /// Creates a handler with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("courier-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Creates a handler with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    /// The part delimiter.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }
}

impl Default for MultipartFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatHandler for MultipartFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::Multipart
    }

    fn content_type(&self, _charset: Charset) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError> {
        let Value::Object(fields) = serde_json::to_value(body).map_err(FormatError::serialize)?
        else {
            return Err(FormatError::serialize(std::io::Error::other(
                "multipart body must be a struct or a map",
            )));
        };

        let mut out = BytesMut::new();
        for (name, value) in fields {
            let (content_type, text) = match value {
                Value::Null => continue,
                Value::String(text) => (format!("text/plain; charset={charset}"), text),
                Value::Bool(_) | Value::Number(_) => {
                    (format!("text/plain; charset={charset}"), value.to_string())
                }
                Value::Array(_) | Value::Object(_) => {
                    (format!("application/json; charset={charset}"), value.to_string())
                }
            };
            let mut head = String::new();
            // Writing into a String cannot fail.
            let _ = write!(
                head,
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary,
                escape_name(&name),
                content_type
            );
            out.put_slice(head.as_bytes());
            out.put_slice(&charset.encode(&text)?);
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Ok(out.freeze())
    }

    fn deserialize(
        &self,
        _raw: &[u8],
        _status: u16,
        _headers: &Headers,
    ) -> Result<Payload, FormatError> {
        Err(FormatError::WriteOnly(FormatTag::Multipart))
    }
}

/// Percent-encodes the characters that would end a quoted field name or its
/// header line, as browsers do for `form-data` names.
fn escape_name(name: &str) -> String {
    name.replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatHandlerExt;
    use pretty_assertions::assert_eq;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Upload {
        title: String,
        count: u32,
        note: Option<String>,
        meta: Vec<u8>,
    }

    #[test]
    fn test_writes_one_part_per_field() {
        let handler = MultipartFormat::with_boundary("xyz");
        let upload = Upload {
            title: "Photo".into(),
            count: 2,
            note: None,
            meta: vec![1, 2],
        };
        let body = handler.serialize_value(&upload, Charset::Utf8).unwrap();
        let expected = "--xyz\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\
            Content-Type: text/plain; charset=UTF-8\r\n\r\n\
            Photo\r\n\
            --xyz\r\n\
            Content-Disposition: form-data; name=\"count\"\r\n\
            Content-Type: text/plain; charset=UTF-8\r\n\r\n\
            2\r\n\
            --xyz\r\n\
            Content-Disposition: form-data; name=\"meta\"\r\n\
            Content-Type: application/json; charset=UTF-8\r\n\r\n\
            [1,2]\r\n\
            --xyz--\r\n";
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), expected);
        assert_eq!(
            handler.content_type(Charset::Utf8),
            "multipart/form-data; boundary=xyz"
        );
    }

    #[test]
    fn test_field_names_cannot_break_the_header() {
        let mut fields = serde_json::Map::new();
        fields.insert("say \"hi\"\r\nX-Injected: 1".into(), Value::from("v"));
        let body = MultipartFormat::with_boundary("b")
            .serialize_value(&Value::Object(fields), Charset::Utf8)
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        assert!(body.contains("name=\"say %22hi%22%0D%0AX-Injected: 1\"\r\n"));
        assert!(!body.contains("\r\nX-Injected"));
    }

    #[test]
    fn test_each_instance_has_its_own_boundary() {
        assert_ne!(MultipartFormat::new().boundary(), MultipartFormat::new().boundary());
    }

    #[test]
    fn test_is_write_only() {
        let error = MultipartFormat::new()
            .deserialize(b"--x--", 200, &Headers::new())
            .unwrap_err();
        assert!(matches!(error, FormatError::WriteOnly(FormatTag::Multipart)));
    }

    #[test]
    fn test_scalar_body_is_rejected() {
        assert!(MultipartFormat::new().serialize_value(&"text", Charset::Utf8).is_err());
    }
}
