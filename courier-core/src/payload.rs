//! Decoded response bodies and the types they materialize into.
//!
//! Format handlers decode wire bytes into a [`Payload`], a closed set of
//! tagged variants. The caller picks the result type of a request through
//! its type parameters; [`FromPayload`] turns the payload into that type.

use std::any::type_name;
use std::fmt::Debug;
use std::ops::Deref;

use bytes::Bytes;
use image::DynamicImage;
use serde::de::DeserializeOwned;

use crate::error::FormatError;

/// Body decoded by a format handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The response carried no body.
    Empty,
    /// JSON or JSON-HAL document.
    Json(serde_json::Value),
    /// Well-formed XML document.
    Xml(String),
    /// Decoded text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// Decoded image.
    Image(DynamicImage),
}

impl Payload {
    /// Name of the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Json(_) => "json",
            Payload::Xml(_) => "xml",
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Image(_) => "image",
        }
    }

    /// Whether the response had no body.
    pub const fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    fn mismatch<T>(&self) -> FormatError {
        FormatError::Mismatch {
            target: type_name::<T>(),
            payload: self.kind(),
        }
    }
}

/// Result or error type of a request.
///
/// Implemented for the payload itself, common body types, and [`Typed`] for
/// any serde-deserializable model. The unit type means "no type configured":
/// error bodies of requests with `E = ()` are not decoded.
pub trait FromPayload: Sized + Clone + Debug + Send + Sync + 'static {
    /// Whether bodies should be decoded into this type at all.
    const DECODES: bool = true;

    /// Materializes the value from a non-empty payload.
    fn from_payload(payload: Payload) -> Result<Self, FormatError>;
}

impl FromPayload for () {
    const DECODES: bool = false;

    fn from_payload(_payload: Payload) -> Result<Self, FormatError> {
        Ok(())
    }
}

impl FromPayload for Payload {
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        Ok(payload)
    }
}

impl FromPayload for serde_json::Value {
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        match payload {
            Payload::Json(value) => Ok(value),
            Payload::Text(text) | Payload::Xml(text) => Ok(serde_json::Value::String(text)),
            Payload::Bytes(bytes) => serde_json::from_slice(&bytes).map_err(FormatError::deserialize),
            other => Err(other.mismatch::<Self>()),
        }
    }
}

impl FromPayload for String {
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        match payload {
            Payload::Text(text) | Payload::Xml(text) => Ok(text),
            Payload::Json(serde_json::Value::String(text)) => Ok(text),
            Payload::Json(value) => Ok(value.to_string()),
            Payload::Bytes(bytes) => {
                String::from_utf8(bytes.to_vec()).map_err(FormatError::deserialize)
            }
            other => Err(other.mismatch::<Self>()),
        }
    }
}

impl FromPayload for Bytes {
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        match payload {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Text(text) | Payload::Xml(text) => Ok(Bytes::from(text)),
            Payload::Json(value) => serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(FormatError::deserialize),
            other => Err(other.mismatch::<Self>()),
        }
    }
}

impl FromPayload for Vec<u8> {
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        Bytes::from_payload(payload).map(Vec::from)
    }
}

impl FromPayload for DynamicImage {
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        match payload {
            Payload::Image(image) => Ok(image),
            Payload::Bytes(bytes) => {
                image::load_from_memory(&bytes).map_err(FormatError::deserialize)
            }
            other => Err(other.mismatch::<Self>()),
        }
    }
}

/// Any serde model decoded from a JSON, JSON-HAL, XML or text payload.
///
/// ```
/// use courier_core::{FromPayload, Payload, Typed};
/// use serde::Deserialize;
///
/// #[derive(Debug, Clone, Deserialize, PartialEq)]
/// struct Page {
///     id: u32,
/// }
///
/// let page = Typed::<Page>::from_payload(Payload::Json(serde_json::json!({"id": 7}))).unwrap();
/// assert_eq!(page.into_inner(), Page { id: 7 });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Typed<T>(pub T);

impl<T> Typed<T> {
    /// Unwraps the model.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Typed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> FromPayload for Typed<T>
where
    T: DeserializeOwned + Clone + Debug + Send + Sync + 'static,
{
    fn from_payload(payload: Payload) -> Result<Self, FormatError> {
        let value = match payload {
            Payload::Json(value) => serde_json::from_value(value).map_err(FormatError::deserialize)?,
            Payload::Xml(text) => quick_xml::de::from_str(&text).map_err(FormatError::deserialize)?,
            // String-like targets take the text verbatim; others read it as JSON.
            Payload::Text(text) => {
                match serde_json::from_value(serde_json::Value::String(text.clone())) {
                    Ok(value) => value,
                    Err(error) => match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(_) => return Err(FormatError::deserialize(error)),
                    },
                }
            }
            Payload::Bytes(bytes) => serde_json::from_slice(&bytes).map_err(FormatError::deserialize)?,
            other => return Err(other.mismatch::<Self>()),
        };
        Ok(Typed(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Article {
        title: String,
        views: u32,
    }

    #[test]
    fn test_typed_from_xml() {
        let xml = "<Article><title>Hello</title><views>3</views></Article>".to_owned();
        let article = Typed::<Article>::from_payload(Payload::Xml(xml)).unwrap();
        assert_eq!(
            article.0,
            Article {
                title: "Hello".into(),
                views: 3
            }
        );
    }

    #[test]
    fn test_typed_from_plain_text() {
        let text = Typed::<String>::from_payload(Payload::Text("not json".into())).unwrap();
        assert_eq!(text.into_inner(), "not json");
    }

    #[test]
    fn test_typed_string_keeps_json_looking_text() {
        for text in ["\"quoted\"", "42", "{\"a\":1}", "null"] {
            let typed = Typed::<String>::from_payload(Payload::Text(text.to_owned())).unwrap();
            assert_eq!(typed.into_inner(), text);
        }
    }

    #[test]
    fn test_typed_model_from_json_text() {
        let article = Typed::<Article>::from_payload(Payload::Text(
            r#"{"title":"Hello","views":3}"#.to_owned(),
        ))
        .unwrap();
        assert_eq!(article.views, 3);

        let views = Typed::<u32>::from_payload(Payload::Text("12".to_owned())).unwrap();
        assert_eq!(*views, 12);
    }

    #[test]
    fn test_mismatch_names_both_sides() {
        let error = DynamicImage::from_payload(Payload::Text("x".into())).unwrap_err();
        assert!(matches!(error, FormatError::Mismatch { payload: "text", .. }));
    }

    #[test]
    fn test_string_from_json_string() {
        let value = String::from_payload(Payload::Json(serde_json::json!("plain"))).unwrap();
        assert_eq!(value, "plain");
    }
}
