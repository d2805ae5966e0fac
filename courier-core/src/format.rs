//! Serialization kinds for request and response bodies.
//!
//! [`RequestFormat`] selects how an outgoing body is written and
//! [`ResponseFormat`] how an incoming body is read. Both map onto a
//! [`FormatTag`], the key under which a format handler is registered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigurationError;

/// Format used to serialize the body of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestFormat {
    /// `application/json`
    #[default]
    Json,
    /// `application/xml`
    Xml,
    /// `application/hal+json`
    JsonHal,
    /// `text/plain`
    Text,
    /// `multipart/form-data`, one part per field of the body object.
    Multipart,
}

/// Format used to decode the body of an incoming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseFormat {
    /// `application/json`
    Json,
    /// `application/xml`
    Xml,
    /// `application/hal+json`
    JsonHal,
    /// `text/plain`
    Text,
    /// Raw bytes, no decoding.
    Byte,
    /// Encoded image (PNG, JPEG, GIF).
    Image,
}

/// Registry key shared by request and response formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatTag {
    /// JSON
    Json,
    /// XML
    Xml,
    /// JSON-HAL
    JsonHal,
    /// Plain text
    Text,
    /// Multipart form data
    Multipart,
    /// Raw bytes
    Byte,
    /// Image
    Image,
}

impl FormatTag {
    /// Every built-in tag.
    pub const ALL: [FormatTag; 7] = [
        FormatTag::Json,
        FormatTag::Xml,
        FormatTag::JsonHal,
        FormatTag::Text,
        FormatTag::Multipart,
        FormatTag::Byte,
        FormatTag::Image,
    ];

    /// Upper-snake name, as used in configuration files.
    pub const fn name(&self) -> &'static str {
        match self {
            FormatTag::Json => "JSON",
            FormatTag::Xml => "XML",
            FormatTag::JsonHal => "JSON_HAL",
            FormatTag::Text => "TEXT",
            FormatTag::Multipart => "MULTIPART",
            FormatTag::Byte => "BYTE",
            FormatTag::Image => "IMAGE",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatTag {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatTag::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigurationError::UnknownFormat(s.to_owned()))
    }
}

impl RequestFormat {
    /// Response format used when the caller did not configure one.
    ///
    /// Each request format answers with the response format of the same
    /// name. Multipart has no response counterpart and falls back to JSON.
    pub fn default_response(&self) -> ResponseFormat {
        match self {
            RequestFormat::Json => ResponseFormat::Json,
            RequestFormat::Xml => ResponseFormat::Xml,
            RequestFormat::JsonHal => ResponseFormat::JsonHal,
            RequestFormat::Text => ResponseFormat::Text,
            RequestFormat::Multipart => {
                warn!(
                    "Multipart response isn't supported, using JSON. \
                     Set a response format on the request config to override"
                );
                ResponseFormat::Json
            }
        }
    }

    /// Registry key of this format.
    pub const fn tag(&self) -> FormatTag {
        match self {
            RequestFormat::Json => FormatTag::Json,
            RequestFormat::Xml => FormatTag::Xml,
            RequestFormat::JsonHal => FormatTag::JsonHal,
            RequestFormat::Text => FormatTag::Text,
            RequestFormat::Multipart => FormatTag::Multipart,
        }
    }
}

impl ResponseFormat {
    /// Registry key of this format.
    pub const fn tag(&self) -> FormatTag {
        match self {
            ResponseFormat::Json => FormatTag::Json,
            ResponseFormat::Xml => FormatTag::Xml,
            ResponseFormat::JsonHal => FormatTag::JsonHal,
            ResponseFormat::Text => FormatTag::Text,
            ResponseFormat::Byte => FormatTag::Byte,
            ResponseFormat::Image => FormatTag::Image,
        }
    }
}

impl fmt::Display for RequestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().name())
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().name())
    }
}

impl FromStr for RequestFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<FormatTag>()? {
            FormatTag::Json => Ok(RequestFormat::Json),
            FormatTag::Xml => Ok(RequestFormat::Xml),
            FormatTag::JsonHal => Ok(RequestFormat::JsonHal),
            FormatTag::Text => Ok(RequestFormat::Text),
            FormatTag::Multipart => Ok(RequestFormat::Multipart),
            FormatTag::Byte | FormatTag::Image => {
                Err(ConfigurationError::UnknownFormat(s.to_owned()))
            }
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<FormatTag>()? {
            FormatTag::Json => Ok(ResponseFormat::Json),
            FormatTag::Xml => Ok(ResponseFormat::Xml),
            FormatTag::JsonHal => Ok(ResponseFormat::JsonHal),
            FormatTag::Text => Ok(ResponseFormat::Text),
            FormatTag::Byte => Ok(ResponseFormat::Byte),
            FormatTag::Image => Ok(ResponseFormat::Image),
            FormatTag::Multipart => Err(ConfigurationError::UnknownFormat(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_response_keeps_the_name() {
        for format in [
            RequestFormat::Json,
            RequestFormat::Xml,
            RequestFormat::JsonHal,
            RequestFormat::Text,
        ] {
            assert_eq!(format.default_response().to_string(), format.to_string());
        }
    }

    #[test]
    fn test_multipart_falls_back_to_json() {
        assert_eq!(
            RequestFormat::Multipart.default_response(),
            ResponseFormat::Json
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("json_hal".parse::<FormatTag>().unwrap(), FormatTag::JsonHal);
        assert_eq!("BYTE".parse::<ResponseFormat>().unwrap(), ResponseFormat::Byte);
        assert!("BYTE".parse::<RequestFormat>().is_err());
        assert!(matches!(
            "YAML".parse::<FormatTag>(),
            Err(ConfigurationError::UnknownFormat(name)) if name == "YAML"
        ));
    }

    #[test]
    fn test_serde_names() {
        let format: RequestFormat = serde_json::from_str("\"JSON_HAL\"").unwrap();
        assert_eq!(format, RequestFormat::JsonHal);
        assert_eq!(
            serde_json::to_string(&ResponseFormat::Image).unwrap(),
            "\"IMAGE\""
        );
    }
}
