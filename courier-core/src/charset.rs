//! Character sets for text bodies.

use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

/// Supported text encodings.
///
/// Names parse case-insensitively. The envelope keeps the charset as the
/// caller's string and resolves it only when a body is written, so an
/// unknown name surfaces as an encoding error at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    /// UTF-8
    #[default]
    Utf8,
    /// US-ASCII, seven bit.
    UsAscii,
    /// ISO-8859-1 (Latin-1).
    Iso8859_1,
    /// UTF-16, big endian, no byte order mark.
    Utf16Be,
    /// UTF-16, little endian, no byte order mark.
    Utf16Le,
}

impl Charset {
    /// Canonical name, as written into `Content-Type`.
    pub const fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Resolves an optional charset name, defaulting to UTF-8.
    pub fn resolve(name: Option<&str>) -> Result<Self, FormatError> {
        name.map_or(Ok(Charset::Utf8), str::parse)
    }

    /// Extracts the `charset` parameter from a `Content-Type` value.
    ///
    /// Returns `None` when the parameter is absent or names an unsupported
    /// charset.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, value)| value.trim().trim_matches('"').parse().ok())
    }

    /// Encodes text into bytes.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, FormatError> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::UsAscii => self.encode_narrow(text, 0x7f),
            Charset::Iso8859_1 => self.encode_narrow(text, 0xff),
            Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        }
    }

    /// Decodes bytes into text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, FormatError> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()).map_err(FormatError::deserialize),
            Charset::UsAscii => {
                if let Some(byte) = bytes.iter().find(|byte| !byte.is_ascii()) {
                    return Err(FormatError::deserialize(std::io::Error::other(format!(
                        "byte {byte:#04x} is not US-ASCII"
                    ))));
                }
                Ok(bytes.iter().map(|&byte| char::from(byte)).collect())
            }
            Charset::Iso8859_1 => Ok(bytes.iter().map(|&byte| char::from(byte)).collect()),
            Charset::Utf16Be | Charset::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(FormatError::deserialize(std::io::Error::other(
                        "odd number of bytes in UTF-16 text",
                    )));
                }
                let units = bytes.chunks_exact(2).map(|pair| {
                    let pair = [pair[0], pair[1]];
                    if *self == Charset::Utf16Be {
                        u16::from_be_bytes(pair)
                    } else {
                        u16::from_le_bytes(pair)
                    }
                });
                char::decode_utf16(units)
                    .collect::<Result<String, _>>()
                    .map_err(FormatError::deserialize)
            }
        }
    }

    fn encode_narrow(&self, text: &str, max: u32) -> Result<Vec<u8>, FormatError> {
        text.chars()
            .map(|character| {
                u8::try_from(u32::from(character))
                    .ok()
                    .filter(|&byte| u32::from(byte) <= max)
                    .ok_or(FormatError::Unmappable {
                        charset: *self,
                        character,
                    })
            })
            .collect()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(Charset::Utf8),
            "US-ASCII" | "ASCII" => Ok(Charset::UsAscii),
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" => Ok(Charset::Iso8859_1),
            "UTF-16BE" => Ok(Charset::Utf16Be),
            "UTF-16LE" => Ok(Charset::Utf16Le),
            _ => Err(FormatError::UnsupportedCharset(s.to_owned())),
        }
    }
}
