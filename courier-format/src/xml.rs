use bytes::Bytes;
use courier_core::{Charset, FormatError, FormatTag, Headers, Payload};
use quick_xml::Reader;
use quick_xml::events::Event;

use super::{FormatHandler, is_empty_body, response_charset};

/// XML format backed by quick-xml.
///
/// Bodies are written with an XML declaration naming the charset. Response
/// documents are checked for well-formedness and kept as text; the caller's
/// result type decides how they are materialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormat;

impl FormatHandler for XmlFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::Xml
    }

    fn content_type(&self, charset: Charset) -> String {
        format!("application/xml; charset={charset}")
    }

    fn accept_value(&self) -> Option<&str> {
        Some("application/xml")
    }

    fn serialize_body(
        &self,
        body: &dyn erased_serde::Serialize,
        charset: Charset,
    ) -> Result<Bytes, FormatError> {
        let document = quick_xml::se::to_string(body).map_err(FormatError::serialize)?;
        let text = format!("<?xml version=\"1.0\" encoding=\"{charset}\"?>{document}");
        charset.encode(&text).map(Bytes::from)
    }

    fn deserialize(
        &self,
        raw: &[u8],
        status: u16,
        headers: &Headers,
    ) -> Result<Payload, FormatError> {
        if is_empty_body(raw, status) {
            return Ok(Payload::Empty);
        }
        let text = response_charset(headers).decode(raw)?;
        check_well_formed(&text)?;
        Ok(Payload::Xml(text))
    }
}

fn check_well_formed(text: &str) -> Result<(), FormatError> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        match reader.read_event().map_err(FormatError::deserialize)? {
            Event::Start(_) => {
                depth += 1;
                seen_root = true;
            }
            Event::Empty(_) => seen_root = true,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    if depth != 0 || !seen_root {
        return Err(FormatError::deserialize(std::io::Error::other(
            "xml document is not closed or has no root element",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatHandlerExt;
    use courier_core::Typed;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn test_round_trip() {
        let item = Item {
            id: 9,
            name: "stub".into(),
        };
        let bytes = XmlFormat.serialize_value(&item, Charset::Utf8).unwrap();
        assert!(bytes.starts_with(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><Item>"));
        let decoded: Typed<Item> = XmlFormat
            .deserialize_into(&bytes, 200, &Headers::new())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.into_inner(), item);
    }

    #[test]
    fn test_rejects_mismatched_tags() {
        assert!(XmlFormat.deserialize(b"<a><b></a>", 200, &Headers::new()).is_err());
        assert!(XmlFormat.deserialize(b"<a>", 200, &Headers::new()).is_err());
        assert!(XmlFormat.deserialize(b"just text", 200, &Headers::new()).is_err());
    }

    #[test]
    fn test_empty_body_is_tolerated() {
        assert_eq!(
            XmlFormat.deserialize(b"  ", 200, &Headers::new()).unwrap(),
            Payload::Empty
        );
    }
}
