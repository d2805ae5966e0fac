use bytes::Bytes;
use courier_core::{Charset, FormatError, FormatTag, Headers, Payload};

use super::FormatHandler;

/// Encoded images (PNG, JPEG, GIF), decoded with the `image` crate.
///
/// Response-only: writing a request body fails with [`FormatError::ReadOnly`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFormat;

impl FormatHandler for ImageFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::Image
    }

    fn content_type(&self, _charset: Charset) -> String {
        "application/octet-stream".to_owned()
    }

    fn accept_value(&self) -> Option<&str> {
        Some("image/*")
    }

    fn serialize_body(
        &self,
        _body: &dyn erased_serde::Serialize,
        _charset: Charset,
    ) -> Result<Bytes, FormatError> {
        Err(FormatError::ReadOnly(FormatTag::Image))
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
        image::load_from_memory(raw)
            .map(Payload::Image)
            .map_err(FormatError::deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{DynamicImage, ImageFormat as Encoding, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_decodes_png() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 3, ::image::Rgb([10, 20, 30])));
        let mut png = Cursor::new(Vec::new());
        source.write_to(&mut png, Encoding::Png).unwrap();

        let payload = ImageFormat
            .deserialize(png.get_ref(), 200, &Headers::new())
            .unwrap();
        match payload {
            Payload::Image(image) => {
                assert_eq!((image.width(), image.height()), (2, 3));
                assert_eq!(image.to_rgb8().get_pixel(1, 2).0, [10, 20, 30]);
            }
            other => panic!("expected image payload, got {}", other.kind()),
        }
    }

    #[test]
    fn test_garbage_fails() {
        assert!(ImageFormat.deserialize(b"not an image", 200, &Headers::new()).is_err());
    }

    #[test]
    fn test_is_read_only() {
        let error = ImageFormat.serialize_body(&1u8, Charset::Utf8).unwrap_err();
        assert!(matches!(error, FormatError::ReadOnly(FormatTag::Image)));
    }
}
