//! Upload decoding and response encoding for still images.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage, codecs::jpeg::JpegEncoder};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Image data is empty")]
    EmptyData,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    EncodeFailed(#[source] image::ImageError),
}

/// Decode an uploaded image (any format the `image` features enable) to RGB8,
/// upright according to its EXIF orientation.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::EmptyData);
    }

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MediaError::DecodeFailed(e.into()))?
        .into_decoder()
        .map_err(MediaError::DecodeFailed)?;
    let orientation = decoder.orientation().map_err(MediaError::DecodeFailed)?;

    let mut image = DynamicImage::from_decoder(decoder).map_err(MediaError::DecodeFailed)?;
    image.apply_orientation(orientation);
    Ok(image.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(MediaError::EncodeFailed)?;
    Ok(buf)
}

/// `data:<mime>;base64,<payload>`
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn jpeg_data_url(image: &RgbImage, quality: u8) -> Result<String, MediaError> {
    Ok(data_url("image/jpeg", &encode_jpeg(image, quality)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let source = RgbImage::from_pixel(5, 3, image::Rgb([1, 2, 3]));
        let decoded = decode_image(&png_bytes(&source)).unwrap();

        assert_eq!(decoded.dimensions(), (5, 3));
        assert_eq!(decoded.get_pixel(4, 2).0, [1, 2, 3]);
    }

    /// Splice an APP1 segment carrying only an EXIF Orientation tag after SOI.
    fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\x00\x2A");
        tiff.extend_from_slice(&8u32.to_be_bytes());
        tiff.extend_from_slice(&1u16.to_be_bytes());
        // tag 0x0112, SHORT, count 1, value left-aligned in the 4-byte field
        tiff.extend_from_slice(&0x0112u16.to_be_bytes());
        tiff.extend_from_slice(&3u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());

        let mut payload = b"Exif\x00\x00".to_vec();
        payload.extend_from_slice(&tiff);

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_decode_applies_exif_rotation() {
        let landscape = RgbImage::from_pixel(4, 2, image::Rgb([120, 60, 30]));
        let jpeg = encode_jpeg(&landscape, 95).unwrap();

        assert_eq!(decode_image(&jpeg).unwrap().dimensions(), (4, 2));

        // Orientation 6: stored sideways, displayed rotated 90 degrees clockwise
        let rotated = decode_image(&with_exif_orientation(&jpeg, 6)).unwrap();
        assert_eq!(rotated.dimensions(), (2, 4));
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        assert!(matches!(decode_image(&[]), Err(MediaError::EmptyData)));
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(MediaError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_jpeg_encoding_starts_with_soi_marker() {
        let image = RgbImage::from_pixel(16, 16, image::Rgb([200, 100, 50]));
        let jpeg = encode_jpeg(&image, 95).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_data_url_format() {
        assert_eq!(data_url("video/mp4", b"abc"), "data:video/mp4;base64,YWJj");

        let image = RgbImage::new(2, 2);
        let url = jpeg_data_url(&image, 90).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,/9j/"));
    }
}
