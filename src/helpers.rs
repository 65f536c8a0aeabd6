use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::Result;

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.clone()).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// `data:` URI for embedding an image straight into a page or JSON body.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn png_data_uri(img: &RgbImage) -> Result<String> {
    Ok(data_uri("image/png", &encode_png(img)?))
}

/// Mime type of an uploaded JPEG/PNG, falling back to a generic one.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Png) => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn png_round_trips_through_data_uri() {
        let img = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));
        let uri = png_data_uri(&img).unwrap();
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(payload).unwrap();

        assert_eq!(sniff_mime(&bytes), "image/png");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn unknown_bytes_are_octet_stream() {
        assert_eq!(sniff_mime(b"hello"), "application/octet-stream");
    }
}
