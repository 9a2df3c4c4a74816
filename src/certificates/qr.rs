use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use std::io::Cursor;

const MODULE_PX: u32 = 8;
const QUIET_ZONE: u32 = 4;
const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Encodes `text` as a black-on-white PNG with a quiet zone.
pub fn encode_png(text: &str) -> Result<Vec<u8>, QrError> {
    let qr = QrCode::new(text.as_bytes())?;
    let colors = qr.to_colors();
    let modules = qr.width() as u32;
    let side = (modules + 2 * QUIET_ZONE) * MODULE_PX;

    let mut img = GrayImage::from_pixel(side, side, Luma([255u8]));
    for (index, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let x = (index as u32 % modules + QUIET_ZONE) * MODULE_PX;
        let y = (index as u32 / modules + QUIET_ZONE) * MODULE_PX;
        for dy in 0..MODULE_PX {
            for dx in 0..MODULE_PX {
                img.put_pixel(x + dx, y + dy, Luma([0u8]));
            }
        }
    }

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Encodes `text` and wraps the PNG in a `data:` URL.
pub fn encode_data_url(text: &str) -> Result<String, QrError> {
    let png = encode_png(text)?;
    Ok(format!("{}{}", DATA_URL_PREFIX, BASE64.encode(png)))
}

/// Extracts the image bytes from a base64 `data:` URL (or bare base64).
pub fn decode_data_url(data_url: &str) -> Option<Vec<u8>> {
    let payload = match data_url.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => data_url,
    };
    BASE64.decode(payload.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_deterministic() {
        let url = "https://certs.example.org/verify/CERT-1-ABCDEF123";
        assert_eq!(encode_data_url(url).unwrap(), encode_data_url(url).unwrap());
    }

    #[test]
    fn data_url_carries_a_decodable_png() {
        let data_url = encode_data_url("https://certs.example.org/verify/X").unwrap();
        assert!(data_url.starts_with("data:image/png;base64,"));

        let bytes = decode_data_url(&data_url).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.width() % MODULE_PX, 0);
    }

    #[test]
    fn quiet_zone_is_white() {
        let png = encode_png("hello").unwrap();
        let img = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(img.get_pixel(0, 0), &Luma([255u8]));
        let edge = QUIET_ZONE * MODULE_PX;
        // Top-left finder pattern starts right after the quiet zone.
        assert_eq!(img.get_pixel(edge, edge), &Luma([0u8]));
    }

    #[test]
    fn garbage_payload_does_not_decode() {
        assert_eq!(decode_data_url("data:image/png;base64,@@@"), None);
    }
}
