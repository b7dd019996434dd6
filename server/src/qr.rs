//! QR rendering for ticket tokens.
//!
//! Creation-path only: validation never touches QR images. The token string
//! is encoded as a PNG and returned as a base64 data URL, ready to embed in
//! an `<img>` tag or a confirmation email.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Luma};
use qrcode::QrCode;

/// Minimum rendered edge length in pixels.
const MIN_DIMENSIONS: u32 = 256;

/// Encode `content` as a QR PNG data URL (`data:image/png;base64,…`).
///
/// # Errors
///
/// Returns a message if QR encoding or PNG serialization fails (content too
/// long for a QR symbol, encoder failure).
pub fn data_url(content: &str) -> Result<String, String> {
    let code = QrCode::new(content.as_bytes())
        .map_err(|e| format!("qr encoding failed: {e}"))?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_DIMENSIONS, MIN_DIMENSIONS)
        .build();

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::L8,
        )
        .map_err(|e| format!("png serialization failed: {e}"))?;

    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}
