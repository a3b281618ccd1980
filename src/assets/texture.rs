use std::path::Path;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

/// Tightly packed RGBA8 texels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn from_dynamic(image: image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        }
    }
}

pub fn decode_file(path: &Path) -> Result<DecodedImage> {
    let image = image::open(path)
        .wrap_err_with(|| format!("Failed to decode image {}", path.display()))?;
    Ok(DecodedImage::from_dynamic(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_images_gain_an_alpha_channel() {
        let rgb = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let decoded = DecodedImage::from_dynamic(image::DynamicImage::ImageRgb8(rgb));

        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(decode_file(Path::new("does/not/exist.png")).is_err());
    }
}
