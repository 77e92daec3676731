use std::fs;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgb, RgbImage};
use tracing::{debug, info};

use crate::error::Result;

/// Post-download image normalization for the document converter.
///
/// Oversized images are scaled down, transparency is flattened, and files
/// that stay too large after re-encoding are deleted outright.
#[derive(Debug, Clone)]
pub struct ImageCleaner {
    /// Maximum width in pixels; wider images are scaled down.
    pub max_width: u32,
    /// Maximum height in pixels; taller images are scaled down.
    pub max_height: u32,
    /// Files larger than this after cleaning are deleted.
    pub max_bytes: u64,
    /// Quality used when re-encoding JPEG images.
    pub jpeg_quality: u8,
}

impl Default for ImageCleaner {
    fn default() -> Self {
        Self { max_width: 1024, max_height: 768, max_bytes: 1024 * 1024, jpeg_quality: 85 }
    }
}

impl ImageCleaner {
    /// Normalize the image file at `path` in place.
    ///
    /// Files that cannot be decoded are left untouched; the converter may
    /// still manage them, and deleting here would break the page's
    /// references for nothing.
    pub fn clean(&self, path: &Path) -> Result<()> {
        let orig_bytes = fs::metadata(path)?.len();

        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format();
        match reader.decode() {
            Ok(img) => self.update(img, format, path)?,
            Err(e) => debug!(path = %path.display(), error = %e, "unable to decode image"),
        }

        let new_bytes = fs::metadata(path)?.len();
        if new_bytes != orig_bytes {
            info!(path = %path.display(), orig_bytes, new_bytes, "rewrote image");
        }
        if new_bytes > self.max_bytes {
            info!(path = %path.display(), bytes = new_bytes, "deleting oversized image");
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn update(&self, img: DynamicImage, format: Option<ImageFormat>, path: &Path) -> Result<()> {
        let (width, height) = img.dimensions();
        let needs_scale = width > self.max_width || height > self.max_height;
        let needs_opaque = img.color().has_alpha() && has_transparency(&img);
        if !needs_scale && !needs_opaque {
            return Ok(());
        }

        let mut img = img;
        if needs_scale {
            debug!(path = %path.display(), width, height, "scaling image");
            img = img.resize(self.max_width, self.max_height, FilterType::Lanczos3);
        }
        // Older e-ink renderers cannot cope with partial transparency.
        if needs_opaque {
            img = DynamicImage::ImageRgb8(flatten_onto_white(&img));
        }

        match format {
            Some(ImageFormat::Jpeg) => {
                let file = BufWriter::new(fs::File::create(path)?);
                let encoder = JpegEncoder::new_with_quality(file, self.jpeg_quality);
                img.write_with_encoder(encoder)?;
            }
            Some(format) => img.save_with_format(path, format)?,
            None => img.save_with_format(path, ImageFormat::Png)?,
        }
        Ok(())
    }
}

fn has_transparency(img: &DynamicImage) -> bool {
    img.to_rgba8().pixels().any(|p| p.0[3] < 255)
}

/// Alpha-blend every pixel onto a white background.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let blend = |c: u8| ((u32::from(c) * u32::from(a) + 255 * (255 - u32::from(a))) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}
