// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::io::Cursor;
use std::path::Path;

use canonical_error::{CanonicalError, invalid_argument_error};
use image::{GrayImage, ImageFormat, Luma};
use rand::Rng;

/// Loads an image from disk and converts it to 8 bit grayscale.
pub fn load_gray_image(path: &Path) -> Result<GrayImage, CanonicalError> {
    let image = image::open(path).map_err(
        |e| invalid_argument_error(
            format!("Cannot read image {}: {}", path.display(), e).as_str()))?;
    Ok(image.into_luma8())
}

/// Encodes a grayscale image as PNG, for upload to the solver service.
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, CanonicalError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).map_err(
        |e| invalid_argument_error(format!("PNG encode: {}", e).as_str()))?;
    Ok(buffer.into_inner())
}

/// Renders a dark frame with `num_stars` single-pixel stars at random
/// positions. Positions may collide, in which case the detector sees the
/// collided stars as one.
pub fn synthesize_star_field(width: u32, height: u32, num_stars: usize,
                             rng: &mut impl Rng) -> GrayImage {
    let mut image = GrayImage::new(width, height);
    for _ in 0..num_stars {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);
        image.put_pixel(x, y, Luma([255u8]));
    }
    image
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use super::*;

    #[test]
    fn test_load_missing_image_fails() {
        assert!(load_gray_image(Path::new("/no/such/image.png")).is_err());
    }

    #[test]
    fn test_encode_png_magic() {
        let image = GrayImage::new(8, 8);
        let bytes = encode_png(&image).unwrap();
        assert_eq!(bytes[..4], *b"\x89PNG");
    }

    #[test]
    fn test_synthesize_star_field() {
        let mut rng = StdRng::seed_from_u64(1);
        let image = synthesize_star_field(100, 80, 20, &mut rng);
        assert_eq!(image.dimensions(), (100, 80));
        let bright = image.pixels().filter(|p| p.0[0] == 255).count();
        assert!(bright > 0 && bright <= 20);
    }
}
