use std::collections::VecDeque;

use image::GrayImage;
use log::debug;

/// Position of a detected star in image pixel coordinates. Origin is the
/// upper left corner; x increases rightward, y increases downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCoord {
    pub x: f64,
    pub y: f64,
}

/// Default binarization threshold for star detection.
pub const DETECT_THRESHOLD: u8 = 200;

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];

/// Finds bright connected regions in `image` and returns one centroid per
/// region, in scan order (top to bottom, left to right by first pixel). A
/// pixel belongs to a region when its value exceeds `threshold`; regions are
/// grown with 8-connectivity. The returned list never contains two identical
/// coordinates.
pub fn detect_stars(image: &GrayImage, threshold: u8) -> Vec<ImageCoord> {
    let (width, height) = image.dimensions();
    let mut visited = vec![false; (width * height) as usize];
    let mut stars = Vec::<ImageCoord>::new();

    for y in 0..height {
        for x in 0..width {
            let index = (y * width + x) as usize;
            if visited[index] || image.get_pixel(x, y).0[0] <= threshold {
                continue;
            }
            // Grow the connected region starting at this pixel.
            let mut queue = VecDeque::new();
            queue.push_back((x, y));
            visited[index] = true;
            let mut sum_x = 0.0_f64;
            let mut sum_y = 0.0_f64;
            let mut count = 0_u32;
            while let Some((cx, cy)) = queue.pop_front() {
                sum_x += cx as f64;
                sum_y += cy as f64;
                count += 1;
                for (dx, dy) in NEIGHBORS {
                    let nx = cx as i64 + dx;
                    let ny = cy as i64 + dy;
                    if nx < 0 || ny < 0 ||
                        nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let nindex = (ny * width + nx) as usize;
                    if !visited[nindex] && image.get_pixel(nx, ny).0[0] > threshold {
                        visited[nindex] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
            let centroid = ImageCoord{x: sum_x / count as f64,
                                      y: sum_y / count as f64};
            // Suppress exact duplicates from degenerate symmetric regions.
            if !stars.iter().any(|s| s.x == centroid.x && s.y == centroid.y) {
                stars.push(centroid);
            }
        }
    }
    debug!("Detected {} stars above threshold {}", stars.len(), threshold);
    stars
}

#[cfg(test)]
mod tests {
    use image::Luma;
    use super::*;

    fn dark_image(width: u32, height: u32) -> GrayImage {
        GrayImage::new(width, height)
    }

    #[test]
    fn test_flat_image_has_no_stars() {
        let image = dark_image(64, 64);
        assert!(detect_stars(&image, DETECT_THRESHOLD).is_empty());
    }

    #[test]
    fn test_blob_centroid() {
        let mut image = dark_image(64, 64);
        // A 2x2 block whose centroid falls between pixels.
        for (x, y) in [(10, 10), (11, 10), (10, 11), (11, 11)] {
            image.put_pixel(x, y, Luma([255u8]));
        }
        let stars = detect_stars(&image, DETECT_THRESHOLD);
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0], ImageCoord{x: 10.5, y: 10.5});
    }

    #[test]
    fn test_scan_order_and_separation() {
        let mut image = dark_image(64, 64);
        image.put_pixel(40, 20, Luma([255u8]));
        image.put_pixel(5, 50, Luma([255u8]));
        image.put_pixel(6, 50, Luma([255u8]));  // Joins the (5, 50) region.
        let stars = detect_stars(&image, DETECT_THRESHOLD);
        assert_eq!(stars.len(), 2);
        assert_eq!(stars[0], ImageCoord{x: 40.0, y: 20.0});
        assert_eq!(stars[1], ImageCoord{x: 5.5, y: 50.0});
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut image = dark_image(16, 16);
        image.put_pixel(3, 3, Luma([200u8]));
        assert!(detect_stars(&image, 200).is_empty());
        image.put_pixel(3, 3, Luma([201u8]));
        assert_eq!(detect_stars(&image, 200).len(), 1);
    }
}
