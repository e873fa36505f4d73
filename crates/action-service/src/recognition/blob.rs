/// Frame normalization and temporal blob construction for the Kinetics 3D-CNN
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array5;

/// Width every frame is resized to before it is buffered
pub const NORMALIZED_WIDTH: u32 = 400;

/// Spatial input size of the network
pub const SAMPLE_SIZE: u32 = 112;

/// Per-channel means of the Kinetics training set
pub const KINETICS_MEAN: [f32; 3] = [114.7748, 107.7354, 99.4750];

/// Spatial size and mean used when packing a window into a blob
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobSpec {
    pub size: u32,
    pub mean: [f32; 3],
}

impl Default for BlobSpec {
    fn default() -> Self {
        Self {
            size: SAMPLE_SIZE,
            mean: KINETICS_MEAN,
        }
    }
}

/// Resize a frame to [`NORMALIZED_WIDTH`], keeping its aspect ratio.
///
/// The caller guarantees a non-empty frame.
pub fn normalize_frame(frame: &DynamicImage) -> DynamicImage {
    let (width, height) = frame.dimensions();
    if width == NORMALIZED_WIDTH {
        return frame.clone();
    }
    let scaled_height = (u64::from(height) * u64::from(NORMALIZED_WIDTH) / u64::from(width)).max(1);
    frame.resize_exact(NORMALIZED_WIDTH, scaled_height as u32, FilterType::Triangle)
}

/// Scale so the shorter side covers `size`, then take the centered `size`×`size` crop
fn center_crop(frame: &DynamicImage, size: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    let factor = f64::max(
        f64::from(size) / f64::from(width),
        f64::from(size) / f64::from(height),
    );
    let scaled_width = ((f64::from(width) * factor).round() as u32).max(size);
    let scaled_height = ((f64::from(height) * factor).round() as u32).max(size);

    let resized = frame.resize_exact(scaled_width, scaled_height, FilterType::Triangle);
    let x = (scaled_width - size) / 2;
    let y = (scaled_height - size) / 2;
    resized.crop_imm(x, y, size, size).to_rgb8()
}

/// Pack a window of frames into a `[1, 3, T, size, size]` blob.
///
/// The channel axis precedes the time axis; the network silently produces
/// garbage for the time-major layout.
pub fn build_blob<'a>(
    frames: impl ExactSizeIterator<Item = &'a DynamicImage>,
    spec: &BlobSpec,
) -> Array5<f32> {
    let size = spec.size as usize;
    let mut blob = Array5::<f32>::zeros((1, 3, frames.len(), size, size));

    for (t, frame) in frames.enumerate() {
        let rgb = center_crop(frame, spec.size);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for (c, mean) in spec.mean.iter().enumerate() {
                blob[[0, c, t, y as usize, x as usize]] = f32::from(pixel[c]) - mean;
            }
        }
    }

    blob
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn test_normalize_keeps_aspect_ratio() {
        let frame = solid(640, 480, [0, 0, 0]);
        let normalized = normalize_frame(&frame);
        assert_eq!(normalized.dimensions(), (400, 300));

        let portrait = solid(90, 160, [0, 0, 0]);
        // 160 * 400 / 90 = 711.1, truncated
        assert_eq!(normalize_frame(&portrait).dimensions(), (400, 711));
    }

    #[test]
    fn test_normalize_never_collapses_height() {
        let strip = solid(2000, 1, [0, 0, 0]);
        assert_eq!(normalize_frame(&strip).dimensions(), (400, 1));
    }

    #[test]
    fn test_blob_shape_is_channel_then_time() {
        let frames = vec![solid(400, 300, [10, 20, 30]); 4];
        let blob = build_blob(frames.iter(), &BlobSpec::default());
        assert_eq!(blob.shape(), &[1, 3, 4, 112, 112]);
    }

    #[test]
    fn test_blob_subtracts_channel_means() {
        let frames = vec![solid(400, 300, [200, 150, 100])];
        let blob = build_blob(frames.iter(), &BlobSpec::default());

        let r = blob[[0, 0, 0, 50, 50]];
        let g = blob[[0, 1, 0, 50, 50]];
        let b = blob[[0, 2, 0, 50, 50]];
        assert!((r - (200.0 - 114.7748)).abs() < 1e-3);
        assert!((g - (150.0 - 107.7354)).abs() < 1e-3);
        assert!((b - (100.0 - 99.4750)).abs() < 1e-3);
    }

    #[test]
    fn test_blob_preserves_frame_order_along_time() {
        let frames: Vec<DynamicImage> = (1..=3u8).map(|v| solid(8, 6, [v * 50, 0, 0])).collect();
        let blob = build_blob(frames.iter(), &BlobSpec::default());

        for t in 0..3 {
            let value = blob[[0, 0, t, 0, 0]] + KINETICS_MEAN[0];
            assert_eq!(value.round() as u32, (t as u32 + 1) * 50);
        }
    }

    #[test]
    fn test_center_crop_keeps_middle_of_wide_frame() {
        // Dark borders, bright middle third: the crop must land on the middle
        let mut wide = RgbImage::from_pixel(300, 100, Rgb([0, 0, 0]));
        for x in 100..200 {
            for y in 0..100 {
                wide.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let crop = center_crop(&DynamicImage::ImageRgb8(wide), SAMPLE_SIZE);
        assert_eq!(crop.dimensions(), (112, 112));
        assert_eq!(crop.get_pixel(56, 56)[0], 255);
        assert_eq!(crop.get_pixel(56, 0)[0], 255);
    }
}
