//! Pixel-level image operations shared by the image source and preprocessing.

use fast_image_resize::{FilterType, ResizeAlg, ResizeOptions, Resizer};
use image::{imageops, DynamicImage, RgbImage};
use ndarray::{Array, IxDyn};
use crate::error::DetectError;

/// Resizes to exactly `width x height`, ignoring aspect ratio.
pub fn resize_exact(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

    let mut resized = DynamicImage::new(width, height, image.color());
    if let Err(err) = resizer.resize(image, &mut resized, &options) {
        log::warn!("Failed to use `fast_image_resize` ({err}). Falling back.");
        resized = imageops::resize(&image.to_rgb8(), width, height, imageops::FilterType::Triangle).into();
    }
    resized
}

/// HWC `u8` pixels to a CHW `f32` tensor scaled into `[0, 1]`.
pub fn chw_normalize(img: &RgbImage) -> Result<Array<f32, IxDyn>, DetectError> {
    let buf = img.as_raw();
    let w = img.width() as usize;
    let h = img.height() as usize;

    if buf.len() != w * h * 3 {
        return Err(DetectError::Format(format!(
            "Unexpected buffer size: got {}, expected {}",
            buf.len(),
            w * h * 3
        )));
    }

    let mut out = vec![0.0f32; buf.len()];
    let hw = w * h;

    for i in 0..hw {
        out[i] = buf[3 * i] as f32 / 255.0;
        out[i + hw] = buf[3 * i + 1] as f32 / 255.0;
        out[i + 2 * hw] = buf[3 * i + 2] as f32 / 255.0;
    }

    Array::from_shape_vec(IxDyn(&[3, h, w]), out)
        .map_err(|e| DetectError::Format(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_resize_exact_changes_dimensions_only() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([200, 10, 30])));
        let resized = resize_exact(&image, 300, 300);
        assert_eq!((resized.width(), resized.height()), (300, 300));
        assert_eq!(resized.color(), image.color());

        let px = resized.to_rgb8().get_pixel(150, 150).0;
        for (got, want) in px.iter().zip([200u8, 10, 30]) {
            assert!(got.abs_diff(want) <= 1, "{px:?}");
        }
    }

    #[test]
    fn test_chw_normalize_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 51]));
        img.put_pixel(1, 0, Rgb([0, 255, 102]));

        let t = chw_normalize(&img).unwrap();
        assert_eq!(t.shape(), &[3, 1, 2]);
        assert_eq!(t[[0, 0, 0]], 1.0);
        assert_eq!(t[[1, 0, 1]], 1.0);
        assert!((t[[2, 0, 0]] - 0.2).abs() < 1e-6);
        assert!((t[[2, 0, 1]] - 0.4).abs() < 1e-6);
    }
}
