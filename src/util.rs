use image::{imageops, GrayImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2};
use tracing::instrument;

/// Turns an RGB image into a `[1, 3, H, W]` tensor of
/// `(pixel / 255 - mean) * norm` per channel.
#[instrument(level = "trace", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &RgbImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array4<f32> {
    Array4::<f32>::from_shape_fn(
        (1, 3, image.height() as usize, image.width() as usize),
        |(_, ch, y, x)| {
            let value = image.get_pixel(x as u32, y as u32)[ch] as f32 / 255.0;
            (value - mean_vals[ch]) * norm_vals[ch]
        },
    )
}

pub fn to_luma_image(data: ArrayView2<f32>) -> GrayImage {
    let (height, width) = data.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([(data[[y as usize, x as usize]].clamp(0.0, 1.0) * 255.0) as u8])
    })
}

pub fn make_padding(image: &RgbImage, padding: u32) -> RgbImage {
    if padding == 0 {
        return image.clone();
    }
    let mut padded = RgbImage::from_pixel(
        image.width() + 2 * padding,
        image.height() + 2 * padding,
        Rgb([255, 255, 255]),
    );
    imageops::replace(&mut padded, image, padding as i64, padding as i64);
    padded
}

/// Detector input size for a source image. The ratios are `dst / src`, so
/// map coordinates divide by them to get back to source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    pub ratio_width: f32,
    pub ratio_height: f32,
}

impl Scale {
    /// Scales the long side to `target_size` and floors both sides to a
    /// multiple of 32, which the detector's down-sampling needs.
    pub fn new(src_width: u32, src_height: u32, target_size: u32) -> Self {
        let ratio = if src_width > src_height {
            target_size as f32 / src_width as f32
        } else {
            target_size as f32 / src_height as f32
        };

        let mut dst_width = (src_width as f32 * ratio) as u32;
        let mut dst_height = (src_height as f32 * ratio) as u32;
        if dst_width % 32 != 0 {
            let new_width = (dst_width / 32 * 32).max(32);
            log::debug!(
                "Target width of {dst_width} wasn't a multiple of 32, flooring to {new_width}."
            );
            dst_width = new_width;
        }
        if dst_height % 32 != 0 {
            let new_height = (dst_height / 32 * 32).max(32);
            log::debug!(
                "Target height of {dst_height} wasn't a multiple of 32, flooring to {new_height}."
            );
            dst_height = new_height;
        }

        let ratio_width = dst_width as f32 / src_width as f32;
        let ratio_height = dst_height as f32 / src_height as f32;
        log::debug!("Resize will change image dimensions from (w: {src_width}, h: {src_height}) to (w: {dst_width}, h: {dst_height}) with scaling factor ({ratio_width}, {ratio_height}).");
        Self {
            src_width,
            src_height,
            dst_width,
            dst_height,
            ratio_width,
            ratio_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn scale_floors_to_multiples_of_32() {
        let scale = Scale::new(1000, 500, 1000);
        assert_eq!((scale.dst_width, scale.dst_height), (992, 480));
        assert!((scale.ratio_width - 0.992).abs() < 1e-6);
        assert!((scale.ratio_height - 0.96).abs() < 1e-6);
    }

    #[test]
    fn scale_keeps_tiny_images_at_32() {
        let scale = Scale::new(20, 10, 20);
        assert_eq!((scale.dst_width, scale.dst_height), (32, 32));
    }

    #[test]
    fn scale_portrait_uses_height() {
        let scale = Scale::new(256, 512, 256);
        assert_eq!((scale.dst_width, scale.dst_height), (128, 256));
    }

    #[test]
    fn padding_is_white() {
        let image = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        let padded = make_padding(&image, 3);
        assert_eq!(padded.dimensions(), (10, 8));
        assert_eq!(padded.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(padded.get_pixel(3, 3), &Rgb([0, 0, 0]));
        assert_eq!(padded.get_pixel(6, 4), &Rgb([0, 0, 0]));
        assert_eq!(padded.get_pixel(7, 4), &Rgb([255, 255, 255]));
    }

    #[test]
    fn normalize_layout_is_nchw() {
        let mut image = RgbImage::from_pixel(3, 2, Rgb([255, 0, 255]));
        image.put_pixel(2, 1, Rgb([0, 255, 0]));
        let tensor = subtract_mean_normalize(&image, &[0.5; 3], &[2.0; 3]);
        assert_eq!(tensor.dim(), (1, 3, 2, 3));
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], -1.0);
        assert_eq!(tensor[[0, 0, 1, 2]], -1.0);
        assert_eq!(tensor[[0, 1, 1, 2]], 1.0);
    }

    #[test]
    fn luma_image_scales_probabilities() {
        let map = Array2::from_shape_vec((1, 3), vec![0.0, 0.5, 1.0]).unwrap();
        let luma = to_luma_image(map.view());
        assert_eq!(luma.as_raw(), &vec![0, 127, 255]);
    }
}
