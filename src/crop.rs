use geo::{coord, Coord};
use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into_with, Interpolation};
use tracing::instrument;

use crate::{
    geometry::{distance, project, solve_homography},
    OcrError, Result,
};

/// Crops at least this many times taller than wide are read as vertical text
/// and turned on their side.
pub const DEFAULT_VERTICAL_ASPECT_RATIO: f32 = 1.5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Samples the quadrilateral `points` (top-left, top-right, bottom-right,
/// bottom-left) out of `image` as an upright rectangle.
///
/// Axis-aligned boxes are cut out directly, anything else is dewarped through
/// a homography with a white fill outside the source. The result is rotated
/// 90 degrees clockwise when `height >= width * vertical_aspect_ratio`.
#[instrument(level = "trace", skip(image))]
pub fn rotate_crop(
    image: &RgbImage,
    points: &[Coord<f32>],
    vertical_aspect_ratio: f32,
) -> Result<RgbImage> {
    let quad: [Coord<f32>; 4] = points
        .try_into()
        .map_err(|_| OcrError::InvalidBox(points.len()))?;
    let [p0, p1, p2, p3] = quad;

    let width = distance(p0, p1).max(distance(p2, p3)) as u32;
    let height = distance(p0, p3).max(distance(p1, p2)) as u32;
    let (width, height) = (width.max(1), height.max(1));

    let crop = if p0.y == p1.y && p1.x == p2.x {
        let x = p0.x.max(0.0) as u32;
        let y = p0.y.max(0.0) as u32;
        imageops::crop_imm(image, x, y, width, height).to_image()
    } else {
        warp_region(image, &quad, width, height)
    };

    Ok(orient(crop, vertical_aspect_ratio))
}

fn warp_region(image: &RgbImage, quad: &[Coord<f32>; 4], width: u32, height: u32) -> RgbImage {
    let min_x = quad.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let max_x = quad.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = quad.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_y = quad.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let left = (min_x.floor() as i64).max(0);
    let top = (min_y.floor() as i64).max(0);
    let right = (max_x.ceil() as i64).min(image.width() as i64);
    let bottom = (max_y.ceil() as i64).min(image.height() as i64);
    if right <= left || bottom <= top {
        log::trace!("Box lies outside the image");
        return RgbImage::from_pixel(1, 1, BACKGROUND);
    }

    let bounds = imageops::crop_imm(
        image,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
    .to_image();

    let local = quad.map(|p| coord! { x: p.x - left as f32, y: p.y - top as f32 });
    let transform = solve_homography(&local, width as f32, height as f32);

    let mut out = RgbImage::new(width, height);
    warp_into_with(
        &bounds,
        |x, y| project(&transform, x, y),
        Interpolation::Bilinear,
        BACKGROUND,
        &mut out,
    );
    out
}

fn orient(crop: RgbImage, vertical_aspect_ratio: f32) -> RgbImage {
    if crop.height() as f32 >= crop.width() as f32 * vertical_aspect_ratio {
        log::trace!("Rotating vertical crop {}x{}", crop.width(), crop.height());
        imageops::rotate90(&crop)
    } else {
        crop
    }
}
