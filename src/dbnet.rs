use float_ord::FloatOrd;
use geo::{coord, Coord};
use image::{imageops::FilterType, GrayImage, Luma, RgbImage};
use imageproc::{drawing::draw_polygon_mut, point::Point};
use ndarray::{s, Array2, ArrayView2};
use tracing::instrument;

use crate::{
    contours::{binarize, find_text_contours},
    geometry::{min_area_rect, min_side, offset, unclip_distance},
    session::Inference,
    util::{subtract_mean_normalize, Scale},
    DetectionOptions, OcrError, Result, TextBox,
};

const MEAN_VALUES: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_VALUES: [f32; 3] = [1.0 / 0.229, 1.0 / 0.224, 1.0 / 0.225];

/// Candidates whose fitted rectangle is thinner than this, in map pixels,
/// are too small to be a character.
pub const MIN_BOX_SIDE: f32 = 3.0;
/// Same limit after unclipping.
pub const MIN_UNCLIPPED_BOX_SIDE: f32 = MIN_BOX_SIDE + 2.0;

/// DB text detector: image in, per-pixel text probability out.
pub struct DbNet {
    model: Box<dyn Inference>,
}

impl DbNet {
    pub fn new(model: impl Inference + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    /// Runs the detector on `image` resized to `scale`'s destination size.
    /// The map has the destination size too.
    #[instrument(skip(self, image), level = "debug")]
    pub fn probability_map(&self, image: &RgbImage, scale: &Scale) -> Result<Array2<f32>> {
        let resized = image::imageops::resize(
            image,
            scale.dst_width,
            scale.dst_height,
            FilterType::CatmullRom,
        );
        let input = subtract_mean_normalize(&resized, &MEAN_VALUES, &NORM_VALUES);
        let output = self.model.run(input)?;

        let shape = output.shape().to_vec();
        let (height, width) = match shape.as_slice() {
            [.., height, width] => (*height, *width),
            _ => return Err(OcrError::UnexpectedShape(shape)),
        };
        if height * width != output.len() {
            return Err(OcrError::UnexpectedShape(shape));
        }
        log::trace!("Probability map size: {height}x{width}");

        Ok(output.into_shape((height, width))?)
    }
}

/// Box Scorer & Filter: every outer contour of the binarized map becomes at
/// most one text box in source image coordinates, in contour order.
#[instrument(skip(pred), level = "debug")]
pub fn find_text_boxes(
    pred: ArrayView2<f32>,
    scale: &Scale,
    options: &DetectionOptions,
) -> Vec<TextBox> {
    let mask = binarize(pred, options.box_thresh);
    let contours = find_text_contours(&mask);
    log::debug!("Found {} contours", contours.len());

    contours
        .iter()
        .filter_map(|contour| unclipped_box(contour, pred, options))
        .map(|(rect, score)| TextBox {
            points: order_corners(rect).map(|p| {
                coord! {
                    x: (p.x / scale.ratio_width).trunc().clamp(0.0, scale.src_width as f32),
                    y: (p.y / scale.ratio_height).trunc().clamp(0.0, scale.src_height as f32),
                }
            }),
            score,
        })
        .collect()
}

/// Fits, scores and expands one contour. The rectangle is still in map
/// coordinates.
fn unclipped_box(
    contour: &[Coord<f32>],
    pred: ArrayView2<f32>,
    options: &DetectionOptions,
) -> Option<([Coord<f32>; 4], f32)> {
    if contour.len() < 4 {
        return None;
    }

    let rect = min_area_rect(contour)?;
    if min_side(&rect) < MIN_BOX_SIDE {
        log::trace!("Skipping contour, fitted rectangle too thin");
        return None;
    }

    let score = box_score(&rect, pred);
    if score < options.box_score_thresh {
        log::trace!("Skipping contour, score {score} below threshold");
        return None;
    }

    let distance = unclip_distance(&rect, options.unclip_ratio);
    let expanded = offset(&rect, distance)?;
    let expanded_rect = min_area_rect(&expanded)?;
    if min_side(&expanded_rect) < MIN_UNCLIPPED_BOX_SIDE {
        log::trace!("Skipping contour, unclipped rectangle too thin");
        return None;
    }

    Some((expanded_rect, score))
}

/// Mean probability inside `rect`, rasterized over its bounding box.
pub fn box_score(rect: &[Coord<f32>; 4], pred: ArrayView2<f32>) -> f32 {
    let (height, width) = pred.dim();
    if height == 0 || width == 0 {
        return 0.0;
    }

    let min_x = rect.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let max_x = rect.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = rect.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_y = rect.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let x0 = (min_x.floor().max(0.0) as usize).min(width - 1);
    let x1 = (max_x.ceil().max(0.0) as usize).min(width - 1);
    let y0 = (min_y.floor().max(0.0) as usize).min(height - 1);
    let y1 = (max_y.ceil().max(0.0) as usize).min(height - 1);

    let mut local = rect
        .iter()
        .map(|p| Point::new((p.x - x0 as f32).round() as i32, (p.y - y0 as f32).round() as i32))
        .collect::<Vec<_>>();
    local.dedup();
    if local.len() > 1 && local.first() == local.last() {
        local.pop();
    }
    if local.len() < 3 {
        return 0.0;
    }

    let mut mask = GrayImage::new((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_polygon_mut(&mut mask, &local, Luma([255]));

    let (sum, count) = pred
        .slice(s![y0..=y1, x0..=x1])
        .indexed_iter()
        .filter(|((y, x), _)| mask.get_pixel(*x as u32, *y as u32)[0] > 0)
        .fold((0.0f32, 0usize), |(sum, count), (_, value)| {
            (sum + value, count + 1)
        });

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Orders a rectangle as top-left, top-right, bottom-right, bottom-left.
/// The two leftmost corners form the left edge; within an edge the smaller y
/// is the top.
pub fn order_corners(mut points: [Coord<f32>; 4]) -> [Coord<f32>; 4] {
    points.sort_by_key(|p| FloatOrd(p.x));

    let (top_left, bottom_left) = if points[1].y > points[0].y {
        (points[0], points[1])
    } else {
        (points[1], points[0])
    };
    let (top_right, bottom_right) = if points[3].y > points[2].y {
        (points[2], points[3])
    } else {
        (points[3], points[2])
    };

    [top_left, top_right, bottom_right, bottom_left]
}
