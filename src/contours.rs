//! Binarizes the probability map and traces the outer boundary of every
//! connected text region.

use geo::{coord, Coord, LineString, Simplify};
use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use ndarray::ArrayView2;
use tracing::instrument;

/// Douglas-Peucker tolerance, in mask pixels.
pub const CONTOUR_EPSILON: f32 = 1.0;

/// `value > threshold` becomes foreground (255).
pub fn binarize(pred: ArrayView2<f32>, threshold: f32) -> GrayImage {
    let (height, width) = pred.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if pred[[y as usize, x as usize]] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Outer boundaries of the 8-connected foreground components, in discovery
/// order, each simplified to a closed polygon without a repeated end point.
///
/// Holes are dropped. A contour may come back with fewer than 4 points.
#[instrument(level = "trace", skip(mask))]
pub fn find_text_contours(mask: &GrayImage) -> Vec<Vec<Coord<f32>>> {
    // The tracer only opens an outer border right of a background pixel, so
    // components touching column 0 would come back as holes.
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut framed, mask, 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer))
        .map(|contour| {
            let points = contour
                .points
                .iter()
                .map(|p| coord! { x: (p.x - 1) as f32, y: (p.y - 1) as f32 })
                .collect::<Vec<_>>();
            approximate_polygon(&points, CONTOUR_EPSILON)
        })
        .collect()
}

/// Douglas-Peucker on a closed ring.
pub fn approximate_polygon(points: &[Coord<f32>], epsilon: f32) -> Vec<Coord<f32>> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut ring = points.to_vec();
    ring.push(points[0]);
    let mut simplified = LineString::from(ring).simplify(&epsilon).0;
    if simplified.len() > 1 && simplified.first() == simplified.last() {
        simplified.pop();
    }
    simplified
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn block_map(
        height: usize,
        width: usize,
        rows: (usize, usize),
        cols: (usize, usize),
    ) -> Array2<f32> {
        Array2::from_shape_fn((height, width), |(y, x)| {
            if (rows.0..rows.1).contains(&y) && (cols.0..cols.1).contains(&x) {
                0.9
            } else {
                0.1
            }
        })
    }

    #[test]
    fn binarize_is_strictly_greater() {
        let map = Array2::from_shape_vec((1, 3), vec![0.2, 0.3, 0.31]).unwrap();
        let mask = binarize(map.view(), 0.3);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
        assert_eq!(mask.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn rectangle_simplifies_to_four_corners() {
        let map = block_map(64, 128, (20, 40), (20, 100));
        let contours = find_text_contours(&binarize(map.view(), 0.3));
        assert_eq!(contours.len(), 1);

        let contour = &contours[0];
        assert_eq!(contour.len(), 4);
        for corner in [(20.0, 20.0), (99.0, 20.0), (99.0, 39.0), (20.0, 39.0)] {
            assert!(contour.contains(&coord! { x: corner.0, y: corner.1 }));
        }
    }

    #[test]
    fn holes_are_discarded() {
        let mut map = block_map(64, 64, (10, 50), (10, 50));
        for y in 20..40 {
            for x in 20..40 {
                map[[y, x]] = 0.0;
            }
        }
        let contours = find_text_contours(&binarize(map.view(), 0.3));
        assert_eq!(contours.len(), 1);
    }

    #[test]
    fn separate_components_yield_separate_contours() {
        let mut map = block_map(64, 128, (5, 20), (5, 60));
        for y in 35..55 {
            for x in 70..120 {
                map[[y, x]] = 0.9;
            }
        }
        let contours = find_text_contours(&binarize(map.view(), 0.3));
        assert_eq!(contours.len(), 2);
    }

    #[test]
    fn block_on_left_edge_keeps_its_outer_boundary() {
        let map = block_map(64, 128, (10, 50), (0, 40));
        let contours = find_text_contours(&binarize(map.view(), 0.3));
        assert_eq!(contours.len(), 1);

        let contour = &contours[0];
        assert_eq!(contour.len(), 4);
        for corner in [(0.0, 10.0), (39.0, 10.0), (39.0, 49.0), (0.0, 49.0)] {
            assert!(contour.contains(&coord! { x: corner.0, y: corner.1 }));
        }
    }

    #[test]
    fn full_foreground_map_is_one_region() {
        let map = Array2::from_elem((64, 128), 1.0);
        let contours = find_text_contours(&binarize(map.view(), 0.3));
        assert_eq!(contours.len(), 1);

        let contour = &contours[0];
        assert_eq!(contour.len(), 4);
        for corner in [(0.0, 0.0), (127.0, 0.0), (127.0, 63.0), (0.0, 63.0)] {
            assert!(contour.contains(&coord! { x: corner.0, y: corner.1 }));
        }
    }

    #[test]
    fn single_pixel_gives_short_contour() {
        let map = block_map(8, 8, (3, 4), (3, 4));
        let contours = find_text_contours(&binarize(map.view(), 0.3));
        assert_eq!(contours.len(), 1);
        assert!(contours[0].len() < 4);
    }
}
