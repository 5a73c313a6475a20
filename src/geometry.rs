//! Planar geometry used to turn detector contours into oriented text boxes
//! and to dewarp those boxes back into upright crops.
//!
//! All functions work on `geo::Coord<f32>` in image space (x to the right,
//! y downwards). "Counter-clockwise" and the sign of [`polygon_area`] follow
//! the usual mathematical convention, so a hull that is counter-clockwise
//! here looks clockwise when drawn on screen.

use float_ord::FloatOrd;
use geo::{coord, Area, Coord, EuclideanLength, LineString, Polygon};
use geo_clipper::{Clipper, EndType, JoinType};
use nalgebra::{Matrix3, Point2};

/// Clipper works on integer coordinates, this is the multiplier applied before
/// rounding. Keeps offsets accurate to a hundredth of a pixel.
const CLIPPER_SCALE: f32 = 100.0;

fn cross(o: Coord<f32>, a: Coord<f32>, b: Coord<f32>) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn dot(a: Coord<f32>, b: Coord<f32>) -> f32 {
    a.x * b.x + a.y * b.y
}

pub fn distance(a: Coord<f32>, b: Coord<f32>) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Convex hull by monotone chain, counter-clockwise, without a repeated
/// closing point. Collinear points on the hull boundary are dropped.
///
/// Inputs with two points or fewer are returned as given.
pub fn convex_hull(points: &[Coord<f32>]) -> Vec<Coord<f32>> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| (FloatOrd(p.x), FloatOrd(p.y)));
    sorted.dedup();
    if sorted.len() <= 2 {
        return sorted;
    }

    let mut hull: Vec<Coord<f32>> = Vec::with_capacity(sorted.len() * 2);
    for &p in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }

    let lower_len = hull.len() + 1;
    for &p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }

    // The upper chain ends on the first point again.
    hull.pop();
    hull
}

/// Smallest-area rectangle of any orientation enclosing `points`.
///
/// The corners come back in cyclic order. One or two distinct points give a
/// zero-area rectangle instead of failing; `None` only for an empty input.
pub fn min_area_rect(points: &[Coord<f32>]) -> Option<[Coord<f32>; 4]> {
    let mut unique = points.to_vec();
    unique.sort_by_key(|p| (FloatOrd(p.x), FloatOrd(p.y)));
    unique.dedup();

    let hull = convex_hull(&unique);
    match hull.as_slice() {
        [] => None,
        [p] => Some([*p; 4]),
        [a, b] => Some([*a, *b, *b, *a]),
        _ => rotating_edges(&hull),
    }
}

/// For every hull edge, project the hull onto the edge direction and its
/// normal. The edge whose spans give the smallest product wins.
fn rotating_edges(hull: &[Coord<f32>]) -> Option<[Coord<f32>; 4]> {
    let mut best: Option<(f32, [Coord<f32>; 4])> = None;

    for (i, &origin) in hull.iter().enumerate() {
        let next = hull[(i + 1) % hull.len()];
        let edge = next - origin;
        let length = edge.x.hypot(edge.y);
        if length == 0.0 {
            continue;
        }
        let u = edge / length;
        let v = coord! { x: -u.y, y: u.x };

        let (mut min_u, mut max_u) = (f32::INFINITY, f32::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f32::INFINITY, f32::NEG_INFINITY);
        for &p in hull {
            let d = p - origin;
            let pu = dot(d, u);
            let pv = dot(d, v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.map_or(true, |(best_area, _)| area < best_area) {
            best = Some((
                area,
                [
                    origin + u * min_u + v * min_v,
                    origin + u * max_u + v * min_v,
                    origin + u * max_u + v * max_v,
                    origin + u * min_u + v * max_v,
                ],
            ));
        }
    }

    best.map(|(_, corners)| corners)
}

/// Lengths of the two distinct sides of a rectangle given in cyclic order.
pub fn rect_sides(rect: &[Coord<f32>; 4]) -> (f32, f32) {
    (distance(rect[0], rect[1]), distance(rect[1], rect[2]))
}

pub fn min_side(rect: &[Coord<f32>; 4]) -> f32 {
    let (a, b) = rect_sides(rect);
    a.min(b)
}

fn to_polygon(points: &[Coord<f32>]) -> Polygon<f32> {
    Polygon::new(LineString::from(points.to_vec()), vec![])
}

/// Signed shoelace area, positive for counter-clockwise rings.
pub fn polygon_area(points: &[Coord<f32>]) -> f32 {
    to_polygon(points).signed_area()
}

/// Sum of edge lengths including the closing edge.
pub fn polygon_perimeter(points: &[Coord<f32>]) -> f32 {
    to_polygon(points).exterior().euclidean_length()
}

/// Offset distance used to undo the shrink applied to text regions when the
/// detector was trained. Thin boxes grow by less than square ones.
pub fn unclip_distance(points: &[Coord<f32>], unclip_ratio: f32) -> f32 {
    let perimeter = polygon_perimeter(points);
    if perimeter <= 0.0 {
        return 0.0;
    }
    polygon_area(points).abs() * unclip_ratio / perimeter
}

/// Grows (or with a negative distance, shrinks) a simple polygon along its
/// edge normals with round joins. Returns the first resulting ring, or `None`
/// when the offset collapses.
pub fn offset(points: &[Coord<f32>], distance: f32) -> Option<Vec<Coord<f32>>> {
    if points.len() < 3 {
        return None;
    }

    let result = to_polygon(points).offset(
        distance,
        JoinType::Round(0.25),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    );
    let first = result.0.into_iter().next()?;

    let mut ring: Vec<Coord<f32>> = first.exterior().coords().copied().collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    (ring.len() >= 3).then_some(ring)
}

/// Projective transform taking the `width` x `height` rectangle
/// (0,0)-(w,0)-(w,h)-(0,h) onto `quad`, i.e. destination to source, which is
/// what pull-sampling needs.
///
/// Collinear corners yield the identity.
pub fn solve_homography(quad: &[Coord<f32>; 4], width: f32, height: f32) -> Matrix3<f32> {
    let [p0, p1, p2, p3] = *quad;

    let dx1 = p1.x - p2.x;
    let dx2 = p3.x - p2.x;
    let dx3 = p0.x - p1.x + p2.x - p3.x;
    let dy1 = p1.y - p2.y;
    let dy2 = p3.y - p2.y;
    let dy3 = p0.y - p1.y + p2.y - p3.y;

    let det = dx1 * dy2 - dx2 * dy1;
    if det.abs() < 1e-10 || width <= 0.0 || height <= 0.0 {
        return Matrix3::identity();
    }

    let g = (dx3 * dy2 - dx2 * dy3) / det;
    let h = (dx1 * dy3 - dx3 * dy1) / det;

    // Unit square onto the quad.
    #[rustfmt::skip]
    let square_to_quad = Matrix3::new(
        p1.x - p0.x + g * p1.x, p3.x - p0.x + h * p3.x, p0.x,
        p1.y - p0.y + g * p1.y, p3.y - p0.y + h * p3.y, p0.y,
        g,                      h,                      1.0,
    );
    let rect_to_square = Matrix3::new_nonuniform_scaling(&nalgebra::Vector2::new(
        1.0 / width,
        1.0 / height,
    ));

    square_to_quad * rect_to_square
}

pub fn project(transform: &Matrix3<f32>, x: f32, y: f32) -> (f32, f32) {
    let p = transform.transform_point(&Point2::new(x, y));
    (p.x, p.y)
}
