//! Geometry & Distance
//!
//! Point representation, planar and geodesic distances, and the enclosing
//! geometries released in place of exact locations.
//!
//! Coordinates are used as given. Nothing here reprojects: callers wanting
//! metric distances supply points in a locally-Euclidean projection, or pick
//! [`DistanceMetric::Haversine`] for raw longitude (x) / latitude (y) degrees.
//!
//! Geometry builders are always planar in the input units. Polygons are
//! emitted counter-clockwise as closed rings (last vertex == first vertex).

use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Number of segments used when a circle is emitted as a polygon
pub const CIRCLE_SEGMENTS: usize = 64;

/// Absolute slack for containment tests, scaled by coordinate magnitude
const CONTAINS_TOLERANCE: f64 = 1e-9;

/// A 2D point (projected x/y, or longitude/latitude in degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Euclidean distance in the input units
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn tolerance(&self) -> f64 {
        CONTAINS_TOLERANCE * (1.0 + self.x.abs().max(self.y.abs()))
    }
}

/// Planar distance between two points
pub fn distance(p1: &Point, p2: &Point) -> f64 {
    p1.distance(p2)
}

/// Great-circle distance in metres between two (lon=x, lat=y) points
pub fn haversine_distance(p1: &Point, p2: &Point) -> f64 {
    let (lat1, lat2) = (p1.y.to_radians(), p2.y.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (p2.x - p1.x).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// How distances between points are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance in the coordinate units
    #[default]
    Planar,
    /// Great-circle metres, treating x as longitude and y as latitude
    Haversine,
}

impl DistanceMetric {
    pub fn distance(&self, p1: &Point, p2: &Point) -> f64 {
        match self {
            DistanceMetric::Planar => p1.distance(p2),
            DistanceMetric::Haversine => haversine_distance(p1, p2),
        }
    }
}

/// Which enclosing geometry is released for an anonymity set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    #[default]
    ConvexHull,
    BoundingBox,
    /// Circle around the set's center reaching its farthest member
    Circle,
}

/// A released geometry, as an ordered vertex sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// All inputs coincide
    Point(Point),
    /// All inputs are collinear: the two extreme points
    LineString(Vec<Point>),
    /// Convex, counter-clockwise, closed ring
    Polygon(Vec<Point>),
}

impl Geometry {
    /// The vertices, with polygons closing back to their first vertex
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::LineString(pts) | Geometry::Polygon(pts) => pts.clone(),
        }
    }

    /// Whether `p` lies inside or on the boundary (small tolerance)
    pub fn contains(&self, p: &Point) -> bool {
        match self {
            Geometry::Point(q) => q.distance(p) <= p.tolerance().max(q.tolerance()),
            Geometry::LineString(pts) => match pts.as_slice() {
                [a, b, ..] => on_segment(a, b, p),
                [a] => a.distance(p) <= p.tolerance(),
                [] => false,
            },
            Geometry::Polygon(ring) => {
                if ring.len() < 4 {
                    return false;
                }
                ring.windows(2).all(|edge| {
                    let (a, b) = (&edge[0], &edge[1]);
                    let len = a.distance(b);
                    if len == 0.0 {
                        return true;
                    }
                    cross(a, b, p) / len >= -p.tolerance().max(a.tolerance())
                })
            }
        }
    }

    /// Centroid: the point itself, a segment's midpoint, or a polygon's area centroid
    pub fn centroid(&self) -> Point {
        match self {
            Geometry::Point(p) => *p,
            Geometry::LineString(pts) => mean_point(pts),
            Geometry::Polygon(ring) => {
                let mut area2 = 0.0;
                let (mut cx, mut cy) = (0.0, 0.0);
                for edge in ring.windows(2) {
                    let (a, b) = (&edge[0], &edge[1]);
                    let f = a.x * b.y - b.x * a.y;
                    area2 += f;
                    cx += (a.x + b.x) * f;
                    cy += (a.y + b.y) * f;
                }
                if area2.abs() <= f64::EPSILON {
                    // Closing vertex repeats the first one
                    return mean_point(&ring[..ring.len().saturating_sub(1).max(1)]);
                }
                Point::new(cx / (3.0 * area2), cy / (3.0 * area2))
            }
        }
    }

    /// Planar area (zero for points and segments)
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(ring) => {
                ring.windows(2)
                    .map(|e| e[0].x * e[1].y - e[1].x * e[0].y)
                    .sum::<f64>()
                    .abs()
                    / 2.0
            }
            _ => 0.0,
        }
    }
}

/// Axis-aligned min/max envelope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, p: &Point) -> bool {
        let tol = p.tolerance();
        p.x >= self.min.x - tol && p.x <= self.max.x + tol && p.y >= self.min.y - tol && p.y <= self.max.y + tol
    }

    /// The box as a geometry, degenerating to a segment or point when flat
    pub fn to_geometry(&self) -> Geometry {
        let (min, max) = (self.min, self.max);
        if min == max {
            Geometry::Point(min)
        } else if self.width() == 0.0 || self.height() == 0.0 {
            Geometry::LineString(vec![min, max])
        } else {
            Geometry::Polygon(vec![
                min,
                Point::new(max.x, min.y),
                max,
                Point::new(min.x, max.y),
                min,
            ])
        }
    }
}

/// Axis-aligned envelope of `points`
pub fn bounding_box(points: &[Point]) -> Result<BoundingBox> {
    let first = points.first().ok_or(GeoPrivError::InsufficientPoints)?;
    let (mut min, mut max) = (*first, *first);
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Ok(BoundingBox { min, max })
}

/// Minimal convex polygon containing `points` (Andrew's monotone chain)
///
/// Degenerates to a segment for collinear input and to a point when every
/// input coincides.
pub fn convex_hull(points: &[Point]) -> Result<Geometry> {
    if points.is_empty() {
        return Err(GeoPrivError::InsufficientPoints);
    }

    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();

    if pts.len() == 1 {
        return Ok(Geometry::Point(pts[0]));
    }

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }

    // Each chain ends where the other begins
    lower.pop();
    upper.pop();
    let mut hull = lower;
    hull.extend(upper);

    if hull.len() <= 2 {
        let first = pts[0];
        let last = pts[pts.len() - 1];
        return Ok(Geometry::LineString(vec![first, last]));
    }

    hull.push(hull[0]);
    Ok(Geometry::Polygon(hull))
}

/// A circle in planar coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Circle { center, radius }
    }

    /// Smallest circle centered on `center` that reaches every point
    pub fn enclosing(center: Point, points: &[Point]) -> Result<Self> {
        if points.is_empty() {
            return Err(GeoPrivError::InsufficientPoints);
        }
        let radius = points.iter().map(|p| center.distance(p)).fold(0.0, f64::max);
        Ok(Circle { center, radius })
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.center.distance(p) <= self.radius + p.tolerance()
    }

    /// Circumscribed regular polygon, so every point of the circle is covered
    pub fn to_geometry(&self, segments: usize) -> Geometry {
        if self.radius <= 0.0 {
            return Geometry::Point(self.center);
        }
        let n = segments.max(3);
        let step = std::f64::consts::TAU / n as f64;
        let r = self.radius / (step / 2.0).cos();

        let mut ring: Vec<Point> = (0..n)
            .map(|i| {
                let theta = step * i as f64;
                Point::new(self.center.x + r * theta.cos(), self.center.y + r * theta.sin())
            })
            .collect();
        ring.push(ring[0]);
        Geometry::Polygon(ring)
    }
}

/// Build the requested geometry over `points`
///
/// `center` is only used by [`GeometryKind::Circle`].
pub fn enclose(kind: GeometryKind, center: Point, points: &[Point]) -> Result<Geometry> {
    match kind {
        GeometryKind::ConvexHull => convex_hull(points),
        GeometryKind::BoundingBox => Ok(bounding_box(points)?.to_geometry()),
        GeometryKind::Circle => Ok(Circle::enclosing(center, points)?.to_geometry(CIRCLE_SEGMENTS)),
    }
}

/// z-component of (b - a) x (p - a); positive when p is left of a->b
fn cross(a: &Point, b: &Point, p: &Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
    let len = a.distance(b);
    let tol = p.tolerance().max(a.tolerance()).max(b.tolerance());
    if len == 0.0 {
        return a.distance(p) <= tol;
    }
    if (cross(a, b, p) / len).abs() > tol {
        return false;
    }
    let t = ((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / (len * len);
    t >= -tol / len && t <= 1.0 + tol / len
}

fn mean_point(points: &[Point]) -> Point {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}
