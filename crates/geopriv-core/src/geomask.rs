//! Geomasking
//!
//! Point-level obfuscation, as a lighter alternative to cloaking:
//!
//! - [`buffer`]: a circle centered on the true location. Attack-prone, since
//!   the center of the circle is the location.
//! - [`random_displacement`]: the location moved a random distance in
//!   `[min_radius, max_radius)` in a random direction ("donut" masking).
//! - [`random_buffer`]: a circle of radius r around a point displaced by
//!   less than r, so it always contains the true location without being
//!   centered on it.
//!
//! Radii are in the point's coordinate units; callers project first. The
//! radius is drawn uniformly, so displaced points are denser near the
//! original location than an area-uniform draw would give.

use crate::dataset::Record;
use crate::geometry::{Circle, Point};
use crate::rng::UniformSource;
use crate::{GeoPrivError, Result};
use std::f64::consts::TAU;

fn validate_radii(min_radius: f64, max_radius: f64) -> Result<()> {
    if !min_radius.is_finite() || !max_radius.is_finite() || min_radius < 0.0 || min_radius > max_radius {
        return Err(GeoPrivError::InvalidParameter(format!(
            "radii must satisfy 0 <= min <= max, got [{}, {}]",
            min_radius, max_radius
        )));
    }
    Ok(())
}

/// Circle of `radius` centered on `point`
pub fn buffer(point: Point, radius: f64) -> Result<Circle> {
    validate_radii(0.0, radius)?;
    Ok(Circle::new(point, radius))
}

/// `point` moved by a distance in `[min_radius, max_radius)` at a uniform angle
pub fn random_displacement<S: UniformSource + ?Sized>(
    point: Point,
    min_radius: f64,
    max_radius: f64,
    source: &mut S,
) -> Result<Point> {
    validate_radii(min_radius, max_radius)?;
    let r = min_radius + (max_radius - min_radius) * source.next_uniform()?;
    let theta = TAU * source.next_uniform()?;
    Ok(Point::new(point.x + r * theta.cos(), point.y + r * theta.sin()))
}

/// Circle of `radius` whose center lies within `radius` of `point`
pub fn random_buffer<S: UniformSource + ?Sized>(
    point: Point,
    radius: f64,
    source: &mut S,
) -> Result<Circle> {
    let center = random_displacement(point, 0.0, radius, source)?;
    Ok(Circle::new(center, radius))
}

/// Derived copies of `records` with every location displaced
pub fn displace_records<S: UniformSource + ?Sized>(
    records: &[Record],
    min_radius: f64,
    max_radius: f64,
    source: &mut S,
) -> Result<Vec<Record>> {
    records
        .iter()
        .map(|record| {
            let mut copy = record.clone();
            if let Some(location) = record.location {
                copy.location = Some(random_displacement(location, min_radius, max_radius, source)?);
            }
            Ok(copy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{seeded, ScriptedSource};
    use crate::Seed;

    #[test]
    fn test_displacement_stays_in_annulus() {
        let origin = Point::new(150_000.0, 6_500_000.0);
        let mut rng = seeded(Seed::from_string("donut"));
        for _ in 0..1000 {
            let p = random_displacement(origin, 10.0, 500.0, &mut rng).unwrap();
            let d = origin.distance(&p);
            assert!(d >= 10.0 - 1e-6 && d < 500.0 + 1e-6, "distance {}", d);
        }
    }

    #[test]
    fn test_scripted_displacement() {
        // r = 0 + 100 * 0.5, theta = 2π * 0.25
        let mut source = ScriptedSource::new(vec![0.5, 0.25]);
        let p = random_displacement(Point::new(0.0, 0.0), 0.0, 100.0, &mut source).unwrap();
        assert!(p.x.abs() < 1e-9);
        assert!((p.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_random_buffer_contains_point() {
        let origin = Point::new(3.0, -4.0);
        let mut rng = seeded(Seed::from_string("buffer"));
        let mut centered = 0;
        for _ in 0..500 {
            let circle = random_buffer(origin, 250.0, &mut rng).unwrap();
            assert!(circle.contains(&origin));
            if circle.center == origin {
                centered += 1;
            }
        }
        assert!(centered < 5);
    }

    #[test]
    fn test_naive_buffer_is_centered() {
        let circle = buffer(Point::new(1.0, 1.0), 500.0).unwrap();
        assert_eq!(circle.center, Point::new(1.0, 1.0));
        assert!(buffer(Point::new(1.0, 1.0), -1.0).is_err());
    }

    #[test]
    fn test_invalid_radii() {
        let mut rng = seeded(Seed::from_string("radii"));
        assert!(random_displacement(Point::new(0.0, 0.0), 10.0, 5.0, &mut rng).is_err());
        assert!(random_displacement(Point::new(0.0, 0.0), -1.0, 5.0, &mut rng).is_err());
    }

    #[test]
    fn test_displace_records_keeps_inputs() {
        let records = vec![
            Record::new("a").with_location(Point::new(0.0, 0.0)),
            Record::new("b"),
        ];
        let mut rng = seeded(Seed::from_string("records"));
        let masked = displace_records(&records, 1.0, 2.0, &mut rng).unwrap();
        assert_eq!(records[0].location, Some(Point::new(0.0, 0.0)));
        assert_ne!(masked[0].location, records[0].location);
        assert_eq!(masked[1].location, None);
    }
}
