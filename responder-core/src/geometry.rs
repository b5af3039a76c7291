//! Pure geometry: great-circle distance, synthetic path interpolation and the
//! Encoded Polyline Algorithm Format.
//!
//! Nothing here performs I/O or keeps state. Randomness is always supplied by
//! the caller so that simulated paths can be reproduced from a seed.

use rand::Rng;

use crate::{error::PolylineError, model::Coordinate};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Maximum per-axis offset (degrees) applied to interior interpolated points.
pub const PATH_JITTER_DEG: f64 = 0.001;

const POLYLINE_PRECISION: f64 = 1e5;
const POLYLINE_OFFSET: u8 = 63;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION_BIT: i64 = 0x20;

/// Haversine distance between two coordinates, in kilometers.
///
/// Inputs are not validated; out-of-range coordinates give a meaningless but
/// finite result.
pub fn great_circle_distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Straight line from `a` to `b` split into `segments` pieces, with interior
/// points nudged by up to [`PATH_JITTER_DEG`] to look like a road.
///
/// Returns `segments + 1` points. The first is exactly `a` and the last is
/// exactly `b`. A `segments` of zero is treated as one.
pub fn interpolate_path<R: Rng + ?Sized>(
    a: Coordinate,
    b: Coordinate,
    segments: usize,
    rng: &mut R,
) -> Vec<Coordinate> {
    let segments = segments.max(1);
    let mut path = Vec::with_capacity(segments + 1);

    path.push(a);
    for i in 1..segments {
        let t = i as f64 / segments as f64;
        let lat = a.latitude + t * (b.latitude - a.latitude);
        let lon = a.longitude + t * (b.longitude - a.longitude);

        path.push(Coordinate::new(
            lat + rng.gen_range(-PATH_JITTER_DEG..=PATH_JITTER_DEG),
            lon + rng.gen_range(-PATH_JITTER_DEG..=PATH_JITTER_DEG),
        ));
    }
    path.push(b);

    path
}

/// Decode a string in the Encoded Polyline Algorithm Format.
///
/// Each value is a zig-zag encoded delta split into 5-bit little-endian
/// chunks, offset by 63, with bit 0x20 marking that another chunk follows.
/// Values alternate latitude, longitude and are accumulated from zero.
pub fn decode_polyline(encoded: &str) -> Result<Vec<Coordinate>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();

    while index < bytes.len() {
        let start = index;
        lat = lat
            .checked_add(next_value(bytes, &mut index)?)
            .ok_or(PolylineError::Overflow(start))?;

        let start = index;
        lng = lng
            .checked_add(next_value(bytes, &mut index)?)
            .ok_or(PolylineError::Overflow(start))?;

        points.push(Coordinate::new(
            lat as f64 / POLYLINE_PRECISION,
            lng as f64 / POLYLINE_PRECISION,
        ));
    }

    Ok(points)
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let start = *index;
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(*index).ok_or(PolylineError::Truncated(*index))?;
        if !(POLYLINE_OFFSET..=POLYLINE_OFFSET + 0x3f).contains(&byte) {
            return Err(PolylineError::InvalidByte { offset: *index, byte });
        }
        *index += 1;

        if shift > 60 {
            return Err(PolylineError::Overflow(start));
        }

        let chunk = i64::from(byte - POLYLINE_OFFSET);
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }

    Ok(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}

/// Encode coordinates in the Encoded Polyline Algorithm Format (1e-5 precision).
pub fn encode_polyline(points: &[Coordinate]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for point in points {
        let lat = (point.latitude * POLYLINE_PRECISION).round() as i64;
        let lng = (point.longitude * POLYLINE_PRECISION).round() as i64;

        push_value(lat - prev_lat, &mut out);
        push_value(lng - prev_lng, &mut out);

        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn push_value(delta: i64, out: &mut String) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };

    while value >= CONTINUATION_BIT {
        out.push(char::from(((CONTINUATION_BIT | (value & CHUNK_MASK)) as u8) + POLYLINE_OFFSET));
        value >>= 5;
    }
    out.push(char::from(value as u8 + POLYLINE_OFFSET));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    const REFERENCE_POLYLINE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn reference_points() -> Vec<Coordinate> {
        vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ]
    }

    fn assert_close(a: Coordinate, b: Coordinate, tol: f64) {
        assert!(
            (a.latitude - b.latitude).abs() <= tol && (a.longitude - b.longitude).abs() <= tol,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = Coordinate::new(40.7128, -74.0060);
        assert_eq!(great_circle_distance_km(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let nyc = Coordinate::new(40.7128, -74.0060);
        let lagos = Coordinate::new(6.5244, 3.3792);
        assert_eq!(great_circle_distance_km(nyc, lagos), great_circle_distance_km(lagos, nyc));
    }

    #[test]
    fn distance_matches_known_value() {
        // Paris to London is roughly 344 km along the great circle.
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = great_circle_distance_km(paris, london);
        assert!((d - 343.5).abs() < 1.0, "got {d}");
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = great_circle_distance_km(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn interpolated_path_has_exact_endpoints() {
        let a = Coordinate::new(40.7589, -73.9851);
        let b = Coordinate::new(40.7128, -74.0060);
        let mut rng = StdRng::seed_from_u64(7);

        let path = interpolate_path(a, b, 9, &mut rng);

        assert_eq!(path.len(), 10);
        assert_eq!(path[0], a);
        assert_eq!(path[9], b);
    }

    #[test]
    fn interpolated_jitter_is_bounded() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(99);

        let path = interpolate_path(a, b, 10, &mut rng);

        for (i, p) in path.iter().enumerate() {
            let t = i as f64 / 10.0;
            assert!((p.latitude - t).abs() <= PATH_JITTER_DEG + 1e-12);
            assert!((p.longitude - t).abs() <= PATH_JITTER_DEG + 1e-12);
        }
    }

    #[test]
    fn interpolation_is_reproducible_from_seed() {
        let a = Coordinate::new(6.45, 3.39);
        let b = Coordinate::new(6.60, 3.35);

        let first = interpolate_path(a, b, 6, &mut StdRng::seed_from_u64(1));
        let second = interpolate_path(a, b, 6, &mut StdRng::seed_from_u64(1));

        assert_eq!(first, second);
    }

    #[test]
    fn zero_segments_still_yields_both_endpoints() {
        let a = Coordinate::new(1.0, 2.0);
        let b = Coordinate::new(3.0, 4.0);
        let path = interpolate_path(a, b, 0, &mut StdRng::seed_from_u64(0));
        assert_eq!(path, vec![a, b]);
    }

    #[test]
    fn decodes_reference_polyline() {
        let decoded = decode_polyline(REFERENCE_POLYLINE).expect("reference polyline is valid");

        assert_eq!(decoded.len(), 3);
        for (got, want) in decoded.into_iter().zip(reference_points()) {
            assert_close(got, want, 1e-5);
        }
    }

    #[test]
    fn encodes_reference_polyline() {
        assert_eq!(encode_polyline(&reference_points()), REFERENCE_POLYLINE);
    }

    #[test]
    fn decodes_what_it_encodes_across_hemispheres() {
        let points = vec![
            Coordinate::new(-33.86785, 151.20732),
            Coordinate::new(-33.0, -70.66667),
            Coordinate::new(64.1466, -21.9426),
            Coordinate::new(0.0, 0.0),
        ];

        let decoded = decode_polyline(&encode_polyline(&points)).unwrap();

        assert_eq!(decoded.len(), points.len());
        for (got, want) in decoded.into_iter().zip(points) {
            assert_close(got, want, 1e-5);
        }
    }

    #[test]
    fn empty_polyline_is_empty_path() {
        assert!(decode_polyline("").unwrap().is_empty());
    }

    #[test]
    fn truncated_polyline_is_an_error() {
        // Latitude only: the longitude of the first point is missing.
        let err = decode_polyline("_p~iF").unwrap_err();
        assert_eq!(err, PolylineError::Truncated(5));

        // Ends on a continuation chunk.
        let err = decode_polyline("_p~").unwrap_err();
        assert!(matches!(err, PolylineError::Truncated(_)));
    }

    #[test]
    fn bytes_outside_alphabet_are_rejected() {
        let err = decode_polyline("_p iF~ps|U").unwrap_err();
        assert_eq!(err, PolylineError::InvalidByte { offset: 2, byte: b' ' });
    }

    #[test]
    fn runaway_continuation_is_overflow() {
        let err = decode_polyline(&"~".repeat(20)).unwrap_err();
        assert_eq!(err, PolylineError::Overflow(0));
    }

    #[test]
    fn accumulated_overflow_is_an_error() {
        // Each value is a valid delta near 2^62; their running sum is not.
        let value = "}~~~~~~~~~~~F";
        assert!(decode_polyline(&format!("{value}?")).is_ok());

        let err = decode_polyline(&format!("{value}?").repeat(3)).unwrap_err();
        assert!(matches!(err, PolylineError::Overflow(_)), "{err:?}");
    }
}
