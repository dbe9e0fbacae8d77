//! WGS84 ellipsoid helpers: local radii, small offsets, bearings and the
//! Vincenty inverse solution for geodesic distance.

/// WGS84 semi-major axis (metres)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// Mean Earth radius used by the spherical fallback
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;
/// Half the equatorial circumference, the largest geodesic distance
pub const MAX_GEODESIC_DISTANCE_M: f64 = std::f64::consts::PI * WGS84_A;

const VINCENTY_TOLERANCE: f64 = 1e-12;
const VINCENTY_MAX_ITERATIONS: usize = 200;

/// Radius of curvature in the meridian at `lat_deg`
pub fn meridional_radius(lat_deg: f64) -> f64 {
    let s = lat_deg.to_radians().sin();
    WGS84_A * (1.0 - WGS84_E2) / (1.0 - WGS84_E2 * s * s).powf(1.5)
}

/// Radius of curvature in the prime vertical at `lat_deg`
pub fn prime_vertical_radius(lat_deg: f64) -> f64 {
    let s = lat_deg.to_radians().sin();
    WGS84_A / (1.0 - WGS84_E2 * s * s).sqrt()
}

/// Shift a position by a local north/east offset in metres.
///
/// Uses the local ellipsoid radii, accurate for offsets of a few kilometres.
pub fn offset_position(lat_deg: f64, lon_deg: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let dlat = (north_m / meridional_radius(lat_deg)).to_degrees();
    let dlon = (east_m / (prime_vertical_radius(lat_deg) * lat_deg.to_radians().cos())).to_degrees();
    let lon = (lon_deg + dlon + 180.0).rem_euclid(360.0) - 180.0;
    (lat_deg + dlat, lon)
}

/// Initial great-circle bearing from point 1 to point 2, degrees clockwise from north
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dlambda = (lon2 - lon1).to_radians();
    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Great-circle distance on a sphere of mean Earth radius
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Ellipsoidal distance between two positions in metres.
///
/// Solves the Vincenty inverse problem on WGS84. For nearly antipodal
/// points where the iteration does not converge, falls back to the
/// spherical distance. Missing coordinates yield NaN.
pub fn geodesic_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !(lat1.is_finite() && lon1.is_finite() && lat2.is_finite() && lon2.is_finite()) {
        return f64::NAN;
    }
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }

    let b = WGS84_A * (1.0 - WGS84_F);
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return 0.0;
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha = 0
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if (lambda - lambda_prev).abs() < VINCENTY_TOLERANCE {
            let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - b * b) / (b * b);
            let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
            return b * big_a * (sigma - delta_sigma);
        }
    }

    log::warn!(
        "Vincenty did not converge for ({:.4}, {:.4}) -> ({:.4}, {:.4}), using spherical distance",
        lat1,
        lon1,
        lat2,
        lon2
    );
    haversine_distance(lat1, lon1, lat2, lon2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_degree_of_latitude_at_equator() {
        // 110.574 km per degree of latitude at the equator on WGS84
        let d = geodesic_distance(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(d, 110_574.4, epsilon = 1.0);
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let d = geodesic_distance(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(d, 111_319.5, epsilon = 1.0);
    }

    #[test]
    fn test_antipodal_points_fall_back_without_panicking() {
        let d = geodesic_distance(0.0, 0.0, 0.5, 179.7);
        assert!(d.is_finite());
        assert!(d > 19_000_000.0);
    }

    #[test]
    fn test_missing_coordinates_give_nan() {
        assert!(geodesic_distance(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_offset_position_round_trip() {
        let (lat, lon) = offset_position(10.0, -40.0, 1000.0, 0.0);
        let d = geodesic_distance(10.0, -40.0, lat, lon);
        assert_relative_eq!(d, 1000.0, epsilon = 0.5);
        assert_relative_eq!(initial_bearing(10.0, -40.0, lat, lon), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bearing_east() {
        assert_relative_eq!(initial_bearing(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
    }
}
