//! TWD97 / TM2 zone 121 ↔ WGS84 transforms.
//!
//! Closed-form Transverse Mercator on the GRS80 ellipsoid using the
//! Krüger series to third order in the third flattening, which is accurate
//! to well under a millimetre inside a 3° zone. The TWD97 datum and WGS84
//! are treated as coincident; they differ by less than a metre in Taiwan.

/// GRS80 semi-major axis in metres.
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// GRS80 flattening.
const FLATTENING: f64 = 1.0 / 298.257_222_101;

/// TM2 zone 121 central meridian in degrees.
const CENTRAL_MERIDIAN: f64 = 121.0;

/// TM2 scale factor on the central meridian.
const SCALE_FACTOR: f64 = 0.9999;

/// TM2 false easting in metres.
const FALSE_EASTING: f64 = 250_000.0;

/// TM2 false northing in metres.
const FALSE_NORTHING: f64 = 0.0;

/// Multipliers `2j` for the three series terms.
const HARMONICS: [f64; 3] = [2.0, 4.0, 6.0];

/// Series coefficients derived from the ellipsoid.
struct Series {
    /// Rectifying radius scaled by the central scale factor.
    k0_a: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    /// `2 * sqrt(n) / (1 + n)`, the conformal latitude factor.
    conformal: f64,
}

impl Series {
    fn grs80() -> Self {
        let n = FLATTENING / (2.0 - FLATTENING);
        let n2 = n * n;
        let n3 = n2 * n;
        let rectifying = SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);

        Self {
            k0_a: SCALE_FACTOR * rectifying,
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
            conformal: 2.0 * n.sqrt() / (1.0 + n),
        }
    }
}

/// Converts TWD97 projected coordinates (EPSG:3826) to WGS84 (EPSG:4326).
///
/// `x` is the easting and `y` the northing, both in metres. Returns
/// `(latitude, longitude)` in decimal degrees. No range check is applied;
/// callers decide which inputs are plausible.
#[must_use]
pub fn twd97_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let s = Series::grs80();

    let xi = (y - FALSE_NORTHING) / s.k0_a;
    let eta = (x - FALSE_EASTING) / s.k0_a;

    let mut xi_prime = xi;
    let mut eta_prime = eta;
    for (k, beta) in HARMONICS.into_iter().zip(s.beta) {
        xi_prime -= beta * (k * xi).sin() * (k * eta).cosh();
        eta_prime -= beta * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_prime.sin() / eta_prime.cosh()).asin();

    let mut phi = chi;
    for (k, delta) in HARMONICS.into_iter().zip(s.delta) {
        phi += delta * (k * chi).sin();
    }

    let lambda = CENTRAL_MERIDIAN.to_radians() + (eta_prime.sinh() / xi_prime.cos()).atan();

    (phi.to_degrees(), lambda.to_degrees())
}

/// Converts WGS84 geographic coordinates (EPSG:4326) to TWD97 (EPSG:3826).
///
/// Returns `(x, y)`: easting and northing in metres.
#[must_use]
pub fn wgs84_to_twd97(lat: f64, lon: f64) -> (f64, f64) {
    let s = Series::grs80();

    let phi = lat.to_radians();
    let d_lambda = (lon - CENTRAL_MERIDIAN).to_radians();

    let t = (phi.sin().atanh() - s.conformal * (s.conformal * phi.sin()).atanh()).sinh();
    let xi_prime = (t / d_lambda.cos()).atan();
    let eta_prime = (d_lambda.sin() / t.mul_add(t, 1.0).sqrt()).atanh();

    let mut xi = xi_prime;
    let mut eta = eta_prime;
    for (k, alpha) in HARMONICS.into_iter().zip(s.alpha) {
        xi += alpha * (k * xi_prime).sin() * (k * eta_prime).cosh();
        eta += alpha * (k * xi_prime).cos() * (k * eta_prime).sinh();
    }

    let x = s.k0_a.mul_add(eta, FALSE_EASTING);
    let y = s.k0_a.mul_add(xi, FALSE_NORTHING);
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_central_meridian_on_equator() {
        let (lat, lon) = twd97_to_wgs84(FALSE_EASTING, 0.0);
        assert!(lat.abs() < 1e-9);
        assert!((lon - CENTRAL_MERIDIAN).abs() < 1e-9);
    }

    #[test]
    fn taipei_101_projects_into_tm2_zone() {
        let (x, y) = wgs84_to_twd97(25.0330, 121.5654);
        assert!((305_000.0..309_000.0).contains(&x), "x = {x}");
        assert!((2_767_000.0..2_772_000.0).contains(&y), "y = {y}");
    }

    #[test]
    fn taipei_101_matches_reference_grid_coordinates() {
        let (x, y) = wgs84_to_twd97(25.0330, 121.5654);
        assert!((x - 307_056.819).abs() < 0.01, "x = {x}");
        assert!((y - 2_769_551.837).abs() < 0.01, "y = {y}");

        let (lat, lon) = twd97_to_wgs84(307_056.819, 2_769_551.837);
        assert!((lat - 25.0330).abs() < 1e-7, "lat = {lat}");
        assert!((lon - 121.5654).abs() < 1e-7, "lon = {lon}");
    }

    #[test]
    fn round_trips_through_twd97() {
        let (x, y) = wgs84_to_twd97(25.0330, 121.5654);
        let (lat, lon) = twd97_to_wgs84(x, y);
        assert!((lat - 25.0330).abs() < 1e-4);
        assert!((lon - 121.5654).abs() < 1e-4);
    }

    #[test]
    fn round_trip_is_centimetre_accurate_across_the_zone() {
        for (lat, lon) in [(21.9, 120.1), (23.5, 121.0), (25.3, 121.9), (24.1, 120.6)] {
            let (x, y) = wgs84_to_twd97(lat, lon);
            let (back_lat, back_lon) = twd97_to_wgs84(x, y);
            assert!((back_lat - lat).abs() < 1e-7, "lat {lat} -> {back_lat}");
            assert!((back_lon - lon).abs() < 1e-7, "lon {lon} -> {back_lon}");
        }
    }

    #[test]
    fn points_east_of_meridian_have_larger_easting() {
        let (west, _) = wgs84_to_twd97(24.0, 120.5);
        let (east, _) = wgs84_to_twd97(24.0, 121.5);
        assert!(west < FALSE_EASTING);
        assert!(east > FALSE_EASTING);
    }
}
