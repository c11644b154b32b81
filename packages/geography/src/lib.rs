#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate conversion for Taiwanese open data.
//!
//! Municipal datasets publish positions either as TWD97 / TM2 zone 121
//! projected metres (EPSG:3826) or as WGS84 decimal degrees (EPSG:4326).
//! This crate converts between the two ([`projection`]), formats decimal
//! degrees as degrees-minutes-seconds text ([`dms`]), and provides the
//! range checks the ingestion pipeline uses to reject bad coordinates.

pub mod dms;
pub mod projection;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use dms::{DmsParseError, decimal_to_dms, dms_to_decimal};
pub use projection::{twd97_to_wgs84, wgs84_to_twd97};

/// The coordinate reference system a data source publishes positions in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CoordinateSystem {
    /// TWD97 / TM2 zone 121 (EPSG:3826), metres. `x` is easting, `y` is
    /// northing.
    Twd97,
    /// WGS84 geographic (EPSG:4326), decimal degrees. `x` is longitude,
    /// `y` is latitude.
    Wgs84,
}

/// Inclusive TWD97 easting range covering Taiwan's main island.
pub const TWD97_X_RANGE: (f64, f64) = (100_000.0, 400_000.0);

/// Inclusive TWD97 northing range covering Taiwan's main island.
pub const TWD97_Y_RANGE: (f64, f64) = (2_400_000.0, 2_900_000.0);

/// Approximate latitude bounds of Taiwan.
pub const TAIWAN_LAT_RANGE: (f64, f64) = (21.5, 25.5);

/// Approximate longitude bounds of Taiwan.
pub const TAIWAN_LON_RANGE: (f64, f64) = (119.5, 122.5);

/// Returns `true` if the pair is a valid WGS84 position
/// (latitude in [-90, 90], longitude in [-180, 180]).
#[must_use]
pub fn validate_coordinates(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Returns `true` if the position lies inside Taiwan's approximate
/// bounding box.
#[must_use]
pub fn is_in_taiwan(lat: f64, lon: f64) -> bool {
    (TAIWAN_LAT_RANGE.0..=TAIWAN_LAT_RANGE.1).contains(&lat)
        && (TAIWAN_LON_RANGE.0..=TAIWAN_LON_RANGE.1).contains(&lon)
}

/// Returns `true` if `(x, y)` falls inside the TWD97 ranges used by the
/// municipal datasets.
#[must_use]
pub fn is_twd97_range(x: f64, y: f64) -> bool {
    (TWD97_X_RANGE.0..=TWD97_X_RANGE.1).contains(&x)
        && (TWD97_Y_RANGE.0..=TWD97_Y_RANGE.1).contains(&y)
}

/// Guesses the coordinate system of a raw `(x, y)` pair from its numeric
/// range.
///
/// This is a heuristic: it only looks at magnitudes. Values inside the
/// TWD97 ranges are reported as [`CoordinateSystem::Twd97`]; values that
/// form a valid longitude/latitude pair are reported as
/// [`CoordinateSystem::Wgs84`]. Anything else is inconclusive and yields
/// `None`, leaving the fallback decision to the caller.
#[must_use]
pub fn detect_coordinate_system(x: f64, y: f64) -> Option<CoordinateSystem> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    if is_twd97_range(x, y) {
        Some(CoordinateSystem::Twd97)
    } else if validate_coordinates(y, x) {
        Some(CoordinateSystem::Wgs84)
    } else {
        None
    }
}
