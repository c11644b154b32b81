//! Decimal degrees ↔ degrees-minutes-seconds text.
//!
//! The textual form is `D°MM'SS.SS"Q`: whole degrees, minutes zero-padded
//! to two digits, seconds zero-padded to two integer digits with exactly
//! two fractional digits, and a hemisphere letter.

/// Errors produced when parsing a DMS string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DmsParseError {
    /// The input had no numeric content.
    #[error("DMS string is empty")]
    Empty,

    /// A degree, minute, or second component was not a number.
    #[error("invalid DMS component '{component}' in '{input}'")]
    InvalidComponent {
        /// The offending token.
        component: String,
        /// The full input string.
        input: String,
    },

    /// More than three numeric components were present.
    #[error("too many DMS components in '{0}'")]
    TooManyComponents(String),
}

/// Formats a decimal-degree value as a DMS string.
///
/// The hemisphere letter is `N`/`S` for latitudes and `E`/`W` for
/// longitudes, chosen by the sign of `value` (zero counts as positive).
///
/// ```
/// use tw_parking_geography::decimal_to_dms;
///
/// assert_eq!(decimal_to_dms(25.0330, true), "25°01'58.80\"N");
/// assert_eq!(decimal_to_dms(121.5654, false), "121°33'55.44\"E");
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn decimal_to_dms(value: f64, is_latitude: bool) -> String {
    let positive = value >= 0.0;
    let value = value.abs();

    let degrees = value.floor();
    let minutes_decimal = (value - degrees) * 60.0;
    let minutes = minutes_decimal.floor();
    let seconds = (minutes_decimal - minutes) * 60.0;

    let direction = match (is_latitude, positive) {
        (true, true) => 'N',
        (true, false) => 'S',
        (false, true) => 'E',
        (false, false) => 'W',
    };

    format!(
        "{}°{:02}'{seconds:05.2}\"{direction}",
        degrees as u64, minutes as u64
    )
}

/// Parses a DMS string back into decimal degrees.
///
/// A trailing `N`/`S`/`E`/`W` sets the sign (`S` and `W` are negative);
/// without one the value is positive. Up to three numeric components are
/// read, split on `°`, `'` and `"`; missing minutes or seconds default to
/// zero.
///
/// # Errors
///
/// Returns [`DmsParseError`] if the string is empty, a component is not
/// numeric, or more than three components are present.
pub fn dms_to_decimal(dms: &str) -> Result<f64, DmsParseError> {
    let trimmed = dms.trim();

    let (body, negative) = match trimmed.chars().last() {
        Some(c @ ('N' | 'S' | 'E' | 'W' | 'n' | 's' | 'e' | 'w')) => (
            &trimmed[..trimmed.len() - c.len_utf8()],
            matches!(c, 'S' | 'W' | 's' | 'w'),
        ),
        _ => (trimmed, false),
    };

    let normalized = body.replace(['°', '\''], " ").replace('"', "");
    let parts: Vec<&str> = normalized.split_whitespace().collect();

    if parts.is_empty() {
        return Err(DmsParseError::Empty);
    }
    if parts.len() > 3 {
        return Err(DmsParseError::TooManyComponents(dms.to_string()));
    }

    let mut components = [0.0_f64; 3];
    for (slot, part) in components.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| DmsParseError::InvalidComponent {
                component: (*part).to_string(),
                input: dms.to_string(),
            })?;
    }

    let [degrees, minutes, seconds] = components;
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;

    Ok(if negative { -decimal } else { decimal })
}
