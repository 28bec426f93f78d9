/// Longitude bounds in degrees.
pub const LNG_MIN: f64 = -180.0;
pub const LNG_MAX: f64 = 180.0;
/// Latitude bounds in degrees.
pub const LAT_MIN: f64 = -90.0;
pub const LAT_MAX: f64 = 90.0;

/// A validated longitude/latitude pair in degrees.
///
/// Construction rejects anything outside the WGS84 degree ranges, including
/// NaN and infinities, so holders of a `LngLat` never need to re-check.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LngLat {
    lng: f64,
    lat: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CoordError {
    pub lng: f64,
    pub lat: f64,
}

impl std::fmt::Display for CoordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "coordinates out of range: lng={} lat={} (expected lng in [{LNG_MIN}, {LNG_MAX}], lat in [{LAT_MIN}, {LAT_MAX}])",
            self.lng, self.lat
        )
    }
}

impl std::error::Error for CoordError {}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Result<Self, CoordError> {
        if Self::is_valid(lng, lat) {
            Ok(Self { lng, lat })
        } else {
            Err(CoordError { lng, lat })
        }
    }

    /// Range check; `RangeInclusive::contains` is false for NaN.
    pub fn is_valid(lng: f64, lat: f64) -> bool {
        (LNG_MIN..=LNG_MAX).contains(&lng) && (LAT_MIN..=LAT_MAX).contains(&lat)
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }
}
