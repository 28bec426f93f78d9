use crate::model::MarkerId;

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerError {
    InvalidCoordinates { lng: f64, lat: f64 },
    NotFound(MarkerId),
    NotReady,
    PersistenceWriteFailed(String),
    PersistenceReadCorrupt(String),
}

impl std::fmt::Display for MarkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerError::InvalidCoordinates { lng, lat } => {
                write!(f, "invalid coordinates: lng={lng} lat={lat}")
            }
            MarkerError::NotFound(id) => write!(f, "marker not found: {id}"),
            MarkerError::NotReady => write!(f, "marker store not initialized"),
            MarkerError::PersistenceWriteFailed(msg) => {
                write!(f, "marker snapshot write failed: {msg}")
            }
            MarkerError::PersistenceReadCorrupt(msg) => {
                write!(f, "marker snapshot corrupt: {msg}")
            }
        }
    }
}

impl std::error::Error for MarkerError {}

/// Failures reported by a persistence surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    Unavailable,
    Io(String),
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::Unavailable => write!(f, "storage unavailable"),
            SurfaceError::Io(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<SurfaceError> for MarkerError {
    fn from(e: SurfaceError) -> Self {
        MarkerError::PersistenceWriteFailed(e.to_string())
    }
}

impl From<foundation::CoordError> for MarkerError {
    fn from(e: foundation::CoordError) -> Self {
        MarkerError::InvalidCoordinates {
            lng: e.lng,
            lat: e.lat,
        }
    }
}
