use thiserror::Error;

use crate::domain::Axis;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("{axis} must be a finite number, got {value}")]
    NotFinite { axis: Axis, value: f64 },
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("{0} is required")]
    Missing(Axis),
    #[error("could not parse {axis} from {input:?}")]
    Unparseable { axis: Axis, input: String },
    #[error("expected \"longitude,latitude\", got {0:?}")]
    MalformedPair(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown basemap {0:?}")]
pub struct UnknownBasemap(pub String);
