use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{CoordinateError, UnknownBasemap};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(SubscriptionId);
id_newtype!(GraphicHandle);

pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Longitude,
    Latitude,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Longitude => "longitude",
            Axis::Latitude => "latitude",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated geodetic coordinate. Replaced wholesale on every change, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PointRepr")]
pub struct Point {
    longitude: f64,
    latitude: f64,
}

impl Point {
    /// Central London, the default map center.
    pub const LONDON: Point = Point {
        longitude: 0.1278,
        latitude: 51.5074,
    };

    pub fn new(longitude: f64, latitude: f64) -> Result<Self, CoordinateError> {
        if !longitude.is_finite() {
            return Err(CoordinateError::NotFinite {
                axis: Axis::Longitude,
                value: longitude,
            });
        }
        if !latitude.is_finite() {
            return Err(CoordinateError::NotFinite {
                axis: Axis::Latitude,
                value: latitude,
            });
        }
        if longitude < LONGITUDE_RANGE.0 || longitude > LONGITUDE_RANGE.1 {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        if latitude < LATITUDE_RANGE.0 || latitude > LATITUDE_RANGE.1 {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.longitude, self.latitude)
    }
}

impl FromStr for Point {
    type Err = CoordinateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some((lng, lat)) = raw.split_once(',') else {
            return Err(CoordinateError::MalformedPair(raw.to_string()));
        };
        let longitude = parse_axis(Axis::Longitude, lng)?;
        let latitude = parse_axis(Axis::Latitude, lat)?;
        Self::new(longitude, latitude)
    }
}

impl TryFrom<[f64; 2]> for Point {
    type Error = CoordinateError;

    fn try_from([longitude, latitude]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(longitude, latitude)
    }
}

pub fn parse_axis(axis: Axis, raw: &str) -> Result<f64, CoordinateError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CoordinateError::Unparseable {
            axis,
            input: raw.to_string(),
        })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Pair([f64; 2]),
    Named { longitude: f64, latitude: f64 },
}

impl TryFrom<PointRepr> for Point {
    type Error = CoordinateError;

    fn try_from(value: PointRepr) -> Result<Self, Self::Error> {
        match value {
            PointRepr::Pair(pair) => Point::try_from(pair),
            PointRepr::Named {
                longitude,
                latitude,
            } => Point::new(longitude, latitude),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Basemap {
    #[default]
    Streets,
    Satellite,
    Hybrid,
    Topo,
    Gray,
    DarkGray,
    Oceans,
    Terrain,
    Osm,
    NationalGeographic,
}

impl Basemap {
    pub const ALL: [Basemap; 10] = [
        Basemap::Streets,
        Basemap::Satellite,
        Basemap::Hybrid,
        Basemap::Topo,
        Basemap::Gray,
        Basemap::DarkGray,
        Basemap::Oceans,
        Basemap::Terrain,
        Basemap::Osm,
        Basemap::NationalGeographic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Basemap::Streets => "streets",
            Basemap::Satellite => "satellite",
            Basemap::Hybrid => "hybrid",
            Basemap::Topo => "topo",
            Basemap::Gray => "gray",
            Basemap::DarkGray => "dark-gray",
            Basemap::Oceans => "oceans",
            Basemap::Terrain => "terrain",
            Basemap::Osm => "osm",
            Basemap::NationalGeographic => "national-geographic",
        }
    }
}

impl fmt::Display for Basemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Basemap {
    type Err = UnknownBasemap;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|basemap| basemap.as_str() == wanted)
            .ok_or_else(|| UnknownBasemap(raw.to_string()))
    }
}
