use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::chapters::DatasetError;
use super::rewards::{RewardEntry, RewardError};

/// Maximum distance from a registered location that still counts as a check-in
pub const CHECK_IN_RADIUS_METERS: f64 = 50.0;

/// Mean earth radius used for great-circle distances
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Great-circle (haversine) distance to `other` in meters
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

/// A registered place of prayer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl Location {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// The registered location closest to a query point
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyLocation {
    pub name: String,
    pub distance_meters: f64,
}

/// Finds the registered location nearest to a point
pub trait LocationLookup {
    fn nearest(&self, at: Coordinates) -> Option<NearbyLocation>;
}

/// In-memory list of registered locations
#[derive(Debug, Clone, Default)]
pub struct LocationDirectory {
    locations: Vec<Location>,
}

impl LocationDirectory {
    pub fn new(locations: Vec<Location>) -> Self {
        LocationDirectory { locations }
    }

    /// Reads a JSON array of locations
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Ok(Self::new(serde_json::from_str(&raw)?))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }
}

impl LocationLookup for LocationDirectory {
    fn nearest(&self, at: Coordinates) -> Option<NearbyLocation> {
        self.locations
            .iter()
            .map(|location| NearbyLocation {
                name: location.name.clone(),
                distance_meters: at.distance_to(&location.coordinates()),
            })
            .min_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters))
    }
}

/// Issues a check-in reward if `at` is within [`CHECK_IN_RADIUS_METERS`]
/// of a registered location
pub fn check_in<L: LocationLookup + ?Sized>(
    lookup: &L,
    miner: &str,
    at: Coordinates,
    prayer_count: u64,
) -> Result<RewardEntry, RewardError> {
    let nearest = lookup.nearest(at).ok_or(RewardError::NoLocations)?;

    if nearest.distance_meters > CHECK_IN_RADIUS_METERS {
        return Err(RewardError::NotNearLocation {
            distance: nearest.distance_meters,
            radius: CHECK_IN_RADIUS_METERS,
        });
    }

    Ok(RewardEntry::check_in(miner, nearest.name, prayer_count))
}
