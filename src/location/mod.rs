use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};


/// Default staleness threshold: a silent entity beyond this window is
/// considered lost/offline.
pub const STALE_THRESHOLD_SECONDS: i64 = 5 * 60;

/// Kind of tracked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Bike,
    Rider,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Bike => write!(f, "bike"),
            EntityType::Rider => write!(f, "rider"),
        }
    }
}

/// Last known physical state of one tracked entity.
///
/// Exactly one record exists per `entity_id` in the store at any time;
/// a newer sighting replaces the whole record (last-write-wins).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub entity_id: String,
    pub entity_type: EntityType,

    /// WGS84 degrees
    pub latitude: f64,
    /// WGS84 degrees
    pub longitude: f64,

    /// Meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// km/h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Degrees, 0-360
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    /// When the sender measured the position
    pub timestamp: DateTime<Utc>,

    /// When this side received the record. Always stamped locally on apply
    /// (never trusted from the sender) so staleness is evaluated against the
    /// local clock. A frame missing the field deserializes to now as a
    /// placeholder; the store overwrites it anyway.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl LocationRecord {
    /// True iff the record is older than `threshold` at instant `now`.
    ///
    /// Strict comparison: a record exactly at the threshold is still fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.updated_at > threshold
    }

    /// Staleness against the default 5-minute threshold.
    pub fn is_stale_now(&self) -> bool {
        self.is_stale(Utc::now(), Duration::seconds(STALE_THRESHOLD_SECONDS))
    }
}

/// Metadata about an entity being tracked, served by `GET /entities`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_location: Option<LocationRecord>,
    pub is_active: bool,
    pub last_update_time: DateTime<Utc>,
}

/// Partial location report sent by this client (`POST /update` or the
/// socket command path). Only `entity_id` is required; omitted fields are
/// left out of the JSON entirely.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatch {
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationPatch {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: None,
            latitude: None,
            longitude: None,
            altitude: None,
            speed: None,
            heading: None,
            accuracy: None,
            timestamp: None,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// True iff every coordinate present on the patch is within bounds.
    /// Checked by both egress paths before anything is written out.
    pub fn coordinates_valid(&self) -> bool {
        valid_coordinates(
            self.latitude.unwrap_or(0.0),
            self.longitude.unwrap_or(0.0),
        )
    }
}

/// Latitude in [-90, 90], longitude in [-180, 180].
pub fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}
