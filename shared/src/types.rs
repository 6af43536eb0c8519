//! Common types used across the platform

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// GPS snapshot captured by an inspector's device
///
/// Purely descriptive metadata; never used for authorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy radius in metres
    pub accuracy_m: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            captured_at,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Coordinates inside the WGS84 range
    pub fn is_plausible(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy_m.map_or(true, |a| a >= 0.0)
    }
}

/// Kinds of evidence documents attached to an application
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    BusinessRegistration,
    FoodSafetyCertificate,
    SupplierCertificates,
    PremisesPhoto,
}

/// Reference to a document held by the document store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub document_id: Uuid,
}

/// Maximum evidence documents per application
pub const MAX_APPLICATION_DOCUMENTS: usize = 4;

/// Entity families recorded in the audit log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Store,
    Application,
    Inspection,
    Certificate,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Store => "store",
            EntityType::Application => "application",
            EntityType::Inspection => "inspection",
            EntityType::Certificate => "certificate",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" => Ok(EntityType::Store),
            "application" => Ok(EntityType::Application),
            "inspection" => Ok(EntityType::Inspection),
            "certificate" => Ok(EntityType::Certificate),
            other => Err(crate::DomainError::invalid(
                "entity_type",
                format!("unknown entity type '{}'", other),
            )),
        }
    }
}
