//! Store (business) models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business categories accepted for certification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Restaurant,
    Cafe,
    Butcher,
    Grocery,
    Bakery,
    Caterer,
    FoodManufacturer,
    Other,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::Restaurant => "restaurant",
            BusinessType::Cafe => "cafe",
            BusinessType::Butcher => "butcher",
            BusinessType::Grocery => "grocery",
            BusinessType::Bakery => "bakery",
            BusinessType::Caterer => "caterer",
            BusinessType::FoodManufacturer => "food_manufacturer",
            BusinessType::Other => "other",
        }
    }
}

impl std::str::FromStr for BusinessType {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restaurant" => Ok(BusinessType::Restaurant),
            "cafe" => Ok(BusinessType::Cafe),
            "butcher" => Ok(BusinessType::Butcher),
            "grocery" => Ok(BusinessType::Grocery),
            "bakery" => Ok(BusinessType::Bakery),
            "caterer" => Ok(BusinessType::Caterer),
            "food_manufacturer" => Ok(BusinessType::FoodManufacturer),
            "other" => Ok(BusinessType::Other),
            other => Err(crate::DomainError::invalid(
                "business_type",
                format!("unknown business type '{}'", other),
            )),
        }
    }
}

/// Street address of the certified premises
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub suburb: String,
    pub state: String,
    pub postcode: String,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} {} {}",
            self.street, self.suburb, self.state, self.postcode
        )
    }
}

/// Owner contact details; the email identifies the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A business seeking or holding certification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub business_name: String,
    pub business_type: BusinessType,
    pub address: Address,
    /// 11-digit Australian Business Number
    pub abn: String,
    pub owner: OwnerContact,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStore {
    pub business_name: String,
    pub business_type: BusinessType,
    pub address: Address,
    pub abn: String,
    pub owner: OwnerContact,
}

/// Emails are matched case-insensitively when resolving a store
pub fn normalize_owner_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
