//! Certification application models and the application state table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::DomainError;
use crate::models::store::{normalize_owner_email, Address, BusinessType, NewStore, OwnerContact};
use crate::types::{DocumentRef, MAX_APPLICATION_DOCUMENTS};
use crate::validation::{
    first_validation_error, normalize_abn, require_text, validate_abn, validate_email,
    validate_phone, validate_postcode,
};

/// Status of a certification application
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

/// How a status change is authorised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Part of the normal review flow
    Standard,
    /// Skips the review step; only an administrator may take it
    AdminOverride,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::Pending,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }

    /// The transition table. `None` means the move is never allowed.
    pub fn transition_kind(&self, next: ApplicationStatus) -> Option<TransitionKind> {
        use ApplicationStatus::*;
        match (self, next) {
            (Pending, UnderReview) => Some(TransitionKind::Standard),
            (UnderReview, Approved) | (UnderReview, Rejected) => Some(TransitionKind::Standard),
            (Pending, Approved) | (Pending, Rejected) => Some(TransitionKind::AdminOverride),
            _ => None,
        }
    }

    /// Check a transition, given whether the caller holds override authority
    pub fn check_transition(
        &self,
        next: ApplicationStatus,
        has_override: bool,
    ) -> Result<TransitionKind, DomainError> {
        match self.transition_kind(next) {
            Some(TransitionKind::Standard) => Ok(TransitionKind::Standard),
            Some(TransitionKind::AdminOverride) if has_override => {
                Ok(TransitionKind::AdminOverride)
            }
            _ => Err(DomainError::Transition {
                entity: "application",
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "under_review" => Ok(ApplicationStatus::UnderReview),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(DomainError::invalid(
                "status",
                format!("unknown application status '{}'", other),
            )),
        }
    }
}

/// Employee-count band declared on the application
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmployeeBand {
    #[serde(rename = "1-5")]
    UpToFive,
    #[serde(rename = "6-20")]
    SixToTwenty,
    #[serde(rename = "21-50")]
    TwentyOneToFifty,
    #[serde(rename = "51+")]
    OverFifty,
}

impl EmployeeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeBand::UpToFive => "1-5",
            EmployeeBand::SixToTwenty => "6-20",
            EmployeeBand::TwentyOneToFifty => "21-50",
            EmployeeBand::OverFifty => "51+",
        }
    }
}

impl std::str::FromStr for EmployeeBand {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1-5" => Ok(EmployeeBand::UpToFive),
            "6-20" => Ok(EmployeeBand::SixToTwenty),
            "21-50" => Ok(EmployeeBand::TwentyOneToFifty),
            "51+" => Ok(EmployeeBand::OverFifty),
            other => Err(DomainError::invalid(
                "employee_count",
                format!("'{}' is not one of 1-5, 6-20, 21-50, 51+", other),
            )),
        }
    }
}

/// A declared ingredient or material supplier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Supplier {
    pub name: String,
    pub material: String,
    /// Supplier holds its own halal certification
    pub certified: bool,
}

/// A certification application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub store_id: i64,
    pub status: ApplicationStatus,
    pub products: Vec<String>,
    pub suppliers: Vec<Supplier>,
    pub employee_band: EmployeeBand,
    pub operating_hours: String,
    pub documents: Vec<DocumentRef>,
    pub notes: Option<String>,
    /// Reviewer notes recorded with the latest status change
    pub review_notes: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating an application once its store is resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApplication {
    pub store_id: i64,
    pub products: Vec<String>,
    pub suppliers: Vec<Supplier>,
    pub employee_band: EmployeeBand,
    pub operating_hours: String,
    pub documents: Vec<DocumentRef>,
    pub notes: Option<String>,
    pub payment_reference: Option<String>,
}

/// Application form as submitted by a business owner
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitApplicationInput {
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub business_name: String,
    pub business_type: BusinessType,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "Suburb is required"))]
    pub suburb: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    pub postcode: String,
    pub abn: String,
    #[validate(length(min = 1, message = "Owner name is required"))]
    pub owner_name: String,
    #[validate(email(message = "Owner email is invalid"))]
    pub owner_email: String,
    pub owner_phone: String,
    #[validate(length(min = 1, message = "At least one product must be declared"))]
    pub products: Vec<String>,
    #[validate(length(min = 1, message = "At least one supplier must be declared"))]
    pub suppliers: Vec<Supplier>,
    pub employee_count: String,
    pub operating_hours: String,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    pub notes: Option<String>,
    pub payment_reference: Option<String>,
}

/// A submission that passed validation, split into store and application parts
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub store: NewStore,
    pub employee_band: EmployeeBand,
    pub products: Vec<String>,
    pub suppliers: Vec<Supplier>,
    pub operating_hours: String,
    pub documents: Vec<DocumentRef>,
    pub notes: Option<String>,
    pub payment_reference: Option<String>,
}

impl ValidatedSubmission {
    pub fn into_application(self, store_id: i64) -> NewApplication {
        NewApplication {
            store_id,
            products: self.products,
            suppliers: self.suppliers,
            employee_band: self.employee_band,
            operating_hours: self.operating_hours,
            documents: self.documents,
            notes: self.notes,
            payment_reference: self.payment_reference,
        }
    }
}

fn field_error(field: &str) -> impl Fn(&'static str) -> DomainError + '_ {
    move |msg| DomainError::invalid(field, msg)
}

impl SubmitApplicationInput {
    /// Validate every field and normalise the values that get persisted
    pub fn into_validated(self) -> Result<ValidatedSubmission, DomainError> {
        self.validate().map_err(|e| first_validation_error(&e))?;

        validate_postcode(self.postcode.trim()).map_err(field_error("postcode"))?;
        validate_abn(&self.abn).map_err(field_error("abn"))?;
        validate_email(self.owner_email.trim()).map_err(field_error("owner_email"))?;
        validate_phone(&self.owner_phone).map_err(field_error("owner_phone"))?;

        let products: Vec<String> = self
            .products
            .iter()
            .map(|p| p.trim().to_string())
            .collect();
        if products.iter().any(|p| p.is_empty()) {
            return Err(DomainError::invalid("products", "Product names must not be blank"));
        }

        for (index, supplier) in self.suppliers.iter().enumerate() {
            require_text(&format!("suppliers[{}].name", index), &supplier.name)?;
            require_text(&format!("suppliers[{}].material", index), &supplier.material)?;
        }

        let employee_band = self.employee_count.parse::<EmployeeBand>()?;
        require_text("operating_hours", &self.operating_hours)?;

        if self.documents.len() > MAX_APPLICATION_DOCUMENTS {
            return Err(DomainError::invalid(
                "documents",
                format!("At most {} documents may be attached", MAX_APPLICATION_DOCUMENTS),
            ));
        }

        let payment_reference = self
            .payment_reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(ValidatedSubmission {
            store: NewStore {
                business_name: self.business_name.trim().to_string(),
                business_type: self.business_type,
                address: Address {
                    street: self.street.trim().to_string(),
                    suburb: self.suburb.trim().to_string(),
                    state: self.state.trim().to_string(),
                    postcode: self.postcode.trim().to_string(),
                },
                abn: normalize_abn(&self.abn),
                owner: OwnerContact {
                    name: self.owner_name.trim().to_string(),
                    email: normalize_owner_email(&self.owner_email),
                    phone: self.owner_phone.trim().to_string(),
                },
            },
            employee_band,
            products,
            suppliers: self.suppliers,
            operating_hours: self.operating_hours.trim().to_string(),
            documents: self.documents,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            payment_reference,
        })
    }
}
