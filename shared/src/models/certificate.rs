//! Halal certificate models

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Certificates are valid for 365 days from issue (no leap-year adjustment)
pub const CERTIFICATE_VALIDITY_DAYS: i64 = 365;

/// Prefix of every certificate number
pub const CERTIFICATE_PREFIX: &str = "HAL";

/// Persisted status of a certificate
///
/// `Expired` is only written by the administrative sweep; readers derive
/// expiry from `expires_at` instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Expired,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CertificateStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CertificateStatus::Active),
            "expired" => Ok(CertificateStatus::Expired),
            "revoked" => Ok(CertificateStatus::Revoked),
            other => Err(DomainError::invalid(
                "status",
                format!("unknown certificate status '{}'", other),
            )),
        }
    }
}

/// Certificate number in the form `HAL-<year>-<4 digits>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateNumber(String);

impl CertificateNumber {
    /// Build a number for `year` from a suffix in 0..=9999
    pub fn new(year: i32, suffix: u16) -> Result<Self, DomainError> {
        if suffix > 9999 {
            return Err(DomainError::invalid(
                "certificate_number",
                "suffix must be at most four digits",
            ));
        }
        Ok(Self(format!("{}-{}-{:04}", CERTIFICATE_PREFIX, year, suffix)))
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let invalid = || {
            DomainError::invalid(
                "certificate_number",
                format!("'{}' is not of the form HAL-YYYY-NNNN", value),
            )
        };
        let mut parts = value.trim().split('-');
        let (Some(prefix), Some(year), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
        if !prefix.eq_ignore_ascii_case(CERTIFICATE_PREFIX) || !digits(year, 4) || !digits(suffix, 4)
        {
            return Err(invalid());
        }
        Ok(Self(format!("{}-{}-{}", CERTIFICATE_PREFIX, year, suffix)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> i32 {
        self.0[4..8].parse().unwrap_or_default()
    }
}

impl std::fmt::Display for CertificateNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CertificateNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CertificateNumber::parse(&value)
    }
}

impl From<CertificateNumber> for String {
    fn from(value: CertificateNumber) -> Self {
        value.0
    }
}

/// An issued certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub certificate_number: CertificateNumber,
    pub application_id: i64,
    pub store_id: i64,
    pub status: CertificateStatus,
    pub issued_by: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// String a QR renderer encodes for public verification
    pub verification_url: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}

/// Fields for inserting a certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCertificate {
    pub certificate_number: CertificateNumber,
    pub application_id: i64,
    pub store_id: i64,
    pub issued_by: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verification_url: String,
}

/// Expiry for a certificate issued at `issued_at`
pub fn expiry_for(issued_at: DateTime<Utc>, validity_days: i64) -> DateTime<Utc> {
    issued_at + Duration::days(validity_days)
}

/// Year component used in new certificate numbers
pub fn issue_year(issued_at: DateTime<Utc>) -> i32 {
    issued_at.year()
}

impl Certificate {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole days until expiry; negative once expired
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }

    /// Externally meaningful validity: active and not past expiry
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == CertificateStatus::Active && !self.is_expired(now)
    }

    /// Status as a reader should see it at `now`
    pub fn effective_status(&self, now: DateTime<Utc>) -> CertificateStatus {
        match self.status {
            CertificateStatus::Active if self.is_expired(now) => CertificateStatus::Expired,
            status => status,
        }
    }
}
