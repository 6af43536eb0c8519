//! Storage interface for the certification workflow
//!
//! Lifecycle services talk to [`Repository`] for reads and to a
//! [`UnitOfWork`] for every state change. A unit of work is one transaction:
//! rows fetched with the `lock_*` methods stay locked until it is committed
//! or dropped, and dropping it without calling `commit` rolls everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    Application, ApplicationStatus, AuditLogEntry, Certificate, CertificateNumber,
    CertificateStatus, EntityType, EvidencePhoto, Inspection, InspectionStatus, NewApplication,
    NewAuditEntry, NewCertificate, NewEvidencePhoto, NewInspection, NewStore, Role, Store, User,
};

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// A user together with the stored password hash
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Fields for creating a staff account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub password_hash: String,
}

/// Connection-level access: reads, best-effort audit appends, transactions
#[async_trait]
pub trait Repository: Send + Sync {
    /// Open a transaction
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    /// Cheap reachability check for health reporting
    async fn ping(&self) -> AppResult<()>;

    async fn get_store(&self, id: i64) -> AppResult<Option<Store>>;

    async fn get_application(&self, id: i64) -> AppResult<Option<Application>>;

    async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> AppResult<Vec<Application>>;

    async fn get_inspection(&self, id: i64) -> AppResult<Option<Inspection>>;

    async fn list_inspections_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<Inspection>>;

    async fn list_inspections_for_inspector(&self, inspector_id: i64)
        -> AppResult<Vec<Inspection>>;

    async fn list_photos(&self, inspection_id: i64) -> AppResult<Vec<EvidencePhoto>>;

    async fn get_certificate(&self, id: i64) -> AppResult<Option<Certificate>>;

    async fn find_certificate_by_number(
        &self,
        number: &CertificateNumber,
    ) -> AppResult<Option<Certificate>>;

    async fn list_certificates_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<Certificate>>;

    /// Most recently issued certificate whose store name or address
    /// contains `query` (case-insensitive)
    async fn search_certificates_by_store(&self, query: &str) -> AppResult<Option<Certificate>>;

    /// Append outside any transaction
    async fn append_audit(&self, entry: NewAuditEntry) -> AppResult<AuditLogEntry>;

    /// Entries for one entity, oldest first
    async fn audit_history(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> AppResult<Vec<AuditLogEntry>>;

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<UserCredentials>>;

    async fn get_user(&self, id: i64) -> AppResult<Option<User>>;

    async fn insert_user(&self, user: NewUser) -> AppResult<User>;

    async fn count_users(&self) -> AppResult<i64>;
}

/// One transaction spanning any number of aggregates
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock the store registered under the owner's email, creating it from
    /// `store` when there is none. The flag is `true` for an existing store.
    /// Concurrent first submissions for one email resolve to the same row.
    async fn resolve_store(&mut self, store: &NewStore) -> AppResult<(Store, bool)>;

    async fn get_store(&mut self, id: i64) -> AppResult<Option<Store>>;

    async fn insert_application(&mut self, application: &NewApplication)
        -> AppResult<Application>;

    /// Fetch and lock an application row
    async fn lock_application(&mut self, id: i64) -> AppResult<Option<Application>>;

    /// Compare-and-set the status. Fails with `Conflict` when the stored
    /// status is no longer `expected`.
    async fn update_application_status(
        &mut self,
        id: i64,
        expected: ApplicationStatus,
        next: ApplicationStatus,
        review_notes: Option<&str>,
    ) -> AppResult<Application>;

    async fn has_approved_inspection(&mut self, application_id: i64) -> AppResult<bool>;

    async fn insert_inspection(&mut self, inspection: &NewInspection) -> AppResult<Inspection>;

    /// Fetch and lock an inspection row
    async fn lock_inspection(&mut self, id: i64) -> AppResult<Option<Inspection>>;

    /// Persist every mutable inspection field, guarded by the status the
    /// caller read (`Conflict` otherwise)
    async fn save_inspection(
        &mut self,
        inspection: &Inspection,
        expected: InspectionStatus,
    ) -> AppResult<Inspection>;

    async fn insert_photo(&mut self, photo: &NewEvidencePhoto) -> AppResult<EvidencePhoto>;

    /// Insert unless the certificate number is taken, in which case
    /// `Ok(None)` is returned and the transaction stays usable
    async fn insert_certificate(
        &mut self,
        certificate: &NewCertificate,
    ) -> AppResult<Option<Certificate>>;

    /// Fetch and lock a certificate row
    async fn lock_certificate(&mut self, id: i64) -> AppResult<Option<Certificate>>;

    /// Compare-and-set the certificate status
    async fn update_certificate_status(
        &mut self,
        id: i64,
        expected: CertificateStatus,
        next: CertificateStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<Certificate>;

    /// Flip every active certificate past expiry to `expired`
    async fn expire_certificates(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Certificate>>;

    /// Append inside the transaction; discarded on rollback
    async fn append_audit(&mut self, entry: &NewAuditEntry) -> AppResult<AuditLogEntry>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// `%query%` for LIKE matching with wildcards in the input escaped
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
