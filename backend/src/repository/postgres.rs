//! PostgreSQL repository
//!
//! Status columns are stored as text and parsed back through the domain
//! `FromStr` impls. List-shaped fields (products, suppliers, documents) and
//! GPS snapshots live in JSONB columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use shared::{
    Address, Application, ApplicationStatus, AuditLogEntry, Certificate, CertificateNumber,
    CertificateStatus, DocumentRef, DomainError, EntityType, EvidencePhoto, GeoPoint, Inspection,
    InspectionStatus, NewApplication, NewAuditEntry, NewCertificate, NewEvidencePhoto,
    NewInspection, NewStore, OwnerContact, Store, Supplier, User,
};
use sqlx::{types::Json, FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{like_pattern, NewUser, Repository, UnitOfWork, UserCredentials};
use crate::error::{AppError, AppResult};

// ============================================================================
// Column lists
// ============================================================================

const STORE_COLUMNS: &str = "id, business_name, business_type, street, suburb, state, postcode, \
     abn, owner_name, owner_email, owner_phone, created_at, updated_at";

const APPLICATION_COLUMNS: &str = "id, store_id, status, products, suppliers, employee_band, \
     operating_hours, documents, notes, review_notes, payment_reference, created_at, updated_at";

const INSPECTION_COLUMNS: &str = "id, application_id, inspector_id, status, visit_date, location, \
     started_at, completed_at, notes, decision, signature, signed_at, created_at, updated_at";

const PHOTO_COLUMNS: &str =
    "id, inspection_id, document_id, photo_type, caption, location, created_at";

const CERTIFICATE_COLUMNS: &str = "id, certificate_number, application_id, store_id, status, \
     issued_by, issued_at, expires_at, verification_url, revoked_at, revocation_reason";

const AUDIT_COLUMNS: &str =
    "id, actor_id, action, entity_type, entity_id, details, ip_address, created_at";

const USER_COLUMNS: &str = "id, username, name, email, role, password_hash, is_active, created_at";

// ============================================================================
// Row types
// ============================================================================

/// Parse a text column through its domain `FromStr`
fn column<T>(value: &str) -> AppResult<T>
where
    T: std::str::FromStr<Err = DomainError>,
{
    value
        .parse()
        .map_err(|e: DomainError| AppError::Internal(format!("unreadable column value: {}", e)))
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn collect<R, T>(rows: Vec<R>) -> AppResult<Vec<T>>
where
    R: TryInto<T, Error = AppError>,
{
    rows.into_iter().map(TryInto::try_into).collect()
}

fn json_column<T: DeserializeOwned>(value: Json<T>) -> T {
    value.0
}

#[derive(Debug, FromRow)]
struct StoreRow {
    id: i64,
    business_name: String,
    business_type: String,
    street: String,
    suburb: String,
    state: String,
    postcode: String,
    abn: String,
    owner_name: String,
    owner_email: String,
    owner_phone: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoreRow> for Store {
    type Error = AppError;

    fn try_from(row: StoreRow) -> AppResult<Self> {
        Ok(Store {
            id: row.id,
            business_name: row.business_name,
            business_type: column(&row.business_type)?,
            address: Address {
                street: row.street,
                suburb: row.suburb,
                state: row.state,
                postcode: row.postcode,
            },
            abn: row.abn,
            owner: OwnerContact {
                name: row.owner_name,
                email: row.owner_email,
                phone: row.owner_phone,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: i64,
    store_id: i64,
    status: String,
    products: Json<Vec<String>>,
    suppliers: Json<Vec<Supplier>>,
    employee_band: String,
    operating_hours: String,
    documents: Json<Vec<DocumentRef>>,
    notes: Option<String>,
    review_notes: Option<String>,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = AppError;

    fn try_from(row: ApplicationRow) -> AppResult<Self> {
        Ok(Application {
            id: row.id,
            store_id: row.store_id,
            status: column(&row.status)?,
            products: json_column(row.products),
            suppliers: json_column(row.suppliers),
            employee_band: column(&row.employee_band)?,
            operating_hours: row.operating_hours,
            documents: json_column(row.documents),
            notes: row.notes,
            review_notes: row.review_notes,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct InspectionRow {
    id: i64,
    application_id: i64,
    inspector_id: i64,
    status: String,
    visit_date: Option<DateTime<Utc>>,
    location: Option<Json<GeoPoint>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    decision: Option<String>,
    signature: Option<String>,
    signed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InspectionRow> for Inspection {
    type Error = AppError;

    fn try_from(row: InspectionRow) -> AppResult<Self> {
        Ok(Inspection {
            id: row.id,
            application_id: row.application_id,
            inspector_id: row.inspector_id,
            status: column(&row.status)?,
            visit_date: row.visit_date,
            location: row.location.map(json_column),
            started_at: row.started_at,
            completed_at: row.completed_at,
            notes: row.notes,
            decision: row.decision.as_deref().map(column).transpose()?,
            signature: row.signature,
            signed_at: row.signed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PhotoRow {
    id: i64,
    inspection_id: i64,
    document_id: Uuid,
    photo_type: String,
    caption: Option<String>,
    location: Option<Json<GeoPoint>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PhotoRow> for EvidencePhoto {
    type Error = AppError;

    fn try_from(row: PhotoRow) -> AppResult<Self> {
        Ok(EvidencePhoto {
            id: row.id,
            inspection_id: row.inspection_id,
            document_id: row.document_id,
            photo_type: column(&row.photo_type)?,
            caption: row.caption,
            location: row.location.map(json_column),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CertificateRow {
    id: i64,
    certificate_number: String,
    application_id: i64,
    store_id: i64,
    status: String,
    issued_by: i64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    verification_url: String,
    revoked_at: Option<DateTime<Utc>>,
    revocation_reason: Option<String>,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = AppError;

    fn try_from(row: CertificateRow) -> AppResult<Self> {
        let certificate_number = CertificateNumber::parse(&row.certificate_number)
            .map_err(|e| AppError::Internal(format!("unreadable certificate number: {}", e)))?;
        Ok(Certificate {
            id: row.id,
            certificate_number,
            application_id: row.application_id,
            store_id: row.store_id,
            status: column(&row.status)?,
            issued_by: row.issued_by,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            verification_url: row.verification_url,
            revoked_at: row.revoked_at,
            revocation_reason: row.revocation_reason,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    actor_id: Option<i64>,
    action: String,
    entity_type: String,
    entity_id: i64,
    details: Json<serde_json::Value>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = AppError;

    fn try_from(row: AuditRow) -> AppResult<Self> {
        Ok(AuditLogEntry {
            id: row.id,
            actor_id: row.actor_id,
            action: column(&row.action)?,
            entity_type: column(&row.entity_type)?,
            entity_id: row.entity_id,
            details: json_column(row.details),
            ip_address: row.ip_address,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    name: String,
    email: Option<String>,
    role: String,
    password_hash: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserCredentials {
    type Error = AppError;

    fn try_from(row: UserRow) -> AppResult<Self> {
        Ok(UserCredentials {
            user: User {
                id: row.id,
                username: row.username,
                name: row.name,
                email: row.email,
                role: column(&row.role)?,
                is_active: row.is_active,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        })
    }
}

// ============================================================================
// Queries shared by the pool and transactions
// ============================================================================

async fn fetch_store<'c, E: PgExecutor<'c>>(executor: E, id: i64) -> AppResult<Option<Store>> {
    let sql = format!("SELECT {} FROM stores WHERE id = $1", STORE_COLUMNS);
    sqlx::query_as::<_, StoreRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Store::try_from)
        .transpose()
}

async fn fetch_application<'c, E: PgExecutor<'c>>(
    executor: E,
    id: i64,
    for_update: bool,
) -> AppResult<Option<Application>> {
    let sql = format!(
        "SELECT {} FROM applications WHERE id = $1{}",
        APPLICATION_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, ApplicationRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Application::try_from)
        .transpose()
}

async fn fetch_inspection<'c, E: PgExecutor<'c>>(
    executor: E,
    id: i64,
    for_update: bool,
) -> AppResult<Option<Inspection>> {
    let sql = format!(
        "SELECT {} FROM inspections WHERE id = $1{}",
        INSPECTION_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, InspectionRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Inspection::try_from)
        .transpose()
}

async fn fetch_certificate<'c, E: PgExecutor<'c>>(
    executor: E,
    id: i64,
    for_update: bool,
) -> AppResult<Option<Certificate>> {
    let sql = format!(
        "SELECT {} FROM certificates WHERE id = $1{}",
        CERTIFICATE_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, CertificateRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Certificate::try_from)
        .transpose()
}

async fn insert_audit_row<'c, E: PgExecutor<'c>>(
    executor: E,
    entry: &NewAuditEntry,
) -> AppResult<AuditLogEntry> {
    let sql = format!(
        r#"
        INSERT INTO audit_logs (actor_id, action, entity_type, entity_id, details, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        AUDIT_COLUMNS
    );
    sqlx::query_as::<_, AuditRow>(&sql)
        .bind(entry.actor_id)
        .bind(entry.action.as_str())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id)
        .bind(Json(&entry.details))
        .bind(&entry.ip_address)
        .fetch_one(executor)
        .await?
        .try_into()
}

// ============================================================================
// Repository
// ============================================================================

/// Repository backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_store(&self, id: i64) -> AppResult<Option<Store>> {
        fetch_store(&self.pool, id).await
    }

    async fn get_application(&self, id: i64) -> AppResult<Option<Application>> {
        fetch_application(&self.pool, id, false).await
    }

    async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> AppResult<Vec<Application>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM applications
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            "#,
            APPLICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn get_inspection(&self, id: i64) -> AppResult<Option<Inspection>> {
        fetch_inspection(&self.pool, id, false).await
    }

    async fn list_inspections_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<Inspection>> {
        let sql = format!(
            "SELECT {} FROM inspections WHERE application_id = $1 ORDER BY id",
            INSPECTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(application_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn list_inspections_for_inspector(
        &self,
        inspector_id: i64,
    ) -> AppResult<Vec<Inspection>> {
        let sql = format!(
            "SELECT {} FROM inspections WHERE inspector_id = $1 ORDER BY id",
            INSPECTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(inspector_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn list_photos(&self, inspection_id: i64) -> AppResult<Vec<EvidencePhoto>> {
        let sql = format!(
            "SELECT {} FROM evidence_photos WHERE inspection_id = $1 ORDER BY id",
            PHOTO_COLUMNS
        );
        let rows = sqlx::query_as::<_, PhotoRow>(&sql)
            .bind(inspection_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn get_certificate(&self, id: i64) -> AppResult<Option<Certificate>> {
        fetch_certificate(&self.pool, id, false).await
    }

    async fn find_certificate_by_number(
        &self,
        number: &CertificateNumber,
    ) -> AppResult<Option<Certificate>> {
        let sql = format!(
            "SELECT {} FROM certificates WHERE certificate_number = $1",
            CERTIFICATE_COLUMNS
        );
        sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn list_certificates_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<Certificate>> {
        let sql = format!(
            "SELECT {} FROM certificates WHERE application_id = $1 ORDER BY issued_at, id",
            CERTIFICATE_COLUMNS
        );
        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(application_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn search_certificates_by_store(&self, query: &str) -> AppResult<Option<Certificate>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, CertificateRow>(
            r#"
            SELECT c.id, c.certificate_number, c.application_id, c.store_id, c.status,
                   c.issued_by, c.issued_at, c.expires_at, c.verification_url,
                   c.revoked_at, c.revocation_reason
            FROM certificates c
            JOIN stores s ON s.id = c.store_id
            WHERE s.business_name ILIKE $1
               OR s.street ILIKE $1
               OR s.suburb ILIKE $1
               OR s.state ILIKE $1
               OR s.postcode ILIKE $1
            ORDER BY c.issued_at DESC, c.id DESC
            LIMIT 1
            "#,
        )
        .bind(like_pattern(query))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Certificate::try_from).transpose()
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> AppResult<AuditLogEntry> {
        insert_audit_row(&self.pool, &entry).await
    }

    async fn audit_history(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at, id
            "#,
            AUDIT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(entity_type.as_str())
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<UserCredentials>> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(UserCredentials::try_from)
            .transpose()
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| UserCredentials::try_from(row).map(|c| c.user))
            .transpose()
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (username, name, email, role, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if unique_violation(&e) {
                    AppError::Conflict(format!("username '{}' is already taken", user.username))
                } else {
                    AppError::DatabaseError(e)
                }
            })?;

        Ok(UserCredentials::try_from(row)?.user)
    }

    async fn count_users(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// A PostgreSQL transaction; rolled back by sqlx when dropped uncommitted
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn resolve_store(&mut self, store: &NewStore) -> AppResult<(Store, bool)> {
        let email = shared::normalize_owner_email(&store.owner.email);

        // A concurrent insert of the same email blocks here until it commits,
        // then this statement inserts nothing and the select below finds it
        let sql = format!(
            r#"
            INSERT INTO stores (
                business_name, business_type, street, suburb, state, postcode,
                abn, owner_name, owner_email, owner_phone
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (owner_email) DO NOTHING
            RETURNING {}
            "#,
            STORE_COLUMNS
        );
        let inserted = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(&store.business_name)
            .bind(store.business_type.as_str())
            .bind(&store.address.street)
            .bind(&store.address.suburb)
            .bind(&store.address.state)
            .bind(&store.address.postcode)
            .bind(&store.abn)
            .bind(&store.owner.name)
            .bind(&email)
            .bind(&store.owner.phone)
            .fetch_optional(&mut *self.tx)
            .await?;

        if let Some(row) = inserted {
            return Ok((row.try_into()?, false));
        }

        let sql = format!(
            "SELECT {} FROM stores WHERE owner_email = $1 FOR UPDATE",
            STORE_COLUMNS
        );
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(&email)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("store for {} was removed concurrently", email))
            })?;
        Ok((row.try_into()?, true))
    }

    async fn get_store(&mut self, id: i64) -> AppResult<Option<Store>> {
        fetch_store(&mut *self.tx, id).await
    }

    async fn insert_application(
        &mut self,
        application: &NewApplication,
    ) -> AppResult<Application> {
        let sql = format!(
            r#"
            INSERT INTO applications (
                store_id, status, products, suppliers, employee_band,
                operating_hours, documents, notes, payment_reference
            )
            VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        );
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(application.store_id)
            .bind(Json(&application.products))
            .bind(Json(&application.suppliers))
            .bind(application.employee_band.as_str())
            .bind(&application.operating_hours)
            .bind(Json(&application.documents))
            .bind(&application.notes)
            .bind(&application.payment_reference)
            .fetch_one(&mut *self.tx)
            .await?
            .try_into()
    }

    async fn lock_application(&mut self, id: i64) -> AppResult<Option<Application>> {
        fetch_application(&mut *self.tx, id, true).await
    }

    async fn update_application_status(
        &mut self,
        id: i64,
        expected: ApplicationStatus,
        next: ApplicationStatus,
        review_notes: Option<&str>,
    ) -> AppResult<Application> {
        let sql = format!(
            r#"
            UPDATE applications
            SET status = $3,
                review_notes = COALESCE($4, review_notes),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(review_notes)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::Conflict(format!(
                "application {} changed status concurrently",
                id
            ))),
        }
    }

    async fn has_approved_inspection(&mut self, application_id: i64) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM inspections
                WHERE application_id = $1 AND status = 'completed' AND decision = 'approved'
            )
            "#,
        )
        .bind(application_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_inspection(&mut self, inspection: &NewInspection) -> AppResult<Inspection> {
        let sql = format!(
            r#"
            INSERT INTO inspections (application_id, inspector_id, status, visit_date, notes)
            VALUES ($1, $2, 'scheduled', $3, $4)
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        );
        sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(inspection.application_id)
            .bind(inspection.inspector_id)
            .bind(inspection.visit_date)
            .bind(&inspection.notes)
            .fetch_one(&mut *self.tx)
            .await?
            .try_into()
    }

    async fn lock_inspection(&mut self, id: i64) -> AppResult<Option<Inspection>> {
        fetch_inspection(&mut *self.tx, id, true).await
    }

    async fn save_inspection(
        &mut self,
        inspection: &Inspection,
        expected: InspectionStatus,
    ) -> AppResult<Inspection> {
        let sql = format!(
            r#"
            UPDATE inspections
            SET status = $3,
                visit_date = $4,
                location = $5,
                started_at = $6,
                completed_at = $7,
                notes = $8,
                decision = $9,
                signature = $10,
                signed_at = $11,
                updated_at = $12
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        );
        let row = sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(inspection.id)
            .bind(expected.as_str())
            .bind(inspection.status.as_str())
            .bind(inspection.visit_date)
            .bind(inspection.location.as_ref().map(Json))
            .bind(inspection.started_at)
            .bind(inspection.completed_at)
            .bind(&inspection.notes)
            .bind(inspection.decision.map(|d| d.as_str()))
            .bind(&inspection.signature)
            .bind(inspection.signed_at)
            .bind(inspection.updated_at)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::Conflict(format!(
                "inspection {} changed status concurrently",
                inspection.id
            ))),
        }
    }

    async fn insert_photo(&mut self, photo: &NewEvidencePhoto) -> AppResult<EvidencePhoto> {
        let sql = format!(
            r#"
            INSERT INTO evidence_photos (inspection_id, document_id, photo_type, caption, location)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            PHOTO_COLUMNS
        );
        sqlx::query_as::<_, PhotoRow>(&sql)
            .bind(photo.inspection_id)
            .bind(photo.document_id)
            .bind(photo.photo_type.as_str())
            .bind(&photo.caption)
            .bind(photo.location.as_ref().map(Json))
            .fetch_one(&mut *self.tx)
            .await?
            .try_into()
    }

    async fn insert_certificate(
        &mut self,
        certificate: &NewCertificate,
    ) -> AppResult<Option<Certificate>> {
        let sql = format!(
            r#"
            INSERT INTO certificates (
                certificate_number, application_id, store_id, status,
                issued_by, issued_at, expires_at, verification_url
            )
            VALUES ($1, $2, $3, 'active', $4, $5, $6, $7)
            ON CONFLICT (certificate_number) DO NOTHING
            RETURNING {}
            "#,
            CERTIFICATE_COLUMNS
        );
        sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(certificate.certificate_number.as_str())
            .bind(certificate.application_id)
            .bind(certificate.store_id)
            .bind(certificate.issued_by)
            .bind(certificate.issued_at)
            .bind(certificate.expires_at)
            .bind(&certificate.verification_url)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn lock_certificate(&mut self, id: i64) -> AppResult<Option<Certificate>> {
        fetch_certificate(&mut *self.tx, id, true).await
    }

    async fn update_certificate_status(
        &mut self,
        id: i64,
        expected: CertificateStatus,
        next: CertificateStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<Certificate> {
        let sql = format!(
            r#"
            UPDATE certificates
            SET status = $3,
                revoked_at = CASE WHEN $3 = 'revoked' THEN $5 ELSE revoked_at END,
                revocation_reason = CASE WHEN $3 = 'revoked' THEN $4 ELSE revocation_reason END
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            CERTIFICATE_COLUMNS
        );
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(reason)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::Conflict(format!(
                "certificate {} changed status concurrently",
                id
            ))),
        }
    }

    async fn expire_certificates(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Certificate>> {
        let sql = format!(
            r#"
            UPDATE certificates
            SET status = 'expired'
            WHERE status = 'active' AND expires_at < $1
            RETURNING {}
            "#,
            CERTIFICATE_COLUMNS
        );
        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        collect(rows)
    }

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> AppResult<AuditLogEntry> {
        insert_audit_row(&mut *self.tx, entry).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
