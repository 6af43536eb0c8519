//! In-process repository
//!
//! Serializable by construction: a unit of work holds the state lock for its
//! whole lifetime and mutates a private copy that replaces the shared state
//! on commit. Used by the test suite and by `database.url = "memory"`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    normalize_owner_email, Application, ApplicationStatus, AuditLogEntry, Certificate,
    CertificateNumber, CertificateStatus, Decision, EntityType, EvidencePhoto, Inspection,
    InspectionStatus, NewApplication, NewAuditEntry, NewCertificate, NewEvidencePhoto,
    NewInspection, NewStore, Store, User,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{NewUser, Repository, UnitOfWork, UserCredentials};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct Sequences {
    store: i64,
    application: i64,
    inspection: i64,
    photo: i64,
    certificate: i64,
    user: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    seq: Sequences,
    stores: BTreeMap<i64, Store>,
    applications: BTreeMap<i64, Application>,
    inspections: BTreeMap<i64, Inspection>,
    photos: BTreeMap<i64, EvidencePhoto>,
    certificates: BTreeMap<i64, Certificate>,
    users: BTreeMap<i64, UserCredentials>,
}

#[derive(Debug, Default)]
struct AuditTable {
    next_id: i64,
    entries: Vec<AuditLogEntry>,
}

impl AuditTable {
    fn push(&mut self, entry: NewAuditEntry) -> AuditLogEntry {
        self.next_id += 1;
        let stored = AuditLogEntry {
            id: self.next_id,
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            ip_address: entry.ip_address,
            created_at: Utc::now(),
        };
        self.entries.push(stored.clone());
        stored
    }
}

/// Repository backed by process memory
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    audit: Arc<Mutex<AuditTable>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given accounts under their own ids
    pub fn with_users(users: impl IntoIterator<Item = UserCredentials>) -> Self {
        let mut state = MemoryState::default();
        for credentials in users {
            state.seq.user = state.seq.user.max(credentials.user.id);
            state.users.insert(credentials.user.id, credentials);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            audit: Arc::default(),
        }
    }

    /// Every certificate, in issue order
    pub async fn all_certificates(&self) -> Vec<Certificate> {
        self.state.lock().await.certificates.values().cloned().collect()
    }
}

fn store_matches(store: &Store, needle: &str) -> bool {
    let haystacks = [
        &store.business_name,
        &store.address.street,
        &store.address.suburb,
        &store.address.state,
        &store.address.postcode,
    ];
    haystacks
        .iter()
        .any(|h| h.to_lowercase().contains(needle))
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            audit: self.audit.clone(),
            pending_audit: Vec::new(),
        }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_store(&self, id: i64) -> AppResult<Option<Store>> {
        Ok(self.state.lock().await.stores.get(&id).cloned())
    }

    async fn get_application(&self, id: i64) -> AppResult<Option<Application>> {
        Ok(self.state.lock().await.applications.get(&id).cloned())
    }

    async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
    ) -> AppResult<Vec<Application>> {
        let state = self.state.lock().await;
        let mut applications: Vec<Application> = state
            .applications
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(applications)
    }

    async fn get_inspection(&self, id: i64) -> AppResult<Option<Inspection>> {
        Ok(self.state.lock().await.inspections.get(&id).cloned())
    }

    async fn list_inspections_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<Inspection>> {
        let state = self.state.lock().await;
        Ok(state
            .inspections
            .values()
            .filter(|i| i.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn list_inspections_for_inspector(
        &self,
        inspector_id: i64,
    ) -> AppResult<Vec<Inspection>> {
        let state = self.state.lock().await;
        Ok(state
            .inspections
            .values()
            .filter(|i| i.inspector_id == inspector_id)
            .cloned()
            .collect())
    }

    async fn list_photos(&self, inspection_id: i64) -> AppResult<Vec<EvidencePhoto>> {
        let state = self.state.lock().await;
        Ok(state
            .photos
            .values()
            .filter(|p| p.inspection_id == inspection_id)
            .cloned()
            .collect())
    }

    async fn get_certificate(&self, id: i64) -> AppResult<Option<Certificate>> {
        Ok(self.state.lock().await.certificates.get(&id).cloned())
    }

    async fn find_certificate_by_number(
        &self,
        number: &CertificateNumber,
    ) -> AppResult<Option<Certificate>> {
        let state = self.state.lock().await;
        Ok(state
            .certificates
            .values()
            .find(|c| &c.certificate_number == number)
            .cloned())
    }

    async fn list_certificates_for_application(
        &self,
        application_id: i64,
    ) -> AppResult<Vec<Certificate>> {
        let state = self.state.lock().await;
        Ok(state
            .certificates
            .values()
            .filter(|c| c.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn search_certificates_by_store(&self, query: &str) -> AppResult<Option<Certificate>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let state = self.state.lock().await;
        Ok(state
            .certificates
            .values()
            .filter(|c| {
                state
                    .stores
                    .get(&c.store_id)
                    .map_or(false, |s| store_matches(s, &needle))
            })
            .max_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> AppResult<AuditLogEntry> {
        Ok(self.audit.lock().await.push(entry))
    }

    async fn audit_history(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        let audit = self.audit.lock().await;
        Ok(audit
            .entries
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<UserCredentials>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.user.username == username)
            .cloned())
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).map(|u| u.user.clone()))
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.user.username == user.username) {
            return Err(AppError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        let id = next(&mut state.seq.user);
        let created = User {
            id,
            username: user.username,
            name: user.name,
            email: user.email,
            role: user.role,
            is_active: true,
            created_at: Utc::now(),
        };
        state.users.insert(
            id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn count_users(&self) -> AppResult<i64> {
        Ok(self.state.lock().await.users.len() as i64)
    }
}

/// Transaction over [`MemoryRepository`]
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    audit: Arc<Mutex<AuditTable>>,
    pending_audit: Vec<AuditLogEntry>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn resolve_store(&mut self, store: &NewStore) -> AppResult<(Store, bool)> {
        let email = normalize_owner_email(&store.owner.email);
        if let Some(existing) = self.working.stores.values().find(|s| s.owner.email == email) {
            return Ok((existing.clone(), true));
        }
        let now = Utc::now();
        let id = next(&mut self.working.seq.store);
        let mut owner = store.owner.clone();
        owner.email = email;
        let created = Store {
            id,
            business_name: store.business_name.clone(),
            business_type: store.business_type,
            address: store.address.clone(),
            abn: store.abn.clone(),
            owner,
            created_at: now,
            updated_at: now,
        };
        self.working.stores.insert(id, created.clone());
        Ok((created, false))
    }

    async fn get_store(&mut self, id: i64) -> AppResult<Option<Store>> {
        Ok(self.working.stores.get(&id).cloned())
    }

    async fn insert_application(
        &mut self,
        application: &NewApplication,
    ) -> AppResult<Application> {
        if !self.working.stores.contains_key(&application.store_id) {
            return Err(AppError::NotFound("Store".to_string()));
        }
        let now = Utc::now();
        let id = next(&mut self.working.seq.application);
        let created = Application {
            id,
            store_id: application.store_id,
            status: ApplicationStatus::Pending,
            products: application.products.clone(),
            suppliers: application.suppliers.clone(),
            employee_band: application.employee_band,
            operating_hours: application.operating_hours.clone(),
            documents: application.documents.clone(),
            notes: application.notes.clone(),
            review_notes: None,
            payment_reference: application.payment_reference.clone(),
            created_at: now,
            updated_at: now,
        };
        self.working.applications.insert(id, created.clone());
        Ok(created)
    }

    async fn lock_application(&mut self, id: i64) -> AppResult<Option<Application>> {
        Ok(self.working.applications.get(&id).cloned())
    }

    async fn update_application_status(
        &mut self,
        id: i64,
        expected: ApplicationStatus,
        next_status: ApplicationStatus,
        review_notes: Option<&str>,
    ) -> AppResult<Application> {
        let application = self
            .working
            .applications
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Application".to_string()))?;
        if application.status != expected {
            return Err(AppError::Conflict(format!(
                "application {} changed status concurrently",
                id
            )));
        }
        application.status = next_status;
        if let Some(notes) = review_notes {
            application.review_notes = Some(notes.to_string());
        }
        application.updated_at = Utc::now();
        Ok(application.clone())
    }

    async fn has_approved_inspection(&mut self, application_id: i64) -> AppResult<bool> {
        Ok(self.working.inspections.values().any(|i| {
            i.application_id == application_id
                && i.status == InspectionStatus::Completed
                && i.decision == Some(Decision::Approved)
        }))
    }

    async fn insert_inspection(&mut self, inspection: &NewInspection) -> AppResult<Inspection> {
        if !self
            .working
            .applications
            .contains_key(&inspection.application_id)
        {
            return Err(AppError::NotFound("Application".to_string()));
        }
        let now = Utc::now();
        let id = next(&mut self.working.seq.inspection);
        let created = Inspection {
            id,
            application_id: inspection.application_id,
            inspector_id: inspection.inspector_id,
            status: InspectionStatus::Scheduled,
            visit_date: inspection.visit_date,
            location: None,
            started_at: None,
            completed_at: None,
            notes: inspection.notes.clone(),
            decision: None,
            signature: None,
            signed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.inspections.insert(id, created.clone());
        Ok(created)
    }

    async fn lock_inspection(&mut self, id: i64) -> AppResult<Option<Inspection>> {
        Ok(self.working.inspections.get(&id).cloned())
    }

    async fn save_inspection(
        &mut self,
        inspection: &Inspection,
        expected: InspectionStatus,
    ) -> AppResult<Inspection> {
        let stored = self
            .working
            .inspections
            .get_mut(&inspection.id)
            .ok_or_else(|| AppError::NotFound("Inspection".to_string()))?;
        if stored.status != expected {
            return Err(AppError::Conflict(format!(
                "inspection {} changed status concurrently",
                inspection.id
            )));
        }
        *stored = inspection.clone();
        Ok(stored.clone())
    }

    async fn insert_photo(&mut self, photo: &NewEvidencePhoto) -> AppResult<EvidencePhoto> {
        if !self.working.inspections.contains_key(&photo.inspection_id) {
            return Err(AppError::NotFound("Inspection".to_string()));
        }
        let id = next(&mut self.working.seq.photo);
        let created = EvidencePhoto {
            id,
            inspection_id: photo.inspection_id,
            document_id: photo.document_id,
            photo_type: photo.photo_type,
            caption: photo.caption.clone(),
            location: photo.location.clone(),
            created_at: Utc::now(),
        };
        self.working.photos.insert(id, created.clone());
        Ok(created)
    }

    async fn insert_certificate(
        &mut self,
        certificate: &NewCertificate,
    ) -> AppResult<Option<Certificate>> {
        let taken = self
            .working
            .certificates
            .values()
            .any(|c| c.certificate_number == certificate.certificate_number);
        if taken {
            return Ok(None);
        }
        let id = next(&mut self.working.seq.certificate);
        let created = Certificate {
            id,
            certificate_number: certificate.certificate_number.clone(),
            application_id: certificate.application_id,
            store_id: certificate.store_id,
            status: CertificateStatus::Active,
            issued_by: certificate.issued_by,
            issued_at: certificate.issued_at,
            expires_at: certificate.expires_at,
            verification_url: certificate.verification_url.clone(),
            revoked_at: None,
            revocation_reason: None,
        };
        self.working.certificates.insert(id, created.clone());
        Ok(Some(created))
    }

    async fn lock_certificate(&mut self, id: i64) -> AppResult<Option<Certificate>> {
        Ok(self.working.certificates.get(&id).cloned())
    }

    async fn update_certificate_status(
        &mut self,
        id: i64,
        expected: CertificateStatus,
        next_status: CertificateStatus,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<Certificate> {
        let certificate = self
            .working
            .certificates
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Certificate".to_string()))?;
        if certificate.status != expected {
            return Err(AppError::Conflict(format!(
                "certificate {} changed status concurrently",
                id
            )));
        }
        certificate.status = next_status;
        if next_status == CertificateStatus::Revoked {
            certificate.revoked_at = Some(at);
            certificate.revocation_reason = reason.map(str::to_string);
        }
        Ok(certificate.clone())
    }

    async fn expire_certificates(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Certificate>> {
        let mut expired = Vec::new();
        for certificate in self.working.certificates.values_mut() {
            if certificate.status == CertificateStatus::Active && certificate.is_expired(now) {
                certificate.status = CertificateStatus::Expired;
                expired.push(certificate.clone());
            }
        }
        Ok(expired)
    }

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> AppResult<AuditLogEntry> {
        // Ids are assigned on commit; a provisional copy is returned now
        let provisional = AuditLogEntry {
            id: 0,
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details.clone(),
            ip_address: entry.ip_address.clone(),
            created_at: Utc::now(),
        };
        self.pending_audit.push(provisional.clone());
        Ok(provisional)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork {
            mut guard,
            working,
            audit,
            pending_audit,
        } = *self;
        if !pending_audit.is_empty() {
            let mut audit = audit.lock().await;
            for entry in pending_audit {
                audit.push(NewAuditEntry {
                    actor_id: entry.actor_id,
                    action: entry.action,
                    entity_type: entry.entity_type,
                    entity_id: entry.entity_id,
                    details: entry.details,
                    ip_address: entry.ip_address,
                });
            }
        }
        *guard = working;
        Ok(())
    }
}
