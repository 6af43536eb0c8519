//! Certificate registry and public verification
//!
//! Expiry is derived on every read. The persisted status only becomes
//! `expired` through [`CertificateRegistry::expire_sweep`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shared::{
    require_text, Actor, AuditAction, Certificate, CertificateNumber, CertificateStatus,
    EntityType, Store,
};

use crate::error::{AppError, AppResult};
use crate::repository::Repository;
use crate::services::audit::{audit_entry, AuditRecorder};
use crate::services::notification::{self, Notifier};

/// A certificate as seen at `checked_at`
#[derive(Debug, Clone, Serialize)]
pub struct CertificateView {
    /// Active and not past expiry
    pub valid: bool,
    /// Status with expiry applied; the stored status is on `certificate`
    pub status: CertificateStatus,
    pub is_expired: bool,
    pub days_until_expiry: i64,
    pub certificate: Certificate,
    pub store: Store,
    pub checked_at: DateTime<Utc>,
}

impl CertificateView {
    pub fn new(certificate: Certificate, store: Store, now: DateTime<Utc>) -> Self {
        Self {
            valid: certificate.is_valid(now),
            status: certificate.effective_status(now),
            is_expired: certificate.is_expired(now),
            days_until_expiry: certificate.days_until_expiry(now),
            certificate,
            store,
            checked_at: now,
        }
    }
}

#[derive(Clone)]
pub struct CertificateRegistry {
    repo: Arc<dyn Repository>,
    notifier: Notifier,
    audit: AuditRecorder,
}

impl CertificateRegistry {
    pub fn new(repo: Arc<dyn Repository>, notifier: Notifier) -> Self {
        Self {
            audit: AuditRecorder::new(repo.clone()),
            repo,
            notifier,
        }
    }

    async fn view(&self, certificate: Certificate, now: DateTime<Utc>) -> AppResult<CertificateView> {
        let store = self
            .repo
            .get_store(certificate.store_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Store".to_string()))?;
        Ok(CertificateView::new(certificate, store, now))
    }

    /// Public lookup by certificate number
    pub async fn get_by_number(&self, number: &str, now: DateTime<Utc>) -> AppResult<CertificateView> {
        let number = CertificateNumber::parse(number)
            .map_err(|_| AppError::NotFound("Certificate".to_string()))?;
        let certificate = self
            .repo
            .find_certificate_by_number(&number)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate".to_string()))?;
        self.view(certificate, now).await
    }

    pub async fn get(&self, certificate_id: i64, now: DateTime<Utc>) -> AppResult<CertificateView> {
        let certificate = self
            .repo
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate".to_string()))?;
        self.view(certificate, now).await
    }

    /// Exact certificate number first, then the most recently issued
    /// certificate of a store whose name or address matches
    pub async fn search(&self, query: &str, now: DateTime<Utc>) -> AppResult<Option<CertificateView>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Ok(number) = CertificateNumber::parse(query) {
            if let Some(certificate) = self.repo.find_certificate_by_number(&number).await? {
                return self.view(certificate, now).await.map(Some);
            }
        }

        match self.repo.search_certificates_by_store(query).await? {
            Some(certificate) => self.view(certificate, now).await.map(Some),
            None => Ok(None),
        }
    }

    /// Revoke a certificate; a revoked certificate never becomes active again
    pub async fn revoke(
        &self,
        certificate_id: i64,
        reason: &str,
        actor: &Actor,
    ) -> AppResult<Certificate> {
        require_text("reason", reason)?;
        let reason = reason.trim();
        let now = Utc::now();

        let mut uow = self.repo.begin().await?;
        let current = uow
            .lock_certificate(certificate_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate".to_string()))?;
        if current.status == CertificateStatus::Revoked {
            return Err(AppError::AlreadyRevoked(current.certificate_number.to_string()));
        }

        let certificate = uow
            .update_certificate_status(
                certificate_id,
                current.status,
                CertificateStatus::Revoked,
                Some(reason),
                now,
            )
            .await?;
        let store = uow
            .get_store(certificate.store_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Store".to_string()))?;
        uow.commit().await?;

        tracing::info!(
            certificate_id,
            certificate_number = %certificate.certificate_number,
            actor_id = actor.user_id,
            "Certificate revoked"
        );

        self.audit
            .record(audit_entry(
                Some(actor),
                AuditAction::CertificateRevoked,
                EntityType::Certificate,
                certificate.id,
                json!({
                    "certificate_number": certificate.certificate_number.as_str(),
                    "previous_status": current.status,
                    "reason": reason,
                }),
            ))
            .await;

        self.notifier
            .send_best_effort(&notification::certificate_revoked(&store, &certificate, reason))
            .await;

        Ok(certificate)
    }

    /// Persist `expired` for every active certificate past its expiry
    pub async fn expire_sweep(&self, actor: Option<&Actor>, now: DateTime<Utc>) -> AppResult<Vec<Certificate>> {
        let mut uow = self.repo.begin().await?;
        let expired = uow.expire_certificates(now).await?;
        uow.commit().await?;

        tracing::info!(count = expired.len(), "Expiry sweep finished");

        for certificate in &expired {
            self.audit
                .record(audit_entry(
                    actor,
                    AuditAction::CertificateExpired,
                    EntityType::Certificate,
                    certificate.id,
                    json!({
                        "certificate_number": certificate.certificate_number.as_str(),
                        "expires_at": certificate.expires_at,
                    }),
                ))
                .await;
        }

        Ok(expired)
    }

    pub async fn list_for_application(&self, application_id: i64) -> AppResult<Vec<Certificate>> {
        self.repo
            .list_certificates_for_application(application_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shared::{Address, BusinessType, OwnerContact};

    fn store() -> Store {
        let now = Utc::now();
        Store {
            id: 1,
            business_name: "Test Cafe".to_string(),
            business_type: BusinessType::Cafe,
            address: Address {
                street: "1 Collins St".to_string(),
                suburb: "Melbourne".to_string(),
                state: "VIC".to_string(),
                postcode: "3000".to_string(),
            },
            abn: "12345678901".to_string(),
            owner: OwnerContact {
                name: "Owner".to_string(),
                email: "owner@testcafe.com.au".to_string(),
                phone: "0412345678".to_string(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn certificate(issued_at: DateTime<Utc>, status: CertificateStatus) -> Certificate {
        Certificate {
            id: 1,
            certificate_number: CertificateNumber::new(2025, 1).unwrap(),
            application_id: 1,
            store_id: 1,
            status,
            issued_by: 7,
            issued_at,
            expires_at: shared::expiry_for(issued_at, 365),
            verification_url: "https://halal.example.com/verify/HAL-2025-0001".to_string(),
            revoked_at: None,
            revocation_reason: None,
        }
    }

    #[test]
    fn test_view_derives_expiry_without_touching_stored_status() {
        let issued = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let later = issued + Duration::days(400);
        let view = CertificateView::new(certificate(issued, CertificateStatus::Active), store(), later);

        assert!(!view.valid);
        assert!(view.is_expired);
        assert_eq!(view.status, CertificateStatus::Expired);
        assert_eq!(view.certificate.status, CertificateStatus::Active);
        assert_eq!(view.days_until_expiry, -35);
    }

    #[test]
    fn test_revoked_view_is_invalid_before_expiry() {
        let issued = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let view = CertificateView::new(
            certificate(issued, CertificateStatus::Revoked),
            store(),
            issued + Duration::days(10),
        );
        assert!(!view.valid);
        assert_eq!(view.status, CertificateStatus::Revoked);
    }
}
