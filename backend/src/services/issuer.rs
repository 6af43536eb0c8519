//! Certificate issuance
//!
//! Numbers are `HAL-<year>-<4 digits>` with a random suffix. The 4-digit space
//! is small, so the insert is retried with a fresh suffix whenever the store
//! reports the number as taken.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use shared::{
    expiry_for, issue_year, Application, ApplicationStatus, Certificate, CertificateNumber,
    NewCertificate, Store,
};

use crate::config::CertificateConfig;
use crate::error::{AppError, AppResult};
use crate::repository::UnitOfWork;

/// Supplies candidate 4-digit suffixes
pub trait CertificateNumberSource: Send + Sync {
    fn next_suffix(&self) -> AppResult<u16>;
}

/// Uniformly random suffixes in 0000..=9999
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNumberSource;

impl CertificateNumberSource for RandomNumberSource {
    fn next_suffix(&self) -> AppResult<u16> {
        Ok(rand::thread_rng().gen_range(0..=9999))
    }
}

#[derive(Clone)]
pub struct CertificateIssuer {
    numbers: Arc<dyn CertificateNumberSource>,
    verification_base_url: String,
    validity_days: i64,
    max_attempts: u32,
}

impl CertificateIssuer {
    pub fn new(config: &CertificateConfig, numbers: Arc<dyn CertificateNumberSource>) -> Self {
        Self {
            numbers,
            verification_base_url: config.verification_base_url.trim_end_matches('/').to_string(),
            validity_days: config.validity_days,
            max_attempts: config.max_number_attempts.max(1),
        }
    }

    /// Public URL a QR code for this certificate should encode
    pub fn verification_url(&self, number: &CertificateNumber) -> String {
        format!("{}/verify/{}", self.verification_base_url, number)
    }

    /// Insert a certificate for an approved application inside `uow`
    pub async fn issue(
        &self,
        uow: &mut dyn UnitOfWork,
        store: &Store,
        application: &Application,
        issued_by: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Certificate> {
        if application.status != ApplicationStatus::Approved {
            return Err(AppError::CertificateIssuance(format!(
                "application {} is {}, not approved",
                application.id, application.status
            )));
        }

        let year = issue_year(now);
        let expires_at = expiry_for(now, self.validity_days);

        for attempt in 1..=self.max_attempts {
            let number = CertificateNumber::new(year, self.numbers.next_suffix()?)
                .map_err(|e| AppError::CertificateIssuance(e.to_string()))?;

            let candidate = NewCertificate {
                verification_url: self.verification_url(&number),
                certificate_number: number,
                application_id: application.id,
                store_id: store.id,
                issued_by,
                issued_at: now,
                expires_at,
            };

            if let Some(certificate) = uow.insert_certificate(&candidate).await? {
                tracing::info!(
                    certificate_number = %certificate.certificate_number,
                    application_id = application.id,
                    attempt,
                    "Certificate issued"
                );
                return Ok(certificate);
            }

            tracing::debug!(
                certificate_number = %candidate.certificate_number,
                attempt,
                "Certificate number already taken; retrying"
            );
        }

        Err(AppError::CertificateIssuance(format!(
            "no unused certificate number after {} attempts",
            self.max_attempts
        )))
    }
}
