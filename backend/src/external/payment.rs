//! Payment provider client used to confirm application fees

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};

/// Outcome of a payment lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentVerification {
    pub succeeded: bool,
}

/// Confirms that a payment reference was settled
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, reference: &str) -> AppResult<PaymentVerification>;
}

pub fn verifier_from_config(config: &PaymentConfig) -> AppResult<Box<dyn PaymentVerifier>> {
    match &config.provider_url {
        Some(url) => Ok(Box::new(HttpPaymentVerifier::new(
            url,
            config.api_key.clone(),
            Duration::from_millis(config.timeout_ms),
        )?)),
        None => Ok(Box::new(UnconfiguredPaymentVerifier)),
    }
}

/// Looks up `GET {provider}/payments/{reference}`
#[derive(Clone)]
pub struct HttpPaymentVerifier {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    status: String,
}

impl HttpPaymentVerifier {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Configuration(format!("Invalid payment provider URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration(
                "Payment provider URL cannot be used as a base".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn payment_url(&self, reference: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["payments", reference]);
        }
        url
    }
}

#[async_trait]
impl PaymentVerifier for HttpPaymentVerifier {
    async fn verify(&self, reference: &str) -> AppResult<PaymentVerification> {
        let mut request = self.client.get(self.payment_url(reference));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::dependency("payments", format!("Request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PaymentVerification { succeeded: false });
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::dependency(
                "payments",
                format!("API returned {}", status),
            ));
        }

        let body: PaymentStatusResponse = response.json().await.map_err(|e| {
            AppError::dependency("payments", format!("Failed to parse response: {}", e))
        })?;

        Ok(PaymentVerification {
            succeeded: body.status.eq_ignore_ascii_case("succeeded"),
        })
    }
}

/// Used when no provider is configured; every reference is unverifiable
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredPaymentVerifier;

#[async_trait]
impl PaymentVerifier for UnconfiguredPaymentVerifier {
    async fn verify(&self, _reference: &str) -> AppResult<PaymentVerification> {
        Err(AppError::dependency(
            "payments",
            "no payment provider is configured",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_url_escapes_reference() {
        let verifier = HttpPaymentVerifier::new(
            "https://pay.example.com/api/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            verifier.payment_url("pi_123/../x").as_str(),
            "https://pay.example.com/api/payments/pi_123%2F..%2Fx"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_verifier_fails_closed() {
        let err = UnconfiguredPaymentVerifier.verify("pi_1").await.unwrap_err();
        assert!(matches!(err, AppError::Dependency { service: "payments", .. }));
    }
}
