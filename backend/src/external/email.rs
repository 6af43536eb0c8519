//! Email delivery
//!
//! The workflow only knows [`NotificationGateway::send`]. Message wording and
//! timeouts live in `services::notification`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::NotificationConfig;
use crate::error::{AppError, AppResult};

/// One outbound email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers a message to one address
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> AppResult<()>;
}

/// Build the gateway selected by configuration
pub fn gateway_from_config(config: &NotificationConfig) -> AppResult<Box<dyn NotificationGateway>> {
    match &config.provider_url {
        Some(url) => Ok(Box::new(HttpEmailGateway::new(
            url.clone(),
            config.api_key.clone(),
            config.from_address.clone(),
            Duration::from_millis(config.timeout_ms),
        )?)),
        None => {
            tracing::info!("No email provider configured; notifications will only be logged");
            Ok(Box::new(LogOnlyGateway))
        }
    }
}

/// Email API client posting JSON to a transactional email provider
#[derive(Clone)]
pub struct HttpEmailGateway {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpEmailGateway {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from_address: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            from_address,
        })
    }
}

#[async_trait]
impl NotificationGateway for HttpEmailGateway {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        let mut request = self.client.post(&self.endpoint).json(&SendEmailRequest {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::dependency("email", format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::dependency(
                "email",
                format!("API returned {}: {}", status, body),
            ));
        }

        Ok(())
    }
}

/// Gateway for environments without an email provider
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyGateway;

#[async_trait]
impl NotificationGateway for LogOnlyGateway {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email delivery skipped (no provider configured)"
        );
        Ok(())
    }
}
