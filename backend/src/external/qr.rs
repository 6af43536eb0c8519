//! QR image rendering
//!
//! Rendering is delegated to an image service; this module only builds the
//! URL that returns the image for a payload.

use reqwest::Url;

use crate::error::{AppError, AppResult};

pub trait QrRenderer: Send + Sync {
    /// Image URL (or data URI) encoding `payload`
    fn render(&self, payload: &str) -> AppResult<String>;
}

/// Renderer for services taking `?data=<payload>&size=<w>x<h>`
#[derive(Debug, Clone)]
pub struct UrlQrRenderer {
    base: Url,
    size_px: u32,
}

impl UrlQrRenderer {
    pub fn new(base: &str) -> AppResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| AppError::Configuration(format!("Invalid QR renderer URL: {}", e)))?;
        Ok(Self { base, size_px: 300 })
    }

    pub fn with_size(mut self, size_px: u32) -> Self {
        self.size_px = size_px;
        self
    }
}

impl QrRenderer for UrlQrRenderer {
    fn render(&self, payload: &str) -> AppResult<String> {
        if payload.is_empty() {
            return Err(AppError::validation("payload", "QR payload is empty"));
        }
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("data", payload)
            .append_pair("size", &format!("{0}x{0}", self.size_px));
        Ok(url.into())
    }
}
