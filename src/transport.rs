//! HTTP transport for the studio API.
//!
//! One request per call and no retries: retry policy belongs to the user.
//! Every request carries the CSRF header, even when the token is empty.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::{StatusCode, Url};
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error_taxonomy::SessionError;
use crate::logging;
use crate::messages::retry_after_secs;
use crate::models::{
    AssistRequest, AssistResponse, ErrorBody, GenerateRequest, GeneratedImage, UploadedRef,
};
use crate::slots::LocalFile;

pub const CSRF_HEADER: &str = "X-CSRFToken";

// === Trait ===

/// The network boundary the controller talks to.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn upload(&self, file: LocalFile, correlation: String)
    -> Result<UploadedRef, SessionError>;

    async fn assist(&self, request: AssistRequest) -> Result<AssistResponse, SessionError>;

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedImage, SessionError>;

    async fn download(&self, url: String) -> Result<Bytes, SessionError>;
}

// === HttpTransport ===

#[derive(Debug, Clone)]
#[must_use]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
    csrf_token: String,
}

impl HttpTransport {
    /// Build a transport with an empty CSRF token.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid studio base URL: {base_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("Studio base URL must be http or https: {base_url}");
        }
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http_client,
            base_url,
            csrf_token: String::new(),
        })
    }

    /// Build a transport from configuration and resolve its CSRF token.
    ///
    /// A configured token wins. Otherwise the token is scraped from the
    /// page's `csrf-token` meta tag when scraping is enabled. A failed
    /// scrape leaves the token empty; requests are still sent.
    pub async fn connect(config: &Config) -> Result<Self> {
        let base_url = config.base_url();
        let mut transport = Self::new(&base_url, config.request_timeout())?;
        logging::info(format!("Studio base URL: {base_url}"));

        if let Some(token) = config.csrf_token() {
            transport.csrf_token = token;
        } else if config.scrape_csrf() {
            match transport.fetch_csrf_token().await {
                Ok(Some(token)) => transport.csrf_token = token,
                Ok(None) => logging::warn("No csrf-token meta tag on the studio page"),
                Err(err) => logging::warn(format!("Failed to fetch CSRF token: {err}")),
            }
        }
        Ok(transport)
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = token.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Read the token embedded in the studio page.
    pub async fn fetch_csrf_token(&self) -> Result<Option<String>, SessionError> {
        let response = self.http_client.get(self.resolve("/")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Request {
                status: status.as_u16(),
                message: None,
            });
        }
        let page = response.text().await?;
        Ok(extract_csrf_token(&page))
    }

    /// Resolve a URL the way the studio page would: absolute URLs pass
    /// through, `/path` replaces the base path, `//host/path` keeps the
    /// base scheme.
    pub fn resolve(&self, url: &str) -> Result<Url, SessionError> {
        self.base_url
            .join(url)
            .map_err(|err| SessionError::InvalidResponse(format!("Bad URL {url:?}: {err}")))
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder, SessionError> {
        Ok(self
            .http_client
            .post(self.resolve(path)?)
            .header(CSRF_HEADER, &self.csrf_token))
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn upload(
        &self,
        file: LocalFile,
        correlation: String,
    ) -> Result<UploadedRef, SessionError> {
        logging::debug(format!(
            "Uploading {} ({} bytes) for {correlation}",
            file.name,
            file.size()
        ));
        let part = Part::bytes(Vec::from(file.bytes))
            .file_name(file.name)
            .mime_str(&file.mime)
            .map_err(|err| SessionError::Transport(err.to_string()))?;
        let form = Form::new()
            .part("image_file", part)
            .text("image_id", correlation);

        let response = self.post("/api/upload")?.multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|err| SessionError::InvalidResponse(err.to_string()));
        }
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        logging::warn(format!("Upload rejected with HTTP {status}"));
        Err(SessionError::Upload {
            message: body.error.filter(|message| !message.trim().is_empty()),
        })
    }

    async fn assist(&self, request: AssistRequest) -> Result<AssistResponse, SessionError> {
        let response = self.post("/api/assist")?.json(&request).send().await?;
        read_json(response).await
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedImage, SessionError> {
        logging::debug(format!(
            "Generating with aspect ratio {} and {} reference image(s)",
            request.aspect_ratio,
            request.reference_images.len()
        ));
        let response = self.post("/api/generate")?.json(&request).send().await?;
        read_json(response).await
    }

    async fn download(&self, url: String) -> Result<Bytes, SessionError> {
        let response = self
            .http_client
            .get(self.resolve(&url)?)
            .header(CSRF_HEADER, &self.csrf_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Request {
                status: status.as_u16(),
                message: None,
            });
        }
        Ok(response.bytes().await?)
    }
}

// === Response Interpretation ===

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SessionError> {
    let status = response.status();
    let header_hint = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok());
    let text = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&text)
            .map_err(|err| SessionError::InvalidResponse(err.to_string()));
    }

    // Error pages that are not JSON still carry a status worth reporting.
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        logging::warn(format!(
            "Rate limited (retry_after={:?}, header={:?})",
            body.retry_after, header_hint
        ));
        return Err(SessionError::RateLimited {
            retry_after_secs: retry_after_secs(body.retry_after.or(header_hint)),
        });
    }
    Err(SessionError::Request {
        status: status.as_u16(),
        message: body.error.filter(|message| !message.trim().is_empty()),
    })
}

/// Pull the token out of `<meta name="csrf-token" content="...">`.
#[must_use]
pub fn extract_csrf_token(page: &str) -> Option<String> {
    static META_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    static CONTENT: OnceLock<Option<Regex>> = OnceLock::new();
    let meta_tag = META_TAG
        .get_or_init(|| {
            Regex::new(r#"(?i)<meta\b[^>]*\bname\s*=\s*["']csrf-token["'][^>]*>"#).ok()
        })
        .as_ref()?;
    let content = CONTENT
        .get_or_init(|| Regex::new(r#"(?i)\bcontent\s*=\s*["']([^"']*)["']"#).ok())
        .as_ref()?;
    let tag = meta_tag.find(page)?;
    content
        .captures(tag.as_str())
        .and_then(|caps| caps.get(1))
        .map(|token| token.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_meta_token_regardless_of_attribute_order() {
        let page = r#"<html><head><meta charset="utf-8">
            <meta name="csrf-token" content="abc123"></head></html>"#;
        assert_eq!(extract_csrf_token(page), Some("abc123".to_string()));

        let reversed = r#"<meta content='xyz' name='csrf-token'/>"#;
        assert_eq!(extract_csrf_token(reversed), Some("xyz".to_string()));

        assert_eq!(extract_csrf_token("<meta name=\"viewport\" content=\"w\">"), None);
    }

    fn resolved(base: &str, url: &str) -> String {
        HttpTransport::new(base, Duration::from_secs(5))
            .expect("client")
            .resolve(url)
            .expect("resolves")
            .to_string()
    }

    #[test]
    fn resolves_relative_urls_against_base() {
        assert_eq!(
            resolved("http://localhost:5000/", "/output/x.png"),
            "http://localhost:5000/output/x.png"
        );
        assert_eq!(
            resolved("http://localhost:5000", "https://cdn.example/x.png"),
            "https://cdn.example/x.png"
        );
    }

    #[test]
    fn rooted_paths_replace_the_base_path() {
        assert_eq!(
            resolved("http://host:5000/studio", "/output/x.png"),
            "http://host:5000/output/x.png"
        );
        assert_eq!(
            resolved("http://host:5000/studio/", "output/x.png"),
            "http://host:5000/studio/output/x.png"
        );
    }

    #[test]
    fn scheme_relative_urls_keep_the_base_scheme() {
        assert_eq!(
            resolved("https://host", "//cdn.example/x.png"),
            "https://cdn.example/x.png"
        );
    }

    #[test]
    fn unusable_base_urls_are_rejected() {
        for base in ["not a url", "localhost:5000", "ftp://host/"] {
            assert!(
                HttpTransport::new(base, Duration::from_secs(5)).is_err(),
                "{base} accepted"
            );
        }
    }
}
