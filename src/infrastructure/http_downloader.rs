//! HTTP download of Slack file attachments.

use reqwest::{Client, StatusCode};

use crate::domain::{AppError, Downloader, Fetched, Result};

/// Fetches `url_private` attachment bodies over HTTPS.
pub struct HttpDownloader {
    client: Client,
    /// Slack token for private file URLs; exports usually embed one in the URL.
    token: Option<String>,
}

impl HttpDownloader {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }
}

impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        tracing::debug!(url = %redact(url), "GET");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| AppError::Download {
            url: redact(url),
            message: format!("request failed: {e}"),
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            return Err(AppError::Download {
                url: redact(url),
                message: format!("HTTP {status}"),
            });
        }

        let body = resp.bytes().await.map_err(|e| AppError::Download {
            url: redact(url),
            message: format!("failed to read body: {e}"),
        })?;

        Ok(Fetched::Body(body.to_vec()))
    }
}

/// Strips the query string, where Slack puts the access token.
#[must_use]
pub fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}
