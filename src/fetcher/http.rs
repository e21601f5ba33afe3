use std::error::Error as _;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::redirect::Policy;
use tracing::debug;

use super::{FetchResponse, Fetcher};
use crate::config::FetchConfig;
use crate::error::{NetworkCause, NetworkError};

/// Blocking HTTP fetcher: bounded timeout, one redirect at most, a fixed
/// user agent and a Chinese-first Accept-Language header.
pub struct HttpFetcher {
    client: Client,
    accept_language: String,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(1))
            .build()
            .context("HTTP client build failed")?;
        Ok(Self {
            client,
            accept_language: config.accept_language.clone(),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, NetworkError> {
        let fail = |cause| NetworkError {
            url: url.to_string(),
            cause,
        };

        let resp = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .map_err(|e| fail(classify(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(NetworkCause::HttpStatus(status.as_u16())));
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().map_err(|e| fail(classify(&e)))?;

        debug!(url, %final_url, bytes = body.len(), "fetched");
        Ok(FetchResponse {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
        })
    }
}

fn classify(err: &reqwest::Error) -> NetworkCause {
    if err.is_timeout() {
        return NetworkCause::Timeout;
    }
    if err.is_redirect() {
        return NetworkCause::TooManyRedirects;
    }
    if let Some(status) = err.status() {
        return NetworkCause::HttpStatus(status.as_u16());
    }
    if err.is_connect() {
        let mut source = err.source();
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::ConnectionRefused {
                    return NetworkCause::Refused;
                }
            }
            let text = inner.to_string().to_ascii_lowercase();
            if text.contains("dns") || text.contains("lookup") || text.contains("resolve") {
                return NetworkCause::Dns;
            }
            source = inner.source();
        }
        return NetworkCause::Refused;
    }
    NetworkCause::Other(err.to_string())
}
