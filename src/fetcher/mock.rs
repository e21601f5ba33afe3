/// Mock fetcher for tests: canned responses keyed by URL plus a call log.
use std::collections::HashMap;
use std::sync::Mutex;

use super::{FetchResponse, Fetcher};
use crate::error::{NetworkCause, NetworkError};

#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<FetchResponse, NetworkCause>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` as `text/html` for `url`.
    #[must_use]
    pub fn with_html(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(FetchResponse {
                status: 200,
                final_url: url.to_string(),
                content_type: Some("text/html; charset=utf-8".into()),
                body: body.to_string(),
            }),
        );
        self
    }

    #[must_use]
    pub fn with_response(mut self, url: &str, response: FetchResponse) -> Self {
        self.responses.insert(url.to_string(), Ok(response));
        self
    }

    #[must_use]
    pub fn with_failure(mut self, url: &str, cause: NetworkCause) -> Self {
        self.responses.insert(url.to_string(), Err(cause));
        self
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, NetworkError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        match self.responses.get(url) {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(cause)) => Err(NetworkError {
                url: url.to_string(),
                cause: cause.clone(),
            }),
            None => Err(NetworkError {
                url: url.to_string(),
                cause: NetworkCause::HttpStatus(404),
            }),
        }
    }
}
