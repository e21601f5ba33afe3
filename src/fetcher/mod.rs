/// Fetcher trait and shared response type.
///
/// The ingestion driver only ever talks to a `dyn Fetcher`, so tests can
/// swap the HTTP client for [`mock::MockFetcher`].
pub mod http;
pub mod mock;

pub use http::HttpFetcher;
pub use mock::MockFetcher;

use crate::error::NetworkError;

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after at most one redirect.
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    /// True when the declared type is markup, or when no type was declared.
    #[must_use]
    pub fn is_markup(&self) -> bool {
        self.content_type.as_deref().is_none_or(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml")
        })
    }
}

/// Retrieves one URL. Implementations must be `Send + Sync` so the
/// driver can run on a blocking worker thread.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchResponse, NetworkError>;
}
