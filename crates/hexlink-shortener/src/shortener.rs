use crate::error::Result;
use async_trait::async_trait;
use hexlink_core::ShortCode;
use tokio::sync::watch;

/// Parameters for creating a shortened URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenRequest {
    /// The original URL to be shortened.
    pub original_url: String,
    /// Optional client-supplied tag, empty when not provided.
    pub correlation_id: String,
    /// Owner assigned by the auth layer, if any.
    pub user_id: Option<i64>,
}

impl ShortenRequest {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            correlation_id: String::new(),
            user_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Result of a successful shorten call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub short_code: ShortCode,
    /// `base_url/short_code`.
    pub short_url: String,
    /// `false` when the URL already had a code.
    pub created: bool,
}

/// One entry of a batch create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchItem {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

/// Per-item result of a batch create, echoing the caller's correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub correlation_id: String,
    pub result: Result<Shortened>,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Returns the short URL for `request.original_url`, allocating a code
    /// only if the URL has none yet.
    ///
    /// When `cancel` is provided and holds `true`, allocation stops before
    /// the next generation attempt with [`crate::ShortenerError::Cancelled`].
    async fn shorten(
        &self,
        request: ShortenRequest,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<Shortened>;

    /// Shortens several URLs, reporting success or failure per item in input order.
    async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        user_id: Option<i64>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<Vec<BatchOutcome>>;
}
