use crate::shortcode::ShortCode;

/// A stored mapping between an original URL and its short code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The original URL that was shortened. Opaque, used as the dedup key.
    pub original_url: String,
    /// The generated short code.
    pub short_code: ShortCode,
    /// Client-supplied batch tag, empty when not provided.
    pub correlation_id: String,
    /// Owner assigned by the auth layer, if any.
    pub user_id: Option<i64>,
    /// Soft-delete flag. Deleted records are invisible to lookups but keep their code.
    pub is_deleted: bool,
}

impl Record {
    /// Creates an active record without correlation id or owner.
    pub fn new(original_url: impl Into<String>, short_code: ShortCode) -> Self {
        Self {
            original_url: original_url.into(),
            short_code,
            correlation_id: String::new(),
            user_id: None,
            is_deleted: false,
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

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}
