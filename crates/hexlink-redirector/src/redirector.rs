use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Redirector: Send + Sync + 'static {
    /// Resolves a short code to the original URL of its active record.
    async fn resolve(&self, code: &str) -> Result<String>;
}
