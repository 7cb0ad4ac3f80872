use std::sync::Arc;

use crate::redirector::Redirector;
use crate::RedirectorError;
use async_trait::async_trait;
use hexlink_core::{ReadStore, ShortCode};
use tracing::{debug, trace};

/// Service for handling URL redirects.
#[derive(Debug)]
pub struct RedirectorService<R> {
    store: Arc<R>,
}

impl<R> Clone for RedirectorService<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: ReadStore> RedirectorService<R> {
    pub fn new(store: R) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Creates a service over a store shared with a shortener.
    pub fn from_arc(store: Arc<R>) -> Self {
        Self { store }
    }

    /// Resolves a short code to its original URL.
    ///
    /// Input that is not a well-formed short code cannot name a record and
    /// resolves to [`RedirectorError::NotFound`] without touching the store.
    pub async fn resolve(&self, code: &str) -> crate::Result<String> {
        Redirector::resolve(self, code).await
    }
}

#[async_trait]
impl<R: ReadStore> Redirector for RedirectorService<R> {
    async fn resolve(&self, code: &str) -> crate::Result<String> {
        trace!(code, "resolving short code");

        let Ok(short_code) = ShortCode::new(code) else {
            trace!(code, "malformed short code");
            return Err(RedirectorError::NotFound(code.to_string()));
        };

        match self.store.find_by_short_code(&short_code).await? {
            Some(record) => {
                debug!(code, url = %record.original_url, "resolved short code");
                Ok(record.original_url)
            }
            None => {
                trace!(code, "short code not found");
                Err(RedirectorError::NotFound(code.to_string()))
            }
        }
    }
}
