use crate::config::ShortenerConfig;
use crate::error::{Result, ShortenerError};
use crate::shortener::{BatchItem, BatchOutcome, ShortenRequest, Shortened, Shortener};
use async_trait::async_trait;
use hexlink_core::{Record, RecordStore, ShortCode, StorageError};
use hexlink_generator::Generator;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Get-or-create shortener over a [`RecordStore`] and a [`Generator`].
///
/// A URL that already has an active record gets its existing code back.
/// Otherwise random codes are drawn and saved until one is accepted, up to
/// `max_attempts` times. Uniqueness is enforced by the store, so concurrent
/// requests for the same URL converge on one code.
#[derive(Debug)]
pub struct ShortenerService<S, G> {
    store: Arc<S>,
    generator: Arc<G>,
    config: ShortenerConfig,
}

impl<S, G> Clone for ShortenerService<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
        }
    }
}

impl<S: RecordStore, G: Generator> ShortenerService<S, G> {
    pub fn new(store: S, generator: G, config: ShortenerConfig) -> Result<Self> {
        Self::from_arcs(Arc::new(store), Arc::new(generator), config)
    }

    /// Builds a service sharing an existing store, e.g. with a redirector.
    pub fn from_arcs(store: Arc<S>, generator: Arc<G>, config: ShortenerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            generator,
            config,
        })
    }

    pub fn config(&self) -> &ShortenerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn validate_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn shortened(&self, short_code: ShortCode, created: bool) -> Shortened {
        Shortened {
            short_url: short_code.to_url(&self.config.base_url),
            short_code,
            created,
        }
    }

    fn existing(&self, short_code: String) -> Shortened {
        self.shortened(ShortCode::new_unchecked(short_code), false)
    }
}

fn ensure_not_cancelled(cancel: Option<&watch::Receiver<bool>>) -> Result<()> {
    match cancel {
        Some(rx) if *rx.borrow() => Err(ShortenerError::Cancelled),
        _ => Ok(()),
    }
}

#[async_trait]
impl<S: RecordStore, G: Generator> Shortener for ShortenerService<S, G> {
    async fn shorten(
        &self,
        request: ShortenRequest,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<Shortened> {
        Self::validate_url(&request.original_url)?;

        if let Some(existing) = self
            .store
            .find_by_original_url(&request.original_url)
            .await?
        {
            debug!(short_code = %existing.short_code, "url already shortened");
            return Ok(self.shortened(existing.short_code, false));
        }

        let max_attempts = self.config.max_attempts;
        for attempt in 1..=max_attempts {
            ensure_not_cancelled(cancel)?;

            let short_code = self.generator.generate(self.config.code_length)?;
            let record = Record::new(request.original_url.clone(), short_code.clone())
                .with_correlation_id(request.correlation_id.clone())
                .with_user_id(request.user_id);

            match self.store.save(record).await {
                Ok(()) => {
                    info!(%short_code, attempt, "created short url");
                    return Ok(self.shortened(short_code, true));
                }
                Err(StorageError::DuplicateShortCode(_)) => {
                    debug!(%short_code, attempt, "short code collision, retrying");
                }
                Err(StorageError::DuplicateOriginalUrl { short_code }) => {
                    debug!(%short_code, "url shortened concurrently, reusing code");
                    return Ok(self.existing(short_code));
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts = max_attempts, "short code allocation exhausted");
        Err(ShortenerError::AllocationExhausted {
            attempts: max_attempts,
        })
    }

    async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        user_id: Option<i64>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<Vec<BatchOutcome>> {
        let mut outcomes: Vec<Option<Result<Shortened>>> = (0..items.len()).map(|_| None).collect();
        let mut pending = Vec::new();

        for (i, item) in items.iter().enumerate() {
            if let Err(e) = Self::validate_url(&item.original_url) {
                outcomes[i] = Some(Err(e));
                continue;
            }
            match self.store.find_by_original_url(&item.original_url).await {
                Ok(Some(existing)) => {
                    outcomes[i] = Some(Ok(self.shortened(existing.short_code, false)));
                }
                Ok(None) => pending.push(i),
                Err(e) => outcomes[i] = Some(Err(e.into())),
            }
        }

        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;
        while !pending.is_empty() && attempt < max_attempts {
            attempt += 1;
            ensure_not_cancelled(cancel)?;

            let mut indices = Vec::with_capacity(pending.len());
            let mut codes = Vec::with_capacity(pending.len());
            let mut records = Vec::with_capacity(pending.len());
            for &i in &pending {
                match self.generator.generate(self.config.code_length) {
                    Ok(short_code) => {
                        let item = &items[i];
                        records.push(
                            Record::new(item.original_url.clone(), short_code.clone())
                                .with_correlation_id(item.correlation_id.clone())
                                .with_user_id(user_id),
                        );
                        codes.push(short_code);
                        indices.push(i);
                    }
                    Err(e) => outcomes[i] = Some(Err(e.into())),
                }
            }

            let results = self.store.save_batch(records).await?;

            let mut retry = Vec::new();
            for ((i, short_code), result) in indices.into_iter().zip(codes).zip(results) {
                match result {
                    Ok(()) => outcomes[i] = Some(Ok(self.shortened(short_code, true))),
                    Err(StorageError::DuplicateShortCode(_)) => retry.push(i),
                    Err(StorageError::DuplicateOriginalUrl { short_code }) => {
                        outcomes[i] = Some(Ok(self.existing(short_code)));
                    }
                    Err(e) => outcomes[i] = Some(Err(e.into())),
                }
            }

            if !retry.is_empty() {
                debug!(attempt, collisions = retry.len(), "batch short code collisions, retrying");
            }
            pending = retry;
        }

        if !pending.is_empty() {
            warn!(
                attempts = max_attempts,
                items = pending.len(),
                "short code allocation exhausted for batch items"
            );
        }

        let created = outcomes
            .iter()
            .filter(|o| matches!(o, Some(Ok(s)) if s.created))
            .count();
        info!(total = items.len(), created, "processed shorten batch");

        Ok(items
            .into_iter()
            .zip(outcomes)
            .map(|(item, outcome)| BatchOutcome {
                correlation_id: item.correlation_id,
                result: outcome.unwrap_or(Err(ShortenerError::AllocationExhausted {
                    attempts: max_attempts,
                })),
            })
            .collect())
    }
}
