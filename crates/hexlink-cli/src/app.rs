use crate::cli::{Command, StoreKind, CLI};
use anyhow::{bail, Context};
use hexlink_core::{RecordStore, ShortCode};
use hexlink_generator::RandomHexGenerator;
use hexlink_redirector::{RedirectorError, RedirectorService};
use hexlink_shortener::{BatchItem, ShortenRequest, Shortener, ShortenerConfig, ShortenerService};
use hexlink_storage::{FileStore, MemoryStore, MySqlStore, SnapshotPolicy};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct BatchRequestItem {
    correlation_id: String,
    original_url: String,
}

#[derive(Debug, Serialize)]
struct BatchResponseItem {
    correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserUrl {
    short_url: String,
    original_url: String,
}

/// Opens the configured store, runs the command, then flushes the snapshot.
pub async fn run<R, W>(
    cli: CLI,
    input: R,
    out: &mut W,
    cancel: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let config = cli.shortener_config();
    config.validate()?;
    let kind = cli.store_kind();
    info!(store = %kind, base_url = %config.base_url, "starting hexlink");

    match kind {
        StoreKind::MySql(dsn) => {
            let store = MySqlStore::connect(&dsn)
                .await
                .context("failed to connect to mysql")?;
            store.ensure_schema().await?;
            execute(Arc::new(store), config, cli.command, input, out, &cancel).await
        }
        StoreKind::File(path) => {
            let policy = cli.snapshot_policy();
            let (store, _report) = FileStore::open(&path, policy)
                .await
                .with_context(|| format!("failed to restore {}", path.display()))?;
            let store = Arc::new(store);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let snapshotter = store.spawn_snapshotter(shutdown_rx);

            let result = execute(
                Arc::clone(&store),
                config,
                cli.command,
                input,
                out,
                &cancel,
            )
            .await;

            // The snapshotter dumps once more when told to stop.
            let _ = shutdown_tx.send(true);
            let flushed = match snapshotter {
                Some(handle) => handle.await.context("snapshotter panicked")?,
                None if policy == SnapshotPolicy::OnShutdown => store.dump().await.map(|_| ()),
                None => Ok(()),
            };

            if let Err(err) = &flushed {
                warn!(path = %path.display(), error = %err, "final snapshot failed");
            }
            result?;
            flushed.context("failed to write snapshot")
        }
        StoreKind::Memory => {
            execute(
                Arc::new(MemoryStore::new()),
                config,
                cli.command,
                input,
                out,
                &cancel,
            )
            .await
        }
    }
}

async fn execute<S, R, W>(
    store: Arc<S>,
    config: ShortenerConfig,
    command: Command,
    mut input: R,
    out: &mut W,
    cancel: &watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    S: RecordStore,
    R: AsyncRead + Unpin,
    W: Write,
{
    let base_url = config.base_url.clone();
    let shortener =
        ShortenerService::from_arcs(Arc::clone(&store), Arc::new(RandomHexGenerator::new()), config)?;
    let redirector = RedirectorService::from_arc(Arc::clone(&store));

    match command {
        Command::Shorten {
            url,
            correlation_id,
            user_id,
        } => {
            let request = ShortenRequest::new(url)
                .with_correlation_id(correlation_id)
                .with_user_id(user_id);
            let shortened = shortener.shorten(request, Some(cancel)).await?;
            if !shortened.created {
                info!(short_code = %shortened.short_code, "url was already shortened");
            }
            writeln!(out, "{}", shortened.short_url)?;
        }
        Command::ShortenBatch { urls, user_id } => {
            let items = if urls.is_empty() {
                let mut raw = String::new();
                input.read_to_string(&mut raw).await?;
                parse_batch(&raw)?
            } else {
                urls.into_iter()
                    .enumerate()
                    .map(|(i, url)| BatchItem::new((i + 1).to_string(), url))
                    .collect()
            };

            let outcomes = shortener
                .shorten_batch(items, user_id, Some(cancel))
                .await?;
            let response: Vec<BatchResponseItem> = outcomes
                .into_iter()
                .map(|outcome| match outcome.result {
                    Ok(shortened) => BatchResponseItem {
                        correlation_id: outcome.correlation_id,
                        short_url: Some(shortened.short_url),
                        error: None,
                    },
                    Err(err) => BatchResponseItem {
                        correlation_id: outcome.correlation_id,
                        short_url: None,
                        error: Some(err.to_string()),
                    },
                })
                .collect();
            serde_json::to_writer(&mut *out, &response)?;
            writeln!(out)?;
        }
        Command::Resolve { code } => match redirector.resolve(&code).await {
            Ok(url) => writeln!(out, "{}", url)?,
            Err(RedirectorError::NotFound(code)) => bail!("short code '{}' not found", code),
            Err(err) => return Err(err.into()),
        },
        Command::Delete { code, user_id } => {
            let code = ShortCode::new(code)?;
            if store.delete(&code, user_id).await? {
                info!(short_code = %code, "deleted short url");
                writeln!(out, "deleted {}", code)?;
            } else {
                bail!("short code '{}' not found", code);
            }
        }
        Command::List { user_id } => {
            let urls: Vec<UserUrl> = store
                .list_by_user(user_id)
                .await?
                .into_iter()
                .map(|record| UserUrl {
                    short_url: record.short_code.to_url(&base_url),
                    original_url: record.original_url,
                })
                .collect();
            serde_json::to_writer(&mut *out, &urls)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

fn parse_batch(raw: &str) -> anyhow::Result<Vec<BatchItem>> {
    let items: Vec<BatchRequestItem> =
        serde_json::from_str(raw).context("batch input must be a JSON array")?;
    if items.is_empty() {
        bail!("batch input is empty");
    }
    Ok(items
        .into_iter()
        .map(|item| BatchItem::new(item.correlation_id, item.original_url))
        .collect())
}
