//! Enrichment and embedding job handlers.
//!
//! Indexing an item is a two-phase state machine persisted on the item row
//! (`pending → enriched|failed → embedded`): phase 1 fetches canonical
//! content from the item's external source, phase 2 encodes whatever content
//! is available. A failed enrichment never blocks encoding — the embed job is
//! queued before the enrich job reports its outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use curio_core::{
    EncodeInput, EncodeMode, Encoder, Item, ItemRepository, JobQueue, JobType, Result,
};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Cap on enriched body text written back to an item. External pages can be
/// arbitrarily large; everything past this adds storage without improving the
/// embedding, which is truncated far earlier.
const ENRICH_BODY_MAX: usize = 20_000;

/// Timeout for a single enrichment fetch (seconds).
const ENRICH_FETCH_TIMEOUT_SECS: u64 = 30;

/// Content fetched from an item's external source.
#[derive(Debug, Clone, Default)]
pub struct EnrichedContent {
    pub body: Option<String>,
    pub summary: Option<String>,
}

/// Fetches an item's canonical content from its external source.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, item: &Item) -> Result<EnrichedContent>;
}

/// HTTP content fetcher: scrapes the item's source URL and extracts readable
/// text plus the page title as a summary.
pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl HttpContentFetcher {
    /// Create a fetcher with its own bounded-timeout client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ENRICH_FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, item: &Item) -> Result<EnrichedContent> {
        let url = item
            .metadata
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .ok_or_else(|| {
                curio_core::Error::InvalidInput(format!(
                    "Item {} has no http(s) source url",
                    item.id
                ))
            })?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(curio_core::Error::Request(format!(
                "Source returned {} for {}",
                response.status(),
                url
            )));
        }
        let html = response.text().await?;

        Ok(EnrichedContent {
            body: Some(extract_text(&html)),
            summary: extract_title(&html),
        })
    }
}

/// Strip markup from an HTML document, collapsing whitespace and dropping
/// script/style blocks, bounded to [`ENRICH_BODY_MAX`] characters.
fn extract_text(html: &str) -> String {
    let mut out = String::new();
    let mut rest = html;
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    while let Some(c) = rest.chars().next() {
        if let Some(end) = skip_until {
            // Inside a script/style block: scan for its closing tag.
            if let Some(pos) = rest.to_ascii_lowercase().find(end) {
                rest = &rest[pos + end.len()..];
            } else {
                break;
            }
            skip_until = None;
            continue;
        }
        match c {
            '<' => {
                let head: String = rest.chars().take(8).collect::<String>().to_ascii_lowercase();
                if head.starts_with("<script") {
                    skip_until = Some("</script>");
                } else if head.starts_with("<style") {
                    skip_until = Some("</style>");
                } else {
                    in_tag = true;
                }
            }
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
        rest = &rest[c.len_utf8()..];
        if out.len() > ENRICH_BODY_MAX * 2 {
            break;
        }
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(ENRICH_BODY_MAX).collect()
}

/// Extract the document title, if any.
fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    let title = html[open_end..close].split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Phase 1: fetch canonical content from the item's external source.
///
/// Writes enriched body/summary back to the item with an explicit
/// `enriched`/`failed` status so UIs can poll for completion, then queues the
/// embed phase regardless of outcome.
pub struct EnrichItemHandler {
    items: Arc<dyn ItemRepository>,
    jobs: Arc<dyn JobQueue>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl EnrichItemHandler {
    /// Create an enrichment handler.
    pub fn new(
        items: Arc<dyn ItemRepository>,
        jobs: Arc<dyn JobQueue>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            items,
            jobs,
            fetcher,
        }
    }

    async fn queue_embed(&self, item_id: uuid::Uuid) {
        if let Err(e) = self
            .jobs
            .queue(item_id, JobType::Embed, JobType::Embed.default_priority())
            .await
        {
            warn!(
                subsystem = "jobs",
                component = "enrich",
                item_id = %item_id,
                error = %e,
                "Failed to queue embed phase"
            );
        }
    }
}

#[async_trait]
impl JobHandler for EnrichItemHandler {
    fn job_type(&self) -> JobType {
        JobType::Enrich
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "enrich", op = "execute", item_id = %ctx.item_id()))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let item = match self.items.fetch(ctx.item_id()).await {
            Ok(item) => item,
            Err(e) => return JobResult::Failed(format!("Failed to fetch item: {}", e)),
        };

        match self.fetcher.fetch(&item).await {
            Ok(content) => {
                let write = self
                    .items
                    .set_enrichment(
                        item.id,
                        content.body.as_deref(),
                        content.summary.as_deref(),
                        curio_core::EnrichStatus::Enriched,
                    )
                    .await;
                self.queue_embed(item.id).await;
                match write {
                    Ok(()) => {
                        info!(
                            body_len = content.body.as_deref().map(str::len).unwrap_or(0),
                            "Enrichment complete"
                        );
                        JobResult::Success
                    }
                    Err(e) => JobResult::Failed(format!("Failed to persist enrichment: {}", e)),
                }
            }
            Err(e) => {
                // Record the failure on the item, but still queue phase 2:
                // encoding proceeds on whatever content exists (title alone
                // in the worst case).
                if let Err(write_err) = self
                    .items
                    .set_enrichment(item.id, None, None, curio_core::EnrichStatus::Failed)
                    .await
                {
                    warn!(error = %write_err, "Failed to persist enrichment failure status");
                }
                self.queue_embed(item.id).await;
                JobResult::Failed(format!("Enrichment fetch failed: {}", e))
            }
        }
    }
}

/// Phase 2: encode the item and persist its vector.
///
/// A null vector from the encoder (degraded mode, provider failure) leaves
/// the item searchable lexically but absent from vector search until a later
/// pass; the job itself still succeeds.
pub struct EmbedItemHandler {
    items: Arc<dyn ItemRepository>,
    encoder: Arc<dyn Encoder>,
}

impl EmbedItemHandler {
    /// Create an embedding handler.
    pub fn new(items: Arc<dyn ItemRepository>, encoder: Arc<dyn Encoder>) -> Self {
        Self { items, encoder }
    }
}

#[async_trait]
impl JobHandler for EmbedItemHandler {
    fn job_type(&self) -> JobType {
        JobType::Embed
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "embed", op = "execute", item_id = %ctx.item_id()))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let item = match self.items.fetch(ctx.item_id()).await {
            Ok(item) => item,
            Err(e) => return JobResult::Failed(format!("Failed to fetch item: {}", e)),
        };

        let mut input = EncodeInput::text(item.embeddable_text());
        if let Some(url) = item.image_ref() {
            input = input.with_image(url);
        }

        match self.encoder.encode_one(input, EncodeMode::Document).await {
            Some(vector) => match self.items.set_embedding(item.id, Some(&vector)).await {
                Ok(()) => {
                    info!("Item embedded");
                    JobResult::Success
                }
                Err(e) => JobResult::Failed(format!("Failed to persist embedding: {}", e)),
            },
            None => {
                warn!("Encoder returned no vector, item stays lexical-only");
                JobResult::Success
            }
        }
    }
}

/// Queue the indexing pipeline for a freshly written item: enrichment first
/// when the kind needs an external fetch, otherwise straight to embedding.
pub async fn queue_indexing(jobs: &dyn JobQueue, item: &Item) -> Result<()> {
    let job_type = if item.kind.needs_enrichment() {
        JobType::Enrich
    } else {
        JobType::Embed
    };
    jobs.queue(item.id, job_type, job_type.default_priority())
        .await?;
    Ok(())
}
