//! Resolution engine.
//!
//! For every address query the engine detects the current vantage address,
//! then answers from the cache, the network registry or the upstream, in
//! that order. Only registry answers are cached.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Query;
use hickory_proto::rr::{Name, RecordType};
use tracing::{debug, info, instrument, warn};

use crate::cache::AnswerCache;
use crate::dns::{AnswerRecord, AnswerSource, NetworkRegistry, Upstream};
use crate::error::{Error, Result};
use crate::network::VantageLocator;

/// Default deadline for a single upstream lookup.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Default TTL stamped on produced answers.
pub const DEFAULT_TTL: u32 = 3600;

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub upstream_timeout: Duration,
    pub ttl: u32,
    /// Suppress answer events.
    pub quiet: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            ttl: DEFAULT_TTL,
            quiet: false,
        }
    }
}

/// Outcome of resolving every question of a request.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Answers of all questions, in question order.
    pub answers: Vec<AnswerRecord>,
    /// Number of questions that failed.
    pub failures: usize,
}

impl Resolution {
    pub const fn is_degraded(&self) -> bool {
        self.failures > 0
    }
}

/// Resolves address queries against per-network overrides.
///
/// The engine is cheap to clone; clones share the registry, the cache
/// and the upstream.
pub struct ResolutionEngine<L, C, U>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    locator: L,
    cache: C,
    upstream: U,
    registry: Arc<NetworkRegistry>,
    options: EngineOptions,
}

impl<L, C, U> ResolutionEngine<L, C, U>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    /// Create a new engine.
    pub fn new(
        locator: L,
        cache: C,
        upstream: U,
        registry: NetworkRegistry,
        options: EngineOptions,
    ) -> Self {
        Self {
            locator,
            cache,
            upstream,
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Resolve a single question.
    ///
    /// Only A queries are answered; any other type yields no answers and
    /// touches neither the cache nor the registry.
    #[instrument(skip(self), fields(vantage))]
    pub async fn resolve(&self, domain: &Name, kind: RecordType) -> Result<Vec<AnswerRecord>> {
        if kind != RecordType::A {
            debug!("Ignoring {} query", kind);
            return Ok(Vec::new());
        }

        metrics::counter!("selective_dns_queries_total").increment(1);

        let vantage = self.locator.locate()?;
        tracing::Span::current().record("vantage", tracing::field::display(vantage));

        if let Some(cached) = self.cache.get(vantage, domain).await {
            // Keys match case-insensitively; answer with the spelling asked for
            let cached = AnswerRecord {
                name: domain.clone(),
                ..cached
            };
            self.observe(vantage, &cached, AnswerSource::Cache);
            return Ok(vec![cached]);
        }

        if let Some((address, _)) = self.registry.find_override(vantage, domain) {
            let record = AnswerRecord::new(domain.clone(), address, self.options.ttl);
            self.cache.put(vantage, domain.clone(), record.clone()).await;
            self.observe(vantage, &record, AnswerSource::Override);
            return Ok(vec![record]);
        }

        debug!("No override for {}, falling back to upstream", domain);
        let addresses = tokio::time::timeout(
            self.options.upstream_timeout,
            self.upstream.lookup(domain),
        )
        .await
        .map_err(|_| Error::UpstreamTimeout(self.options.upstream_timeout))??;

        let records: Vec<AnswerRecord> = addresses
            .into_iter()
            .map(|address| AnswerRecord::new(domain.clone(), address, self.options.ttl))
            .collect();
        for record in &records {
            self.observe(vantage, record, AnswerSource::Fallback);
        }

        Ok(records)
    }

    /// Resolve every question independently and concatenate the answers.
    ///
    /// A failing question contributes no answers and does not stop the
    /// others.
    pub async fn resolve_all(&self, queries: &[Query]) -> Resolution {
        let mut resolution = Resolution::default();

        for query in queries {
            match self.resolve(query.name(), query.query_type()).await {
                Ok(answers) => resolution.answers.extend(answers),
                Err(err) => {
                    warn!(domain = %query.name(), error = %err, "Failed to resolve query");
                    metrics::counter!("selective_dns_query_failures_total", "reason" => err.reason())
                        .increment(1);
                    resolution.failures += 1;
                }
            }
        }

        resolution
    }

    fn observe(&self, vantage: Ipv4Addr, record: &AnswerRecord, source: AnswerSource) {
        metrics::counter!("selective_dns_answers_total", "source" => source.as_str()).increment(1);

        if self.options.quiet {
            return;
        }

        info!(
            vantage = %vantage,
            domain = %record.name,
            kind = %record.kind(),
            address = %record.address,
            source = %source,
            "[{}] {}",
            vantage,
            record
        );
    }
}

impl<L, C, U> Clone for ResolutionEngine<L, C, U>
where
    L: VantageLocator,
    C: AnswerCache,
    U: Upstream,
{
    fn clone(&self) -> Self {
        Self {
            locator: self.locator.clone(),
            cache: self.cache.clone(),
            upstream: self.upstream.clone(),
            registry: Arc::clone(&self.registry),
            options: self.options,
        }
    }
}
