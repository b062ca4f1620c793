//! Scope-aware multi-provider aggregation
//!
//! Classifies the scope once, runs one task per requested kind, and
//! isolates every per-kind failure to a `None` entry. Cancelling the token
//! aborts all in-flight tasks and yields no result at all.

use super::providers::ProviderRegistry;
use super::tools::SEARCH_BIBLICAL_RESOURCES;
use super::types::{AggregatedSearch, ResourceKind, ResourcePreferences, ToolCallRecord};
use crate::errors::{AppError, Result};
use crate::metrics::record_aggregation;
use crate::scope::classify;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Fans a query out across resource kinds
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<ProviderRegistry>,
}

impl Aggregator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Requested kinds, deduplicated in canonical order; empty means every
    /// registered kind
    pub fn resolve_kinds(&self, kinds: &[ResourceKind]) -> Vec<ResourceKind> {
        if kinds.is_empty() {
            return self.registry.kinds();
        }
        kinds.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Aggregate a query across kinds within a scope
    ///
    /// Never fails because a provider failed; the only error is
    /// `AppError::Cancelled` when `cancel` fires first.
    #[instrument(skip_all, fields(query = %query, scope = %scope_raw))]
    pub async fn aggregate(
        &self,
        query: &str,
        scope_raw: &str,
        kinds: &[ResourceKind],
        prefs: &ResourcePreferences,
        cancel: &CancellationToken,
    ) -> Result<AggregatedSearch> {
        let start = Instant::now();
        let scope = Arc::new(classify(scope_raw));
        let kinds = self.resolve_kinds(kinds);

        let mut results: BTreeMap<ResourceKind, _> =
            kinds.iter().map(|kind| (*kind, None)).collect();
        let mut failed_kinds = Vec::new();
        let mut pending = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for kind in &kinds {
            let Some(provider) = self.registry.get(*kind) else {
                warn!(kind = %kind, "No provider registered for kind");
                failed_kinds.push(*kind);
                continue;
            };

            let kind = *kind;
            let scope = scope.clone();
            let query = query.to_string();
            let prefs = prefs.clone();
            pending.insert(kind);
            tasks.spawn(async move { (kind, provider.search(&scope, &query, &prefs).await) });
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    debug!(pending = pending.len(), "Aggregation cancelled");
                    return Err(AppError::Cancelled);
                }

                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((kind, Ok(result)))) => {
                        pending.remove(&kind);
                        if !result.is_empty() {
                            results.insert(kind, Some(result));
                        }
                    }
                    Some(Ok((kind, Err(e)))) => {
                        pending.remove(&kind);
                        warn!(kind = %kind, error = %e, "Provider failed, continuing without it");
                        failed_kinds.push(kind);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Provider task did not complete");
                    }
                },
            }
        }

        // Tasks that panicked never reported their kind
        failed_kinds.extend(pending);
        failed_kinds.sort();
        failed_kinds.dedup();

        let search = AggregatedSearch {
            query: query.to_string(),
            scope_raw: scope_raw.to_string(),
            scope_type: scope.kind,
            tool_calls_issued: vec![issued_call(query, scope_raw, &kinds, prefs)],
            results,
            failed_kinds,
        };

        let populated = search.populated_kinds().len();
        record_aggregation(start.elapsed().as_secs_f64(), kinds.len(), populated);
        info!(
            scope_type = %search.scope_type,
            requested = kinds.len(),
            populated,
            failed = search.failed_kinds.len(),
            total = search.total_count(),
            "Aggregation complete"
        );

        Ok(search)
    }
}

/// The record that reproduces an aggregate when replayed
fn issued_call(
    query: &str,
    scope_raw: &str,
    kinds: &[ResourceKind],
    prefs: &ResourcePreferences,
) -> ToolCallRecord {
    let mut args = Map::new();
    args.insert("query".into(), Value::String(query.to_string()));
    args.insert("reference".into(), Value::String(scope_raw.to_string()));
    args.insert(
        "resources".into(),
        json!(kinds.iter().map(ResourceKind::as_str).collect::<Vec<_>>()),
    );
    args.insert("language".into(), Value::String(prefs.language.clone()));
    args.insert("organization".into(), Value::String(prefs.organization.clone()));
    args.insert(
        "resource".into(),
        Value::String(prefs.resource_for(ResourceKind::Scripture)),
    );
    ToolCallRecord::new(SEARCH_BIBLICAL_RESOURCES, args)
}
