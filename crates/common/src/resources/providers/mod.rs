//! Provider adapters
//!
//! One adapter per resource kind. Scope-dependent adapters (scripture,
//! notes, questions) issue one request per scope token in parallel;
//! global adapters (words, articles) issue exactly one request and ignore
//! the scope entirely.

mod articles;
mod notes;
mod questions;
mod scripture;
mod words;

pub use articles::ArticlesProvider;
pub use notes::NotesProvider;
pub use questions::QuestionsProvider;
pub use scripture::ScriptureProvider;
pub use words::WordsProvider;

use super::dialect::{self, Payload};
use super::transport::{ProviderRequest, ResourceTransport};
use super::types::{Match, ResourceKind, ResourcePreferences, ResourceResult};
use crate::config::ProvidersConfig;
use crate::errors::Result;
use crate::metrics::{record_provider_call, CallOutcome};
use crate::scope::{ClassifiedScope, ScopeToken};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// How an adapter treats the classified scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePolicy {
    /// One request per scope token
    PerToken,
    /// One request, no scope parameter
    Global,
}

/// Common trait for all resource adapters
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Kind served by this adapter
    fn kind(&self) -> ResourceKind;

    fn scope_policy(&self) -> ScopePolicy {
        if self.kind().is_global() {
            ScopePolicy::Global
        } else {
            ScopePolicy::PerToken
        }
    }

    /// Search within a classified scope
    async fn search(
        &self,
        scope: &ClassifiedScope,
        query: &str,
        prefs: &ResourcePreferences,
    ) -> Result<ResourceResult>;
}

/// Dialect-sensitive decode step, one per adapter
pub type Decoder = fn(Payload) -> ResourceResult;

/// Shared request plumbing for one provider endpoint
#[derive(Clone)]
pub struct ProviderClient {
    kind: ResourceKind,
    endpoint: String,
    list_fields: &'static [&'static str],
    transport: Arc<dyn ResourceTransport>,
}

impl ProviderClient {
    pub fn new(
        kind: ResourceKind,
        endpoint: impl Into<String>,
        list_fields: &'static [&'static str],
        transport: Arc<dyn ResourceTransport>,
    ) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            list_fields,
            transport,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the GET for one token; `None` means no scope parameter
    pub fn request(
        &self,
        token: Option<&ScopeToken>,
        query: &str,
        prefs: &ResourcePreferences,
    ) -> ProviderRequest {
        let mut request = ProviderRequest::new(self.endpoint.clone());
        if let Some(token) = token {
            let (name, value) = token.query_param();
            request = request.param(name, value);
        }
        let query = query.trim();
        if !query.is_empty() {
            request = request.param("filter", query);
        }
        request
            .param("language", prefs.language.clone())
            .param("organization", prefs.organization.clone())
            .param("resource", prefs.resource_for(self.kind))
    }

    /// Issue a request and classify its payload
    pub async fn fetch_payload(&self, request: &ProviderRequest) -> Result<Payload> {
        let response = self.transport.get(request).await?;
        Payload::classify(&response, self.list_fields, self.kind.as_str())
    }

    /// Issue a request and decode it, recording the outcome
    pub async fn search_token(
        &self,
        token: Option<&ScopeToken>,
        query: &str,
        prefs: &ResourcePreferences,
        decode: Decoder,
    ) -> Result<ResourceResult> {
        let request = self.request(token, query, prefs);
        let start = Instant::now();

        let outcome = self.fetch_payload(&request).await.map(decode);
        let elapsed = start.elapsed().as_secs_f64();

        match &outcome {
            Ok(result) if result.is_empty() => {
                record_provider_call(self.kind.as_str(), CallOutcome::Empty, elapsed)
            }
            Ok(result) => {
                debug!(
                    kind = %self.kind,
                    matches = result.matches.len(),
                    total = result.total_count,
                    "Provider call succeeded"
                );
                record_provider_call(self.kind.as_str(), CallOutcome::Ok, elapsed)
            }
            Err(_) => record_provider_call(self.kind.as_str(), CallOutcome::Failed, elapsed),
        }

        outcome
    }

    /// One request per token in parallel, merged; a failed token
    /// contributes nothing unless every token failed
    pub async fn fan_out(
        &self,
        tokens: &[ScopeToken],
        query: &str,
        prefs: &ResourcePreferences,
        decode: Decoder,
    ) -> Result<ResourceResult> {
        let calls = tokens
            .iter()
            .map(|token| self.search_token(Some(token), query, prefs, decode));
        let outcomes = futures::future::join_all(calls).await;

        let mut parts = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for (token, outcome) in tokens.iter().zip(outcomes) {
            match outcome {
                Ok(part) => parts.push(part),
                Err(e) => {
                    warn!(
                        kind = %self.kind,
                        token = %token.value,
                        error = %e,
                        "Scope token failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if parts.is_empty() => Err(e),
            _ => Ok(ResourceResult::merge(parts)),
        }
    }

    /// Exactly one request with no scope parameter
    pub async fn fetch_global(
        &self,
        query: &str,
        prefs: &ResourcePreferences,
        decode: Decoder,
    ) -> Result<ResourceResult> {
        self.search_token(None, query, prefs, decode).await
    }

    /// Dispatch according to a scope policy
    pub async fn dispatch(
        &self,
        policy: ScopePolicy,
        scope: &ClassifiedScope,
        query: &str,
        prefs: &ResourcePreferences,
        decode: Decoder,
    ) -> Result<ResourceResult> {
        match policy {
            ScopePolicy::PerToken => self.fan_out(&scope.tokens, query, prefs, decode).await,
            ScopePolicy::Global => self.fetch_global(query, prefs, decode).await,
        }
    }
}

/// Map a classified payload onto a result
///
/// `item` turns one JSON object into a match; it is also tried on a scalar
/// payload, which otherwise contributes only its prose field.
pub(crate) fn normalize(
    payload: Payload,
    item: fn(&Map<String, Value>) -> Option<Match>,
    prose_fields: &[&str],
) -> ResourceResult {
    const COUNT_FIELDS: &[&str] = &["totalMatches", "total_count", "totalCount", "total", "count"];
    const MARKDOWN_FIELDS: &[&str] = &["markdown", "combinedMarkdown", "formatted"];

    match payload {
        Payload::JsonMatches { items, envelope } => {
            let matches: Vec<Match> = items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(item)
                .collect();
            let markdown = dialect::first_str(&envelope, MARKDOWN_FIELDS)
                .unwrap_or_else(|| dialect::synthesize_markdown(&matches));
            ResourceResult::new(
                markdown,
                matches,
                dialect::stated_count(&envelope, COUNT_FIELDS),
                dialect::stated_breakdown(&envelope),
            )
        }
        Payload::JsonScalar(object) => {
            if let Some(single) = item(&object) {
                let markdown = single.to_markdown();
                return ResourceResult::new(markdown, vec![single], None, None);
            }
            let markdown = dialect::first_str(&object, MARKDOWN_FIELDS)
                .or_else(|| dialect::first_str(&object, prose_fields))
                .unwrap_or_default();
            ResourceResult::new(
                markdown,
                Vec::new(),
                dialect::stated_count(&object, COUNT_FIELDS),
                dialect::stated_breakdown(&object),
            )
        }
        Payload::MarkdownSections(doc) => {
            let matches = doc.to_matches();
            let total = doc.stated_total();
            ResourceResult::new(doc.text, matches, total, None)
        }
    }
}

/// Adapters keyed by the kind they serve
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ResourceKind, Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five standard adapters over one transport
    pub fn standard(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ScriptureProvider::new(transport.clone(), config)));
        registry.register(Arc::new(NotesProvider::new(transport.clone(), config)));
        registry.register(Arc::new(QuestionsProvider::new(transport.clone(), config)));
        registry.register(Arc::new(WordsProvider::new(transport.clone(), config)));
        registry.register(Arc::new(ArticlesProvider::new(transport, config)));
        registry
    }

    /// Register an adapter, replacing any previous one for the same kind
    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn ResourceProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Registered kinds in canonical order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }
}
