//! Training articles adapter

use super::{normalize, ProviderClient, ResourceProvider};
use crate::config::ProvidersConfig;
use crate::errors::Result;
use crate::resources::dialect::{first_str, Payload};
use crate::resources::transport::ResourceTransport;
use crate::resources::types::{Match, ResourceKind, ResourcePreferences, ResourceResult};
use crate::scope::ClassifiedScope;
use serde_json::{Map, Value};
use std::sync::Arc;

const LIST_FIELDS: &[&str] = &["articles", "modules", "matches", "results"];

/// Training article provider
pub struct ArticlesProvider {
    client: ProviderClient,
}

impl ArticlesProvider {
    pub fn new(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        Self {
            client: ProviderClient::new(
                ResourceKind::Articles,
                config.endpoint(ResourceKind::Articles),
                LIST_FIELDS,
                transport,
            ),
        }
    }

    pub fn decode(payload: Payload) -> ResourceResult {
        normalize(payload, article_match, &["content", "markdown"]).unlocated()
    }
}

#[async_trait::async_trait]
impl ResourceProvider for ArticlesProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Articles
    }

    async fn search(
        &self,
        scope: &ClassifiedScope,
        query: &str,
        prefs: &ResourcePreferences,
    ) -> Result<ResourceResult> {
        self.client
            .dispatch(self.scope_policy(), scope, query, prefs, Self::decode)
            .await
    }
}

fn article_match(object: &Map<String, Value>) -> Option<Match> {
    let title = first_str(object, &["title", "name", "path", "moduleId"])?;
    let body = first_str(object, &["content", "markdown", "text", "body", "excerpt"])?;
    Some(Match::unlocated(title, body))
}
