//! Comprehension questions adapter

use super::{normalize, ProviderClient, ResourceProvider};
use crate::config::ProvidersConfig;
use crate::errors::Result;
use crate::resources::dialect::{first_str, Payload};
use crate::resources::transport::ResourceTransport;
use crate::resources::types::{Match, ResourceKind, ResourcePreferences, ResourceResult};
use crate::scope::ClassifiedScope;
use serde_json::{Map, Value};
use std::sync::Arc;

const LIST_FIELDS: &[&str] = &["questions", "matches", "results", "items"];

/// Comprehension question provider
pub struct QuestionsProvider {
    client: ProviderClient,
}

impl QuestionsProvider {
    pub fn new(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        Self {
            client: ProviderClient::new(
                ResourceKind::Questions,
                config.endpoint(ResourceKind::Questions),
                LIST_FIELDS,
                transport,
            ),
        }
    }

    pub fn decode(payload: Payload) -> ResourceResult {
        normalize(payload, question_match, &["content", "text"])
    }
}

#[async_trait::async_trait]
impl ResourceProvider for QuestionsProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Questions
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

fn question_match(object: &Map<String, Value>) -> Option<Match> {
    let reference = first_str(object, &["reference", "Reference", "ref"])?;
    let question = first_str(object, &["question", "Question"])?;
    let raw = match first_str(object, &["response", "Response", "answer"]) {
        Some(response) => format!("Q: {}\nA: {}", question, response),
        None => format!("Q: {}", question),
    };
    Some(Match::new(reference, raw))
}
