//! Glossary terms adapter

use super::{normalize, ProviderClient, ResourceProvider};
use crate::config::ProvidersConfig;
use crate::errors::Result;
use crate::resources::dialect::{first_str, Payload};
use crate::resources::transport::ResourceTransport;
use crate::resources::types::{Match, ResourceKind, ResourcePreferences, ResourceResult};
use crate::scope::ClassifiedScope;
use serde_json::{Map, Value};
use std::sync::Arc;

const LIST_FIELDS: &[&str] = &["words", "terms", "matches", "results", "articles"];

/// Glossary provider; the glossary is not partitioned by scope
pub struct WordsProvider {
    client: ProviderClient,
}

impl WordsProvider {
    pub fn new(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        Self {
            client: ProviderClient::new(
                ResourceKind::Words,
                config.endpoint(ResourceKind::Words),
                LIST_FIELDS,
                transport,
            ),
        }
    }

    pub fn decode(payload: Payload) -> ResourceResult {
        normalize(payload, term_match, &["content", "definition", "markdown"]).unlocated()
    }
}

#[async_trait::async_trait]
impl ResourceProvider for WordsProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Words
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

/// The term itself stands in as the match reference
fn term_match(object: &Map<String, Value>) -> Option<Match> {
    let term = first_str(object, &["term", "word", "title", "name"])?;
    let definition = first_str(object, &["definition", "content", "text", "markdown"])?;
    Some(Match::unlocated(term.clone(), definition).with_terms(vec![term]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::transport::MockTransport;
    use crate::scope::classify;
    use serde_json::json;

    #[tokio::test]
    async fn test_corpus_scope_issues_single_request() {
        let transport = Arc::new(MockTransport::new().respond_json(
            "/api/translation-words",
            &[],
            json!({"words": [{"term": "grace", "definition": "Favor that is not earned"}]}),
        ));
        let provider = WordsProvider::new(transport.clone(), &ProvidersConfig::default());

        let result = provider
            .search(&classify("Bible"), "grace", &ResourcePreferences::default())
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].get_param("testament"), None);
        assert_eq!(calls[0].get_param("reference"), None);
        assert_eq!(calls[0].get_param("filter"), Some("grace"));
        assert_eq!(result.matches[0].reference, "grace");
        assert!(result.matches[0].book.is_none());
        assert!(result.breakdown.is_none());
    }

    #[tokio::test]
    async fn test_verse_scope_is_ignored() {
        let transport = Arc::new(MockTransport::new().respond_text(
            "/api/translation-words",
            &[],
            "### love\nTo care deeply for someone",
        ));
        let provider = WordsProvider::new(transport.clone(), &ProvidersConfig::default());

        let result = provider
            .search(&classify("John 3:16"), "love", &ResourcePreferences::default())
            .await
            .unwrap();

        assert_eq!(transport.calls()[0].get_param("reference"), None);
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn test_terms_named_like_books_carry_no_location() {
        let result = WordsProvider::decode(Payload::JsonMatches {
            items: vec![
                json!({"term": "Job", "definition": "A man from Uz"}),
                json!({"term": "mark", "definition": "A sign or seal"}),
            ],
            envelope: Map::new(),
        });

        assert_eq!(result.matches[0].reference, "Job");
        assert!(result.matches.iter().all(|m| m.book.is_none() && m.chapter.is_none()));
        assert!(result.breakdown.is_none());

        let doc = crate::resources::dialect::MarkdownDoc::parse("## Mark\nTo set apart");
        let result = WordsProvider::decode(Payload::MarkdownSections(doc));
        assert_eq!(result.matches[0].book, None);
    }
}
