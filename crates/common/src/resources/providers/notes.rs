//! Translation notes adapter

use super::{normalize, ProviderClient, ResourceProvider};
use crate::config::ProvidersConfig;
use crate::errors::Result;
use crate::resources::dialect::{bold_terms, first_str, Payload};
use crate::resources::transport::ResourceTransport;
use crate::resources::types::{Match, ResourceKind, ResourcePreferences, ResourceResult};
use crate::scope::ClassifiedScope;
use serde_json::{Map, Value};
use std::sync::Arc;

const LIST_FIELDS: &[&str] = &["notes", "matches", "results", "items"];

/// Verse-level annotation provider
pub struct NotesProvider {
    client: ProviderClient,
}

impl NotesProvider {
    pub fn new(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        Self {
            client: ProviderClient::new(
                ResourceKind::Notes,
                config.endpoint(ResourceKind::Notes),
                LIST_FIELDS,
                transport,
            ),
        }
    }

    pub fn decode(payload: Payload) -> ResourceResult {
        normalize(payload, note_match, &["content", "text"])
    }
}

#[async_trait::async_trait]
impl ResourceProvider for NotesProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Notes
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

/// Notes quote a phrase of the verse and annotate it
fn note_match(object: &Map<String, Value>) -> Option<Match> {
    let reference = first_str(object, &["reference", "Reference", "ref"])?;
    let note = first_str(object, &["note", "Note", "text", "content"])?;
    let raw = match first_str(object, &["quote", "Quote", "phrase", "glQuote"]) {
        Some(quote) => format!("{}: {}", quote, note),
        None => note,
    };
    let terms = bold_terms(&raw);
    Some(Match::new(reference, raw).with_terms(terms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::transport::MockTransport;
    use crate::scope::classify;
    use serde_json::json;

    #[test]
    fn test_decode_json_notes() {
        let payload = Payload::JsonMatches {
            items: vec![
                json!({"Reference": "Romans 8:28", "Quote": "all things", "Note": "Everything that happens"}),
                json!({"reference": "Romans 8:29", "note": "Those whom God chose"}),
                json!({"reference": "Romans 8:30"}),
            ],
            envelope: Map::new(),
        };
        let result = NotesProvider::decode(payload);

        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.matches[0].raw_content, "all things: Everything that happens");
        assert_eq!(result.matches[1].raw_content, "Those whom God chose");
        assert!(result.combined_markdown.starts_with("**Romans 8:28** all things"));
    }

    #[tokio::test]
    async fn test_search_verse_scope_markdown() {
        let transport = Arc::new(MockTransport::new().respond_text(
            "/api/translation-notes",
            &[("reference", "John 3:16")],
            "## John 3:16\nGod so loved\n\n## John 3:16\nonly begotten",
        ));
        let provider = NotesProvider::new(transport.clone(), &ProvidersConfig::default());

        let result = provider
            .search(&classify("John 3:16"), "", &ResourcePreferences::default())
            .await
            .unwrap();

        assert_eq!(transport.calls().len(), 1);
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.total_count, 2);
    }
}
