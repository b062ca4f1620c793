//! Primary-text adapter: scoped search and single-passage lookup

use super::{normalize, ProviderClient, ResourceProvider};
use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use crate::resources::dialect::{bold_terms, first_str, str_list, Payload};
use crate::resources::transport::ResourceTransport;
use crate::resources::types::{
    Match, PassageResult, ResourceKind, ResourcePreferences, ResourceResult,
};
use crate::scope::{parse_reference, ClassifiedScope, ScopeKind, ScopeToken};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

const LIST_FIELDS: &[&str] = &["matches", "results", "verses", "scripture", "scriptures"];
const REFERENCE_FIELDS: &[&str] = &["reference", "citation", "ref"];
const TEXT_FIELDS: &[&str] = &["text", "content", "verseText", "passage"];
const TRANSLATION_FIELDS: &[&str] = &["resource", "translation", "version"];

/// Scripture text provider
pub struct ScriptureProvider {
    client: ProviderClient,
}

impl ScriptureProvider {
    pub fn new(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        Self {
            client: ProviderClient::new(
                ResourceKind::Scripture,
                config.endpoint(ResourceKind::Scripture),
                LIST_FIELDS,
                transport,
            ),
        }
    }

    pub fn decode(payload: Payload) -> ResourceResult {
        normalize(payload, verse_match, TEXT_FIELDS)
    }

    /// Fetch the text of one passage in the preferred translation
    pub async fn fetch_passage(
        &self,
        reference: &str,
        prefs: &ResourcePreferences,
    ) -> Result<PassageResult> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AppError::MissingField {
                field: "reference".to_string(),
            });
        }

        let token = ScopeToken::new(ScopeKind::Verse, reference);
        let request = self.client.request(Some(&token), "", prefs);
        let payload = self.client.fetch_payload(&request).await?;

        let resource = prefs.resource_for(ResourceKind::Scripture);
        let raw_content = passage_text(payload, &resource);
        if raw_content.is_empty() {
            return Err(AppError::PassageNotFound {
                reference: reference.to_string(),
            });
        }

        debug!(reference = %reference, resource = %resource, "Passage fetched");

        let parsed = parse_reference(reference);
        Ok(PassageResult {
            reference: reference.to_string(),
            book: parsed.as_ref().map(|p| p.book.clone()),
            chapter: parsed.as_ref().and_then(|p| p.chapter),
            verse: parsed.as_ref().and_then(|p| p.verse),
            raw_content,
            resource,
            language: prefs.language.clone(),
            organization: prefs.organization.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ResourceProvider for ScriptureProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Scripture
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

fn verse_match(object: &Map<String, Value>) -> Option<Match> {
    let reference = first_str(object, REFERENCE_FIELDS)?;
    let text = first_str(object, TEXT_FIELDS)?;
    let terms = match str_list(object, &["matchedTerms", "matched_terms", "terms"]) {
        terms if terms.is_empty() => bold_terms(&text),
        terms => terms,
    };
    Some(Match::new(reference, text).with_terms(terms))
}

/// Passage text from any dialect; translation entries are filtered by the
/// preferred resource when they carry one
fn passage_text(payload: Payload, resource: &str) -> String {
    match payload {
        Payload::JsonMatches { items, envelope } => {
            let entries: Vec<&Map<String, Value>> =
                items.iter().filter_map(Value::as_object).collect();
            let tagged =
                |entry: &&Map<String, Value>| first_str(entry, TRANSLATION_FIELDS).is_some();

            if entries.iter().any(tagged) {
                let preferred = entries.iter().find(|entry| {
                    first_str(entry, TRANSLATION_FIELDS)
                        .map(|t| t.to_lowercase().contains(&resource.to_lowercase()))
                        .unwrap_or(false)
                });
                return preferred
                    .or_else(|| entries.first())
                    .and_then(|entry| first_str(entry, TEXT_FIELDS))
                    .unwrap_or_default();
            }

            let verses: Vec<String> = entries
                .iter()
                .filter_map(|entry| first_str(entry, TEXT_FIELDS))
                .collect();
            if verses.is_empty() {
                first_str(&envelope, TEXT_FIELDS).unwrap_or_default()
            } else {
                verses.join(" ")
            }
        }
        Payload::JsonScalar(object) => first_str(&object, TEXT_FIELDS).unwrap_or_default(),
        Payload::MarkdownSections(doc) => doc.text,
    }
}
