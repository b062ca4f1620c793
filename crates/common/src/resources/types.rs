//! Uniform resource model shared by every provider dialect

use crate::scope::{lookup_book, parse_reference, ScopeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Resource kinds served by upstream providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Primary text
    Scripture,
    /// Verse-level annotations
    Notes,
    /// Comprehension questions
    Questions,
    /// Glossary terms
    Words,
    /// Training articles
    Articles,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Scripture,
        ResourceKind::Notes,
        ResourceKind::Questions,
        ResourceKind::Words,
        ResourceKind::Articles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Scripture => "scripture",
            ResourceKind::Notes => "notes",
            ResourceKind::Questions => "questions",
            ResourceKind::Words => "words",
            ResourceKind::Articles => "articles",
        }
    }

    /// Human label used in resource links
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Scripture => "Scripture",
            ResourceKind::Notes => "Translation Notes",
            ResourceKind::Questions => "Translation Questions",
            ResourceKind::Words => "Translation Words",
            ResourceKind::Articles => "Translation Academy",
        }
    }

    /// Glossary and article corpora are not partitioned by testament or book
    pub fn is_global(&self) -> bool {
        matches!(self, ResourceKind::Words | ResourceKind::Articles)
    }

    /// Upstream resource identifier sent as the `resource` parameter
    pub fn default_resource(&self) -> &'static str {
        match self {
            ResourceKind::Scripture => "ult",
            ResourceKind::Notes => "tn",
            ResourceKind::Questions => "tq",
            ResourceKind::Words => "tw",
            ResourceKind::Articles => "ta",
        }
    }

    /// Tool name that searches this kind alone
    pub fn search_tool(&self) -> &'static str {
        match self {
            ResourceKind::Scripture => "search_scripture",
            ResourceKind::Notes => "search_translation_notes",
            ResourceKind::Questions => "search_translation_questions",
            ResourceKind::Words => "search_translation_words",
            ResourceKind::Articles => "search_translation_academy",
        }
    }

    pub fn from_search_tool(tool: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.search_tool() == tool)
    }

    /// Lenient parse accepting kind names, labels and resource ids
    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "scripture" | "bible" | "ult" | "ust" | "text" => Some(ResourceKind::Scripture),
            "notes" | "translation_notes" | "tn" => Some(ResourceKind::Notes),
            "questions" | "translation_questions" | "tq" => Some(ResourceKind::Questions),
            "words" | "translation_words" | "tw" | "glossary" => Some(ResourceKind::Words),
            "articles" | "translation_academy" | "ta" | "academy" => Some(ResourceKind::Articles),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language/organization/resource preference, always passed explicitly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePreferences {
    pub language: String,
    pub organization: String,
    /// Preferred scripture translation; other kinds use their default id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ResourcePreferences {
    pub fn resource_for(&self, kind: ResourceKind) -> String {
        match (kind, &self.resource) {
            (ResourceKind::Scripture, Some(resource)) => resource.clone(),
            _ => kind.default_resource().to_string(),
        }
    }
}

impl Default for ResourcePreferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            organization: "unfoldingWord".to_string(),
            resource: None,
        }
    }
}

/// One normalized hit
///
/// `raw_content` is what gets rendered; the structured fields are parsed
/// from `reference` and left empty when the reference is not a recognizable
/// scripture reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse: Option<u32>,
    pub raw_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
}

impl Match {
    pub fn new(reference: impl Into<String>, raw_content: impl Into<String>) -> Self {
        let reference = reference.into().trim().to_string();
        let parsed = parse_reference(&reference);

        Self {
            book: parsed.as_ref().map(|p| p.book.clone()),
            chapter: parsed.as_ref().and_then(|p| p.chapter),
            verse: parsed.as_ref().and_then(|p| p.verse),
            reference,
            raw_content: raw_content.into().trim().to_string(),
            matched_terms: Vec::new(),
        }
    }

    /// A match labelled by a term or title rather than a scripture location
    pub fn unlocated(label: impl Into<String>, raw_content: impl Into<String>) -> Self {
        Self {
            reference: label.into().trim().to_string(),
            book: None,
            chapter: None,
            verse: None,
            raw_content: raw_content.into().trim().to_string(),
            matched_terms: Vec::new(),
        }
    }

    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.matched_terms = terms;
        self
    }

    /// Markdown rendering used when a provider furnishes no combined markdown
    pub fn to_markdown(&self) -> String {
        if self.reference.is_empty() {
            self.raw_content.clone()
        } else {
            format!("**{}** {}", self.reference, self.raw_content)
        }
    }

    fn dedup_key(&self) -> (String, String) {
        (self.reference.to_lowercase(), self.raw_content.clone())
    }
}

/// Match counts by testament and by book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    #[serde(default)]
    pub by_testament: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_book: BTreeMap<String, usize>,
}

impl Breakdown {
    /// Count located matches by testament and book
    pub fn from_matches(matches: &[Match]) -> Self {
        let mut breakdown = Self::default();
        for book in matches.iter().filter_map(|m| m.book.as_deref()).filter_map(lookup_book) {
            *breakdown
                .by_testament
                .entry(book.testament.code().to_string())
                .or_default() += 1;
            *breakdown.by_book.entry(book.name.to_string()).or_default() += 1;
        }
        breakdown
    }

    pub fn merge(&mut self, other: &Breakdown) {
        for (testament, count) in &other.by_testament {
            *self.by_testament.entry(testament.clone()).or_default() += count;
        }
        for (book, count) in &other.by_book {
            *self.by_book.entry(book.clone()).or_default() += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_testament.is_empty() && self.by_book.is_empty()
    }
}

/// Normalized result for one resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResult {
    pub combined_markdown: String,
    pub matches: Vec<Match>,
    /// Never below `matches.len()`; upstream statistics may report more
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
}

impl ResourceResult {
    /// Build a result, clamping the total so it covers every parsed match
    pub fn new(
        combined_markdown: String,
        matches: Vec<Match>,
        stated_total: Option<usize>,
        breakdown: Option<Breakdown>,
    ) -> Self {
        let total_count = stated_total.unwrap_or(0).max(matches.len());
        let breakdown = breakdown
            .or_else(|| Some(Breakdown::from_matches(&matches)))
            .filter(|b| !b.is_empty());

        Self {
            combined_markdown: combined_markdown.trim().to_string(),
            matches,
            total_count,
            breakdown,
        }
    }

    /// Strip scripture locations from every match, for kinds whose entries
    /// are labelled by term or title
    pub fn unlocated(mut self) -> Self {
        for m in &mut self.matches {
            m.book = None;
            m.chapter = None;
            m.verse = None;
        }
        self.breakdown = None;
        self
    }

    /// Nothing to show: no matches and no renderable content
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.combined_markdown.trim().is_empty()
    }

    /// Merge per-token partial results, dropping duplicate matches
    pub fn merge(parts: Vec<ResourceResult>) -> ResourceResult {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        let mut markdown_parts = Vec::new();
        let mut stated_total = 0usize;
        let mut duplicates = 0usize;
        let mut breakdown = Breakdown::default();

        for part in parts {
            if !part.combined_markdown.trim().is_empty() {
                markdown_parts.push(part.combined_markdown);
            }
            stated_total += part.total_count;
            if let Some(b) = &part.breakdown {
                breakdown.merge(b);
            }
            for m in part.matches {
                if seen.insert(m.dedup_key()) {
                    matches.push(m);
                } else {
                    duplicates += 1;
                }
            }
        }

        let total_count = stated_total.saturating_sub(duplicates).max(matches.len());
        let breakdown = Some(breakdown).filter(|b| !b.is_empty());

        ResourceResult {
            combined_markdown: markdown_parts.join("\n\n"),
            matches,
            total_count,
            breakdown,
        }
    }
}

/// A recorded provider invocation made on behalf of the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default, alias = "arguments")]
    pub args: Map<String, Value>,
}

impl ToolCallRecord {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    /// String argument, trying each alias in order
    pub fn str_arg(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .find_map(|name| self.args.get(*name).and_then(Value::as_str))
            .map(str::trim)
    }
}

/// Consolidated result of one scope-aware search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSearch {
    pub query: String,
    pub scope_raw: String,
    pub scope_type: ScopeKind,
    /// `None` means nothing was found for that kind
    pub results: BTreeMap<ResourceKind, Option<ResourceResult>>,
    /// Records that reproduce this search when replayed
    pub tool_calls_issued: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_kinds: Vec<ResourceKind>,
}

impl AggregatedSearch {
    pub fn result(&self, kind: ResourceKind) -> Option<&ResourceResult> {
        self.results.get(&kind).and_then(Option::as_ref)
    }

    /// Kinds that produced something renderable
    pub fn populated_kinds(&self) -> Vec<ResourceKind> {
        self.results
            .iter()
            .filter_map(|(kind, result)| result.as_ref().map(|_| *kind))
            .collect()
    }

    pub fn total_count(&self) -> usize {
        self.results
            .values()
            .flatten()
            .map(|r| r.total_count)
            .sum()
    }

    /// Breakdown summed across every populated kind
    pub fn breakdown(&self) -> Breakdown {
        let mut combined = Breakdown::default();
        for result in self.results.values().flatten() {
            if let Some(b) = &result.breakdown {
                combined.merge(b);
            }
        }
        combined
    }

    pub fn is_empty(&self) -> bool {
        self.results.values().all(Option::is_none)
    }

    /// Every requested kind raised, as opposed to merely finding nothing
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.failed_kinds.len() == self.results.len()
    }
}

/// Text of a single passage lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageResult {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verse: Option<u32>,
    pub raw_content: String,
    pub resource: String,
    pub language: String,
    pub organization: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_extracts_reference_fields() {
        let m = Match::new("John 3:16", "For God so loved the world");
        assert_eq!(m.book.as_deref(), Some("John"));
        assert_eq!(m.chapter, Some(3));
        assert_eq!(m.verse, Some(16));
        assert_eq!(m.to_markdown(), "**John 3:16** For God so loved the world");
    }

    #[test]
    fn test_match_for_non_reference_header() {
        let m = Match::new("Figures of Speech", "An article body");
        assert!(m.book.is_none());
        assert!(m.chapter.is_none());
        assert_eq!(m.reference, "Figures of Speech");
    }

    #[test]
    fn test_total_count_never_below_matches() {
        let matches = vec![Match::new("John 1:1", "a"), Match::new("John 1:2", "b")];
        let result = ResourceResult::new(String::new(), matches, Some(1), None);
        assert_eq!(result.total_count, 2);

        let stated = ResourceResult::new("text".into(), vec![], Some(42), None);
        assert_eq!(stated.total_count, 42);
        assert!(!stated.is_empty());
    }

    #[test]
    fn test_breakdown_from_matches() {
        let matches = vec![
            Match::new("John 1:1", "a"),
            Match::new("Genesis 1:1", "b"),
            Match::new("John 3:16", "c"),
            Match::new("love", "glossary entry"),
        ];
        let breakdown = Breakdown::from_matches(&matches);
        assert_eq!(breakdown.by_testament.get("NT"), Some(&2));
        assert_eq!(breakdown.by_testament.get("OT"), Some(&1));
        assert_eq!(breakdown.by_book.get("John"), Some(&2));
        assert_eq!(breakdown.by_book.len(), 2);
    }

    #[test]
    fn test_merge_deduplicates_and_sums() {
        let ot = ResourceResult::new(
            "**Genesis 1:1** In the beginning".into(),
            vec![Match::new("Genesis 1:1", "In the beginning")],
            Some(3),
            None,
        );
        let nt = ResourceResult::new(
            "**John 1:1** In the beginning was the Word".into(),
            vec![
                Match::new("John 1:1", "In the beginning was the Word"),
                Match::new("Genesis 1:1", "In the beginning"),
            ],
            None,
            None,
        );

        let merged = ResourceResult::merge(vec![ot, nt]);
        assert_eq!(merged.matches.len(), 2);
        // 3 + 2 stated, one duplicate removed
        assert_eq!(merged.total_count, 4);
        assert!(merged.combined_markdown.contains("Genesis 1:1"));
        assert!(merged.combined_markdown.contains("John 1:1"));
        let breakdown = merged.breakdown.unwrap();
        assert_eq!(breakdown.by_testament.get("OT"), Some(&2));
        assert_eq!(breakdown.by_testament.get("NT"), Some(&1));
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        let merged = ResourceResult::merge(vec![ResourceResult::default(), ResourceResult::default()]);
        assert!(merged.is_empty());
        assert!(merged.breakdown.is_none());
    }

    #[test]
    fn test_kind_parse_and_tools() {
        assert_eq!(ResourceKind::parse("Translation Notes"), Some(ResourceKind::Notes));
        assert_eq!(ResourceKind::parse("tw"), Some(ResourceKind::Words));
        assert_eq!(ResourceKind::parse("maps"), None);
        assert_eq!(
            ResourceKind::from_search_tool("search_translation_academy"),
            Some(ResourceKind::Articles)
        );
        assert!(ResourceKind::Words.is_global());
        assert!(!ResourceKind::Notes.is_global());
    }

    #[test]
    fn test_resource_preference_applies_to_scripture_only() {
        let prefs = ResourcePreferences {
            resource: Some("ust".into()),
            ..ResourcePreferences::default()
        };
        assert_eq!(prefs.resource_for(ResourceKind::Scripture), "ust");
        assert_eq!(prefs.resource_for(ResourceKind::Notes), "tn");
    }

    #[test]
    fn test_tool_call_record_aliases() {
        let record: ToolCallRecord =
            serde_json::from_str(r#"{"name":"get_scripture_passage","arguments":{"reference":" John 3:16 "}}"#)
                .unwrap();
        assert_eq!(record.tool, "get_scripture_passage");
        assert_eq!(record.str_arg(&["ref", "reference"]), Some("John 3:16"));
    }
}
