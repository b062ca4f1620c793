//! Response dialects spoken by upstream providers
//!
//! Every provider answers in one of three shapes:
//! - JSON with a list of matches under a provider-specific field
//! - JSON with a single object of scalar fields
//! - Prose whose sections are delimited by `##` / `###` headers
//!
//! [`Payload::classify`] picks the variant from the content type and the
//! body shape; each adapter then maps the variant onto a `ResourceResult`.

use super::transport::ProviderResponse;
use super::types::{Breakdown, Match};
use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Classified provider payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// List of match objects plus the envelope they arrived in
    JsonMatches {
        items: Vec<Value>,
        envelope: Map<String, Value>,
    },
    /// Single object with scalar fields
    JsonScalar(Map<String, Value>),
    /// Markdown prose
    MarkdownSections(MarkdownDoc),
}

impl Payload {
    /// Classify a response; `list_fields` names the array fields this
    /// provider uses for its matches, in preference order.
    pub fn classify(
        response: &ProviderResponse,
        list_fields: &[&str],
        source_name: &str,
    ) -> Result<Self> {
        let body = response.body.trim();
        let declared_json = response
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        let looks_json = body.starts_with('{') || body.starts_with('[');

        if !declared_json && !looks_json {
            return Ok(Payload::MarkdownSections(MarkdownDoc::parse(body)));
        }

        // Undeclared bodies are only guessed to be JSON; prose such as a
        // leading markdown link falls back to sections
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) if !declared_json => {
                return Ok(Payload::MarkdownSections(MarkdownDoc::parse(body)))
            }
            Err(e) => {
                return Err(AppError::MalformedPayload {
                    source_name: source_name.to_string(),
                    message: e.to_string(),
                })
            }
        };

        match value {
            Value::Array(items) => Ok(Payload::JsonMatches {
                items,
                envelope: Map::new(),
            }),
            Value::Object(mut object) => {
                let list = list_fields
                    .iter()
                    .find(|field| object.get(**field).map(Value::is_array).unwrap_or(false))
                    .copied();
                match list.and_then(|field| object.remove(field)) {
                    Some(Value::Array(items)) => Ok(Payload::JsonMatches {
                        items,
                        envelope: object,
                    }),
                    _ => Ok(Payload::JsonScalar(object)),
                }
            }
            Value::String(text) => Ok(Payload::MarkdownSections(MarkdownDoc::parse(&text))),
            other => Err(AppError::MalformedPayload {
                source_name: source_name.to_string(),
                message: format!("unexpected top-level JSON value: {}", other),
            }),
        }
    }
}

/// One `##`/`###` section; the heading is the match reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownSection {
    pub heading: String,
    pub body: String,
}

/// Markdown split on section headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownDoc {
    /// Full text, kept verbatim as the combined markdown
    pub text: String,
    /// Everything before the first section header
    pub preamble: String,
    pub sections: Vec<MarkdownSection>,
}

impl MarkdownDoc {
    /// Split on `##`/`###` headers outside fenced code blocks
    pub fn parse(text: &str) -> Self {
        let mut preamble = Vec::new();
        let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
        let mut in_fence = false;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
            }

            let heading = if in_fence { None } else { section_heading(trimmed) };
            match (heading, sections.last_mut()) {
                (Some(heading), _) => sections.push((heading, Vec::new())),
                (None, Some((_, body))) => body.push(line),
                (None, None) => preamble.push(line),
            }
        }

        Self {
            text: text.trim().to_string(),
            preamble: preamble.join("\n").trim().to_string(),
            sections: sections
                .into_iter()
                .map(|(heading, body)| MarkdownSection {
                    heading,
                    body: body.join("\n").trim().to_string(),
                })
                .collect(),
        }
    }

    /// One match per non-empty section
    pub fn to_matches(&self) -> Vec<Match> {
        self.sections
            .iter()
            .filter(|s| !s.heading.is_empty() && !s.body.is_empty())
            .map(|s| Match::new(s.heading.clone(), s.body.clone()).with_terms(bold_terms(&s.body)))
            .collect()
    }

    /// Match count stated in the preamble ("Found 42 matches"), if any
    pub fn stated_total(&self) -> Option<usize> {
        stated_total_pattern()
            .captures(&self.preamble)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

fn section_heading(line: &str) -> Option<String> {
    let rest = line
        .strip_prefix("### ")
        .or_else(|| line.strip_prefix("## "))?;
    Some(rest.trim().trim_end_matches('#').trim().to_string())
}

fn bold_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("bold pattern is valid"))
}

fn stated_total_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s+(?:total\s+)?(?:matches|results|occurrences|verses)")
            .expect("total pattern is valid")
    })
}

/// Distinct `**bold**` spans; providers bold the terms that matched
pub fn bold_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for caps in bold_pattern().captures_iter(text) {
        if let Some(term) = caps.get(1).map(|m| m.as_str().trim().to_string()) {
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
    }
    terms
}

/// First non-empty string (or number) among the given fields
pub fn first_str(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match object.get(*field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// String list from the first matching array field
pub fn str_list(object: &Map<String, Value>, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Stated total, looked up at top level and inside `statistics`/`stats`
pub fn stated_count(object: &Map<String, Value>, fields: &[&str]) -> Option<usize> {
    let lookup = |obj: &Map<String, Value>| {
        fields
            .iter()
            .find_map(|field| obj.get(*field).and_then(Value::as_u64))
            .map(|n| n as usize)
    };

    lookup(object).or_else(|| {
        ["statistics", "stats"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_object))
            .and_then(lookup)
    })
}

/// Upstream breakdown, when the provider computes one
pub fn stated_breakdown(object: &Map<String, Value>) -> Option<Breakdown> {
    let stats = ["statistics", "stats", "breakdown"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_object))
        .unwrap_or(object);

    let counts = |field: &str| -> BTreeMap<String, usize> {
        stats
            .get(field)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n as usize)))
                    .collect()
            })
            .unwrap_or_default()
    };

    let breakdown = Breakdown {
        by_testament: counts("byTestament"),
        by_book: counts("byBook"),
    };
    Some(breakdown).filter(|b| !b.is_empty())
}

/// Combined markdown synthesized from matches
pub fn synthesize_markdown(matches: &[Match]) -> String {
    matches
        .iter()
        .map(Match::to_markdown)
        .collect::<Vec<_>>()
        .join("\n\n")
}
