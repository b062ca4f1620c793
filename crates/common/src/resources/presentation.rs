//! Presentation policies over an aggregated search
//!
//! Two ways of turning one `AggregatedSearch` into chat messages:
//! - `Consolidated`: a single message linking every populated kind
//! - `PerAgent`: one message per populated kind with a short preview

use super::types::{AggregatedSearch, ResourceKind, ResourceResult};
use serde::{Deserialize, Serialize};

const PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationPolicy {
    #[default]
    Consolidated,
    PerAgent,
}

/// Link from a chat message to the full resource listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub kind: ResourceKind,
    pub label: String,
    /// Reference the listing opens at
    pub reference: String,
    pub query: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedMessage {
    /// Kind this message speaks for; `None` for the consolidated message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<ResourceKind>,
    pub text: String,
    pub links: Vec<ResourceLink>,
}

/// Render a search under a policy
pub fn present(search: &AggregatedSearch, policy: PresentationPolicy) -> Vec<PresentedMessage> {
    match policy {
        PresentationPolicy::Consolidated => vec![consolidated(search)],
        PresentationPolicy::PerAgent => per_agent(search),
    }
}

fn consolidated(search: &AggregatedSearch) -> PresentedMessage {
    let links: Vec<ResourceLink> = populated(search)
        .map(|(kind, result)| ResourceLink {
            kind,
            label: kind.label().to_string(),
            reference: search.scope_raw.clone(),
            query: search.query.clone(),
            count: result.total_count,
        })
        .collect();

    let text = if links.is_empty() {
        format!("No resources found for \"{}\" in {}.", search.query, scope_label(search))
    } else {
        let summary = links
            .iter()
            .map(|link| format!("{} {}", link.count, link.label))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Found {} in {}.", summary, scope_label(search))
    };

    PresentedMessage {
        agent: None,
        text,
        links,
    }
}

/// Each link opens at that kind's first match rather than the whole scope
fn per_agent(search: &AggregatedSearch) -> Vec<PresentedMessage> {
    populated(search)
        .map(|(kind, result)| {
            let first = result.matches.first();
            let preview = first
                .map(|m| m.raw_content.as_str())
                .unwrap_or(result.combined_markdown.as_str());

            let text = match first.filter(|m| !m.reference.is_empty()) {
                Some(m) => format!(
                    "{} ({}) {}: {}",
                    kind.label(),
                    result.total_count,
                    m.reference,
                    truncate(preview)
                ),
                None => format!("{} ({}): {}", kind.label(), result.total_count, truncate(preview)),
            };

            PresentedMessage {
                agent: Some(kind),
                text,
                links: vec![ResourceLink {
                    kind,
                    label: kind.label().to_string(),
                    reference: first
                        .map(|m| m.reference.clone())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| search.scope_raw.clone()),
                    query: search.query.clone(),
                    count: result.total_count,
                }],
            }
        })
        .collect()
}

fn populated(search: &AggregatedSearch) -> impl Iterator<Item = (ResourceKind, &ResourceResult)> {
    search
        .results
        .iter()
        .filter_map(|(kind, result)| result.as_ref().map(|r| (*kind, r)))
}

fn scope_label(search: &AggregatedSearch) -> String {
    match search.scope_raw.trim() {
        "" => "the whole Bible".to_string(),
        scope => scope.to_string(),
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut.trim_end())
}
