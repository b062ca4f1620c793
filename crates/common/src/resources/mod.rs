//! Conversational resource aggregation
//!
//! Provides:
//! - The uniform match model every provider dialect is normalized into
//! - Provider adapters for scripture, notes, questions, words and articles
//! - Scope-aware parallel aggregation with per-kind failure isolation
//! - Tool-call execution and deterministic replay of recorded calls
//! - Presentation policies over an aggregated search

mod aggregator;
mod dialect;
mod presentation;
mod providers;
mod replay;
mod tools;
mod transport;
mod types;

pub use aggregator::Aggregator;
pub use dialect::{MarkdownDoc, MarkdownSection, Payload};
pub use presentation::{present, PresentationPolicy, PresentedMessage, ResourceLink};
pub use providers::{
    ArticlesProvider, NotesProvider, ProviderClient, ProviderRegistry, QuestionsProvider,
    ResourceProvider, ScopePolicy, ScriptureProvider, WordsProvider,
};
pub use replay::{ReplayedCall, ReplayedTurn, SkippedCall, ToolCallReplayer};
pub use tools::{
    parse_kind_names, PreferenceOverrides, ToolCall, ToolExecutor, ToolOutput,
    GET_SCRIPTURE_PASSAGE, SEARCH_BIBLICAL_RESOURCES,
};
pub use transport::{
    HttpTransport, MockTransport, ProviderRequest, ProviderResponse, ResourceTransport,
};
pub use types::{
    AggregatedSearch, Breakdown, Match, PassageResult, ResourceKind, ResourcePreferences,
    ResourceResult, ToolCallRecord,
};
