//! Tool catalogue: parsing recorded calls and executing them

use super::aggregator::Aggregator;
use super::providers::{ProviderRegistry, ScriptureProvider};
use super::transport::ResourceTransport;
use super::types::{
    AggregatedSearch, PassageResult, ResourceKind, ResourcePreferences, ToolCallRecord,
};
use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const GET_SCRIPTURE_PASSAGE: &str = "get_scripture_passage";
pub const SEARCH_BIBLICAL_RESOURCES: &str = "search_biblical_resources";

const QUERY_ARGS: &[&str] = &["query", "filter", "searchTerm", "search_term"];
const REFERENCE_ARGS: &[&str] = &["reference", "scope", "passage"];
const RESOURCES_ARGS: &[&str] = &["resources", "resourceTypes", "kinds"];

/// Per-call overrides of the session preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl PreferenceOverrides {
    fn from_record(record: &ToolCallRecord) -> Self {
        let arg = |name: &str| {
            record
                .str_arg(&[name])
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            language: arg("language"),
            organization: arg("organization"),
            resource: arg("resource"),
        }
    }

    pub fn apply(&self, base: &ResourcePreferences) -> ResourcePreferences {
        ResourcePreferences {
            language: self.language.clone().unwrap_or_else(|| base.language.clone()),
            organization: self
                .organization
                .clone()
                .unwrap_or_else(|| base.organization.clone()),
            resource: self.resource.clone().or_else(|| base.resource.clone()),
        }
    }

    fn write_into(&self, args: &mut Map<String, Value>) {
        let fields = [
            ("language", &self.language),
            ("organization", &self.organization),
            ("resource", &self.resource),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                args.insert(name.to_string(), Value::String(value.clone()));
            }
        }
    }
}

/// A recognized tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    /// Text of a single passage
    Passage {
        reference: String,
        overrides: PreferenceOverrides,
    },
    /// Scope-aware aggregate across kinds; empty `kinds` means all
    Search {
        query: String,
        reference: String,
        kinds: Vec<ResourceKind>,
        overrides: PreferenceOverrides,
    },
}

impl ToolCall {
    /// Parse a record; tools this engine does not serve are `UnknownTool`
    pub fn parse(record: &ToolCallRecord) -> Result<Self> {
        let overrides = PreferenceOverrides::from_record(record);
        let text = |names: &[&str]| record.str_arg(names).unwrap_or_default().to_string();

        let call = match record.tool.as_str() {
            GET_SCRIPTURE_PASSAGE => {
                let reference = text(REFERENCE_ARGS);
                if reference.is_empty() {
                    return Err(AppError::MissingField {
                        field: "reference".to_string(),
                    });
                }
                ToolCall::Passage { reference, overrides }
            }
            SEARCH_BIBLICAL_RESOURCES => ToolCall::Search {
                query: text(QUERY_ARGS),
                reference: text(REFERENCE_ARGS),
                kinds: parse_kinds(record)?,
                overrides,
            },
            tool => match ResourceKind::from_search_tool(tool) {
                Some(kind) => ToolCall::Search {
                    query: text(QUERY_ARGS),
                    reference: text(REFERENCE_ARGS),
                    kinds: vec![kind],
                    overrides,
                },
                None => {
                    return Err(AppError::UnknownTool {
                        tool: tool.to_string(),
                    })
                }
            },
        };

        Ok(call)
    }

    pub fn to_record(&self) -> ToolCallRecord {
        let mut args = Map::new();
        match self {
            ToolCall::Passage { reference, overrides } => {
                args.insert("reference".into(), Value::String(reference.clone()));
                overrides.write_into(&mut args);
                ToolCallRecord::new(GET_SCRIPTURE_PASSAGE, args)
            }
            ToolCall::Search {
                query,
                reference,
                kinds,
                overrides,
            } => {
                args.insert("query".into(), Value::String(query.clone()));
                args.insert("reference".into(), Value::String(reference.clone()));
                args.insert(
                    "resources".into(),
                    json!(kinds.iter().map(ResourceKind::as_str).collect::<Vec<_>>()),
                );
                overrides.write_into(&mut args);
                ToolCallRecord::new(SEARCH_BIBLICAL_RESOURCES, args)
            }
        }
    }
}

/// `resources` as an array of names or one comma-separated string
fn parse_kinds(record: &ToolCallRecord) -> Result<Vec<ResourceKind>> {
    let Some(value) = RESOURCES_ARGS.iter().find_map(|name| record.args.get(*name)) else {
        return Ok(Vec::new());
    };

    let names: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(list) => list.split(',').collect(),
        Value::Null => Vec::new(),
        _ => {
            return Err(AppError::InvalidFormat {
                message: "resources must be a list of resource names".to_string(),
            })
        }
    };

    parse_kind_names(names)
}

/// Resolve kind names; "all" and blanks add nothing, so an empty result
/// means every kind
pub fn parse_kind_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<ResourceKind>> {
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("all"))
        .map(|name| {
            ResourceKind::parse(name).ok_or_else(|| AppError::Validation {
                message: format!("unknown resource kind '{}'", name),
                field: Some("resources".to_string()),
            })
        })
        .collect()
}

/// What executing a tool call produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Passage(PassageResult),
    Search(AggregatedSearch),
}

/// Runs tool calls against the provider adapters
#[derive(Clone)]
pub struct ToolExecutor {
    aggregator: Arc<Aggregator>,
    scripture: Arc<ScriptureProvider>,
}

impl ToolExecutor {
    pub fn new(aggregator: Arc<Aggregator>, scripture: Arc<ScriptureProvider>) -> Self {
        Self { aggregator, scripture }
    }

    /// Executor over the five standard adapters
    pub fn standard(transport: Arc<dyn ResourceTransport>, config: &ProvidersConfig) -> Self {
        let registry = ProviderRegistry::standard(transport.clone(), config);
        Self::new(
            Arc::new(Aggregator::new(registry)),
            Arc::new(ScriptureProvider::new(transport, config)),
        )
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn scripture(&self) -> &Arc<ScriptureProvider> {
        &self.scripture
    }

    pub async fn execute(
        &self,
        call: &ToolCall,
        prefs: &ResourcePreferences,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        match call {
            ToolCall::Passage { reference, overrides } => {
                let prefs = overrides.apply(prefs);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(AppError::Cancelled),
                    passage = self.scripture.fetch_passage(reference, &prefs) => {
                        passage.map(ToolOutput::Passage)
                    }
                }
            }
            ToolCall::Search {
                query,
                reference,
                kinds,
                overrides,
            } => self
                .aggregator
                .aggregate(query, reference, kinds, &overrides.apply(prefs), cancel)
                .await
                .map(ToolOutput::Search),
        }
    }

    /// Parse and execute a record
    pub async fn execute_record(
        &self,
        record: &ToolCallRecord,
        prefs: &ResourcePreferences,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let call = ToolCall::parse(record)?;
        self.execute(&call, prefs, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::transport::MockTransport;

    fn record(value: Value) -> ToolCallRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_passage() {
        let call = ToolCall::parse(&record(json!({
            "tool": GET_SCRIPTURE_PASSAGE,
            "args": {"reference": "John 3:16", "resource": "ust"}
        })))
        .unwrap();

        assert_eq!(
            call,
            ToolCall::Passage {
                reference: "John 3:16".into(),
                overrides: PreferenceOverrides {
                    resource: Some("ust".into()),
                    ..PreferenceOverrides::default()
                },
            }
        );
    }

    #[test]
    fn test_parse_search_variants() {
        let multi = ToolCall::parse(&record(json!({
            "tool": SEARCH_BIBLICAL_RESOURCES,
            "args": {"searchTerm": "grace", "scope": "NT", "resources": ["notes", "tw", "notes"]}
        })))
        .unwrap();
        match multi {
            ToolCall::Search { query, reference, kinds, .. } => {
                assert_eq!(query, "grace");
                assert_eq!(reference, "NT");
                assert_eq!(kinds, vec![ResourceKind::Notes, ResourceKind::Words, ResourceKind::Notes]);
            }
            other => panic!("unexpected call: {other:?}"),
        }

        let single = ToolCall::parse(&record(json!({
            "name": "search_translation_academy",
            "arguments": {"query": "metaphor"}
        })))
        .unwrap();
        assert!(matches!(single, ToolCall::Search { ref kinds, .. } if kinds == &[ResourceKind::Articles]));
    }

    #[test]
    fn test_unknown_tool_and_bad_args_are_errors() {
        let unknown = record(json!({"tool": "play_audio", "args": {}}));
        let err = ToolCall::parse(&unknown).unwrap_err();
        assert!(matches!(err, AppError::UnknownTool { ref tool } if tool == "play_audio"));
        assert_eq!(err.status_code().as_u16(), 400);

        let missing = record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {}}));
        assert!(matches!(ToolCall::parse(&missing), Err(AppError::MissingField { .. })));

        let bad_kind = record(json!({"tool": SEARCH_BIBLICAL_RESOURCES, "args": {"resources": "notes, maps"}}));
        assert!(matches!(ToolCall::parse(&bad_kind), Err(AppError::Validation { .. })));
    }

    #[test]
    fn test_to_record_round_trips_through_parse() {
        let call = ToolCall::Search {
            query: "love".into(),
            reference: "1 John".into(),
            kinds: vec![ResourceKind::Scripture],
            overrides: PreferenceOverrides {
                language: Some("es-419".into()),
                ..PreferenceOverrides::default()
            },
        };
        assert_eq!(ToolCall::parse(&call.to_record()).unwrap(), call);
    }

    #[test]
    fn test_overrides_apply() {
        let base = ResourcePreferences::default();
        let overrides = PreferenceOverrides {
            organization: Some("Door43".into()),
            ..PreferenceOverrides::default()
        };
        let prefs = overrides.apply(&base);
        assert_eq!(prefs.language, "en");
        assert_eq!(prefs.organization, "Door43");
    }

    #[tokio::test]
    async fn test_execute_record_passage() {
        let transport = Arc::new(MockTransport::new().respond_json(
            "/api/fetch-scripture",
            &[("reference", "John 3:16")],
            json!({"text": "For God so loved the world"}),
        ));
        let executor = ToolExecutor::standard(transport, &ProvidersConfig::default());

        let output = executor
            .execute_record(
                &record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {"reference": "John 3:16"}})),
                &ResourcePreferences::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match output {
            ToolOutput::Passage(passage) => assert_eq!(passage.reference, "John 3:16"),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_record_rejects_unknown_tool() {
        let executor = ToolExecutor::standard(Arc::new(MockTransport::new()), &ProvidersConfig::default());

        let err = executor
            .execute_record(
                &record(json!({"tool": "show_map", "args": {}})),
                &ResourcePreferences::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::UnknownTool);
    }

    #[test]
    fn test_parse_kind_names_accepts_all() {
        assert!(parse_kind_names(["all"]).unwrap().is_empty());
        assert!(parse_kind_names(["ALL", " "]).unwrap().is_empty());
        assert_eq!(
            parse_kind_names(["all", "notes"]).unwrap(),
            vec![ResourceKind::Notes]
        );
        assert!(matches!(
            parse_kind_names(["maps"]),
            Err(AppError::Validation { field: Some(ref f), .. }) if f == "resources"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_passage() {
        let transport = Arc::new(MockTransport::new());
        let executor = ToolExecutor::standard(transport, &ProvidersConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let call = ToolCall::Passage {
            reference: "John 1:1".into(),
            overrides: PreferenceOverrides::default(),
        };
        let err = executor
            .execute(&call, &ResourcePreferences::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
