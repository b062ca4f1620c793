//! Tool-call replay
//!
//! Re-executes the records persisted with a turn so history can be
//! redisplayed without asking the LLM again. Replaying a record runs the
//! exact code path a live call runs, so the outputs are identical.

use super::tools::{ToolCall, ToolExecutor, ToolOutput};
use super::types::{AggregatedSearch, PassageResult, ResourcePreferences, ToolCallRecord};
use crate::errors::{AppError, Result};
use crate::metrics::record_replay;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Output of one replayed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedCall {
    /// Position of the record in the input list
    pub index: usize,
    pub tool: String,
    pub output: ToolOutput,
}

/// A record that produced nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCall {
    pub index: usize,
    pub tool: String,
    pub reason: String,
}

/// Everything a turn's records reproduce, in record order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayedTurn {
    pub calls: Vec<ReplayedCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedCall>,
}

impl ReplayedTurn {
    /// First passage among the outputs
    pub fn passage(&self) -> Option<&PassageResult> {
        self.calls.iter().find_map(|call| match &call.output {
            ToolOutput::Passage(passage) => Some(passage),
            _ => None,
        })
    }

    /// First aggregated search among the outputs
    pub fn search(&self) -> Option<&AggregatedSearch> {
        self.calls.iter().find_map(|call| match &call.output {
            ToolOutput::Search(search) => Some(search),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Replays recorded tool calls in parallel
#[derive(Clone)]
pub struct ToolCallReplayer {
    executor: ToolExecutor,
}

impl ToolCallReplayer {
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }

    /// Replay a turn's records
    ///
    /// Unknown tools and records with unusable arguments are skipped, and
    /// so are records whose execution failed; only cancellation is an error.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn replay(
        &self,
        records: &[ToolCallRecord],
        prefs: &ResourcePreferences,
        cancel: &CancellationToken,
    ) -> Result<ReplayedTurn> {
        let mut turn = ReplayedTurn::default();
        let mut runnable = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match ToolCall::parse(record) {
                Ok(call) => runnable.push((index, record, call)),
                Err(e @ AppError::UnknownTool { .. }) => {
                    debug!(tool = %record.tool, "Skipping unknown tool");
                    turn.skipped.push(skipped(index, record, e.to_string()));
                }
                Err(e) => {
                    warn!(
                        tool = %record.tool,
                        error = %e,
                        "Skipping record with invalid arguments"
                    );
                    turn.skipped.push(skipped(index, record, e.to_string()));
                }
            }
        }

        let executions = runnable
            .iter()
            .map(|(_, _, call)| self.executor.execute(call, prefs, cancel));
        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            outcomes = futures::future::join_all(executions) => outcomes,
        };

        for ((index, record, _), outcome) in runnable.into_iter().zip(outcomes) {
            match outcome {
                Ok(output) => turn.calls.push(ReplayedCall {
                    index,
                    tool: record.tool.clone(),
                    output,
                }),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(tool = %record.tool, error = %e, "Replayed call failed");
                    turn.skipped.push(skipped(index, record, e.to_string()));
                }
            }
        }

        turn.skipped.sort_by_key(|s| s.index);
        record_replay(turn.calls.len(), turn.skipped.len());
        info!(
            replayed = turn.calls.len(),
            skipped = turn.skipped.len(),
            "Replay complete"
        );

        Ok(turn)
    }
}

fn skipped(index: usize, record: &ToolCallRecord, reason: String) -> SkippedCall {
    SkippedCall {
        index,
        tool: record.tool.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvidersConfig;
    use crate::resources::tools::{GET_SCRIPTURE_PASSAGE, SEARCH_BIBLICAL_RESOURCES};
    use crate::resources::transport::MockTransport;
    use crate::resources::types::ResourceKind;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn transport() -> MockTransport {
        MockTransport::new()
            .respond_json(
                "/api/fetch-scripture",
                &[("reference", "John 3:16")],
                json!({"scripture": [{"text": "For God so loved the world", "translation": "ULT"}]}),
            )
            .respond_json(
                "/api/fetch-scripture",
                &[("testament", "NT")],
                json!({"results": [{"reference": "John 3:16", "text": "God so **loved**"}]}),
            )
            .respond_json(
                "/api/translation-notes",
                &[("testament", "NT")],
                json!({"notes": [{"reference": "John 3:16", "note": "The word **love** here"}]}),
            )
            .respond_status("/api/translation-words", &[], 502)
    }

    fn replayer(transport: MockTransport) -> (ToolCallReplayer, ToolExecutor) {
        let executor = ToolExecutor::standard(Arc::new(transport), &ProvidersConfig::default());
        (ToolCallReplayer::new(executor.clone()), executor)
    }

    fn record(value: serde_json::Value) -> ToolCallRecord {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_replayed_passage_matches_live_call() {
        let (replayer, executor) = replayer(transport());
        let prefs = ResourcePreferences::default();
        let cancel = CancellationToken::new();

        let turn = replayer
            .replay(
                &[record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {"reference": "John 3:16"}}))],
                &prefs,
                &cancel,
            )
            .await
            .unwrap();

        let passage = turn.passage().unwrap();
        assert_eq!(passage.reference, "John 3:16");
        assert!(!passage.raw_content.is_empty());

        let live = executor.scripture().fetch_passage("John 3:16", &prefs).await.unwrap();
        assert_eq!(passage, &live);
    }

    #[tokio::test]
    async fn test_replaying_issued_calls_reproduces_live_aggregate() {
        let (replayer, executor) = replayer(transport());
        let prefs = ResourcePreferences::default();
        let cancel = CancellationToken::new();

        let live = executor
            .aggregator()
            .aggregate(
                "love",
                "NT",
                &[ResourceKind::Scripture, ResourceKind::Notes, ResourceKind::Words],
                &prefs,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(live.failed_kinds, vec![ResourceKind::Words]);

        let turn = replayer.replay(&live.tool_calls_issued, &prefs, &cancel).await.unwrap();
        let replayed = turn.search().unwrap();

        assert_eq!(replayed, &live);
        assert_eq!(
            serde_json::to_string(replayed).unwrap(),
            serde_json::to_string(&live).unwrap()
        );
    }

    #[tokio::test]
    async fn test_replay_uses_recorded_translation_not_current_preference() {
        let transport = MockTransport::new()
            .respond_json(
                "/api/fetch-scripture",
                &[("resource", "ult")],
                json!({"results": [{"reference": "John 3:16", "text": "ULT text"}]}),
            )
            .respond_json(
                "/api/fetch-scripture",
                &[("resource", "ust")],
                json!({"results": [{"reference": "John 3:16", "text": "UST text"}]}),
            );
        let (replayer, executor) = replayer(transport);
        let cancel = CancellationToken::new();

        let live = executor
            .aggregator()
            .aggregate("", "John 3:16", &[ResourceKind::Scripture], &ResourcePreferences::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(live.result(ResourceKind::Scripture).unwrap().matches[0].raw_content, "ULT text");

        let later = ResourcePreferences {
            resource: Some("ust".into()),
            ..ResourcePreferences::default()
        };
        let turn = replayer.replay(&live.tool_calls_issued, &later, &cancel).await.unwrap();

        assert_eq!(turn.search().unwrap(), &live);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_records_are_skipped() {
        let (replayer, _) = replayer(transport());

        let turn = replayer
            .replay(
                &[
                    record(json!({"tool": "show_map", "args": {}})),
                    record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {"reference": "John 3:16"}})),
                    record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {}})),
                    record(json!({"tool": SEARCH_BIBLICAL_RESOURCES, "args": {"resources": ["maps"]}})),
                ],
                &ResourcePreferences::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(turn.calls.len(), 1);
        assert_eq!(turn.calls[0].index, 1);
        assert_eq!(
            turn.skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        assert_eq!(turn.skipped[0].reason, "Unknown tool: show_map");
    }

    #[tokio::test]
    async fn test_failed_passage_is_skipped_not_raised() {
        let (replayer, _) = replayer(transport());

        let turn = replayer
            .replay(
                &[record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {"reference": "Jude 1:99"}}))],
                &ResourcePreferences::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(turn.is_empty());
        assert_eq!(turn.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_replay() {
        let (replayer, _) = replayer(transport().with_latency(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = replayer
            .replay(
                &[record(json!({"tool": GET_SCRIPTURE_PASSAGE, "args": {"reference": "John 3:16"}}))],
                &ResourcePreferences::default(),
                &cancel,
            )
            .await;
        assert!(matches!(outcome, Err(AppError::Cancelled)));
    }
}
