//! Classifier agent: one LLM call over the whole table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::providers::openai;
use tracing::{debug, info};
use workflow::{Classifier, ClassifierRequest};

use super::{parse_json_reply, Completion, OaiAgent};
use crate::config::CleanerConfig;
use crate::prompts;

/// Build the analyzer agent (no tools; the table travels in the prompt).
pub fn build_analyzer(client: &openai::CompletionsClient, config: &CleanerConfig) -> OaiAgent {
    client
        .agent(&config.model)
        .name("analyzer")
        .description("Sorts contact rows into valid, auto-fixed and escalated buckets")
        .preamble(&prompts::analyzer_preamble())
        .temperature(config.temperature)
        .max_tokens(config.max_tokens)
        .build()
}

/// [`Classifier`] backed by a language model.
pub struct LlmClassifier {
    model: Box<dyn Completion>,
}

impl LlmClassifier {
    pub fn new(model: impl Completion + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }
}

/// User message for one classification run.
pub fn classification_task(request: &ClassifierRequest) -> Result<String> {
    let table = serde_json::to_string_pretty(request).context("Failed to encode rows")?;
    Ok(format!(
        "Analyse and clean the following contact table ({} rows).\n\n```json\n{table}\n```\n\n\
         Return valid_rows, auto_fixed and escalations covering every _row_number.",
        request.total_rows
    ))
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        "llm-analyzer"
    }

    async fn classify(&self, request: &ClassifierRequest) -> Result<serde_json::Value> {
        let task = classification_task(request)?;
        info!(
            rows = request.total_rows,
            prompt_version = prompts::PROMPT_VERSION,
            "Prompting analyzer"
        );
        let reply = self
            .model
            .complete(&task)
            .await
            .context("analyzer request failed")?;
        debug!(chars = reply.len(), "Analyzer replied");
        parse_json_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use workflow::Record;

    use super::*;
    use crate::agents::testing::ScriptedModel;

    fn request() -> ClassifierRequest {
        ClassifierRequest::new(&[Record::from_cells(1, Default::default())])
    }

    #[tokio::test]
    async fn test_reply_is_parsed_from_fence() {
        let reply = "分析完成：\n```json\n{\"total_rows\": 1, \"valid_rows\": [], \"auto_fixed\": [], \"escalations\": []}\n```";
        let classifier = LlmClassifier::new(ScriptedModel::replying(&[reply]));
        let value = classifier.classify(&request()).await.unwrap();
        assert_eq!(value["total_rows"], json!(1));
    }

    #[tokio::test]
    async fn test_prompt_carries_rows() {
        let model = std::sync::Arc::new(ScriptedModel::replying(&["{}"]));
        let classifier = LlmClassifier::new(model.clone());
        classifier.classify(&request()).await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"_row_number\": 1"));
        assert!(prompts[0].contains("(1 rows)"));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let classifier = LlmClassifier::new(ScriptedModel::failing("connection refused"));
        let err = classifier.classify(&request()).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("analyzer request failed"), "{message}");
        assert!(message.contains("connection refused"), "{message}");
    }

    #[tokio::test]
    async fn test_prose_only_reply_is_error() {
        let classifier = LlmClassifier::new(ScriptedModel::replying(&["Sorry, I can't."]));
        assert!(classifier.classify(&request()).await.is_err());
    }
}
