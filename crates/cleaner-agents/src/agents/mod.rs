//! LLM-backed collaborators.
//!
//! Each agent is built via a free function that returns an [`OaiAgent`].
//! Adapters talk to the model through [`Completion`] so they can be tested
//! with a scripted model.

pub mod analyzer;
pub mod resolver;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::Prompt;
use rig::providers::openai;

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// One prompt in, one text reply out.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: Completion + ?Sized> Completion for std::sync::Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}

#[async_trait]
impl Completion for OaiAgent {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response: String = self.prompt(prompt).await?;
        Ok(response)
    }
}

/// Extract a JSON object from a model reply.
///
/// Accepts a ```` ```json ```` fenced block, or falls back to the span from
/// the first `{` to the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Some(text[json_start..json_start + end].trim());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parse the JSON object in a model reply. Structure is not checked here;
/// the workflow gateways validate it.
pub fn parse_json_reply(text: &str) -> Result<serde_json::Value> {
    let block = extract_json_block(text).with_context(|| {
        format!(
            "model reply contains no JSON object: {}",
            preview(text, 200)
        )
    })?;
    serde_json::from_str(block).context("model reply is not valid JSON")
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Model stand-in that replays canned replies and records prompts.
    #[derive(Default)]
    pub struct ScriptedModel {
        pub replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Completion for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => anyhow::bail!(message),
                None => anyhow::bail!("no scripted reply left"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_block(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_bare_object_with_prose() {
        let text = "Result: {\"a\": {\"b\": 2}} hope this helps";
        assert_eq!(extract_json_block(text), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("} backwards {"), None);
    }

    #[test]
    fn test_parse_reply_errors() {
        let err = parse_json_reply("I could not do it").unwrap_err();
        assert!(err.to_string().contains("no JSON object"));

        let err = parse_json_reply("{not json}").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("短文本", 10), "短文本");
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
