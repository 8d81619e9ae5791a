//! Handoff channel to the human operator.
//!
//! Everything that talks to the terminal goes through [`Handoff`], so the
//! console resolver, the agent resolver and the filename prompt can be driven
//! by a script in tests.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandoffError {
    /// The operator closed the input stream (EOF).
    #[error("input closed by operator")]
    Closed,
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("terminal reader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait Handoff: Send + Sync {
    /// Show text to the operator.
    fn show(&self, text: &str);

    /// Show `prompt` and wait for one line of input (without the newline).
    async fn ask(&self, prompt: &str) -> Result<String, HandoffError>;
}

/// Interactive handoff on stdin/stdout.
///
/// Reads happen on the blocking pool; a cancelled `ask` leaves the read
/// pending until the next line or process exit.
#[derive(Debug, Default)]
pub struct StdinHandoff;

#[async_trait]
impl Handoff for StdinHandoff {
    fn show(&self, text: &str) {
        println!("{text}");
    }

    async fn ask(&self, prompt: &str) -> Result<String, HandoffError> {
        {
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{prompt}")?;
            stdout.flush()?;
        }
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            let read = std::io::stdin().lock().read_line(&mut line)?;
            if read == 0 {
                return Err(HandoffError::Closed);
            }
            Ok(line.trim_end_matches(['\r', '\n']).to_string())
        })
        .await?
    }
}

/// Handoff that replays canned answers and records everything shown.
///
/// Runs out of answers the same way a closed terminal does.
#[derive(Debug, Default)]
pub struct ScriptedHandoff {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedHandoff {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Everything shown and asked so far, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or_default()
    }

    fn record(&self, text: &str) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push(text.to_string());
        }
    }
}

#[async_trait]
impl Handoff for ScriptedHandoff {
    fn show(&self, text: &str) {
        self.record(text);
    }

    async fn ask(&self, prompt: &str) -> Result<String, HandoffError> {
        self.record(prompt);
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .ok_or(HandoffError::Closed)
    }
}

/// Ask a yes/no question. Accepts y, yes and 是.
pub async fn confirm(handoff: &dyn Handoff, prompt: &str) -> Result<bool, HandoffError> {
    let answer = handoff.ask(prompt).await?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "是"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_answers_in_order() {
        let handoff = ScriptedHandoff::new(["first", "second"]);
        handoff.show("hello");
        assert_eq!(handoff.ask("q1> ").await.unwrap(), "first");
        assert_eq!(handoff.ask("q2> ").await.unwrap(), "second");
        assert!(matches!(
            handoff.ask("q3> ").await,
            Err(HandoffError::Closed)
        ));
        assert_eq!(handoff.transcript(), vec!["hello", "q1> ", "q2> ", "q3> "]);
    }

    #[tokio::test]
    async fn test_confirm_variants() {
        let handoff = ScriptedHandoff::new(["Y", "是", "no", ""]);
        assert!(confirm(&handoff, "?").await.unwrap());
        assert!(confirm(&handoff, "?").await.unwrap());
        assert!(!confirm(&handoff, "?").await.unwrap());
        assert!(!confirm(&handoff, "?").await.unwrap());
        assert_eq!(handoff.remaining(), 0);
    }
}
