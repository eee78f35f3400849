//! Raw model interaction log.
//!
//! Every prompt sent to the model and the text it returned is written to its
//! own file, `claude_interaction_{timestamp}_{type}.json`, independent of the
//! session documents.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const PREVIEW_CHARS: usize = 200;

/// One logged exchange with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// `%Y%m%d_%H%M%S` local time
    pub timestamp: String,
    /// What kind of call produced this exchange
    #[serde(rename = "type")]
    pub kind: String,
    /// Prompt sent
    pub input: String,
    /// Text returned
    pub output: String,
}

/// Append-only directory of interaction records.
#[derive(Debug, Clone)]
pub struct InteractionLog {
    dir: PathBuf,
}

impl InteractionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one interaction record and return its path.
    ///
    /// Two records of the same kind written within one second share a file
    /// name; the later one wins.
    pub async fn record(&self, prompt: &str, response: &str, kind: &str) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = self
            .dir
            .join(format!("claude_interaction_{}_{}.json", timestamp, kind));

        tracing::info!(
            kind = %kind,
            input = %preview(prompt),
            output = %preview(response),
            "Logging model interaction"
        );

        let interaction = Interaction {
            timestamp,
            kind: kind.to_string(),
            input: prompt.to_string(),
            output: response.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, serde_json::to_string_pretty(&interaction)?).await?;
        Ok(path)
    }
}

/// First 200 characters followed by an ellipsis.
fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let log = InteractionLog::new(dir.path().join("interactions"));

        let path = log
            .record("the prompt", "the answer", "single_iteration_analysis")
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("claude_interaction_"));
        assert!(name.ends_with("_single_iteration_analysis.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        let interaction: Interaction = serde_json::from_str(&raw).unwrap();
        assert_eq!(interaction.kind, "single_iteration_analysis");
        assert_eq!(interaction.input, "the prompt");
        assert_eq!(interaction.output, "the answer");
        assert_eq!(interaction.timestamp.len(), "20241101_192023".len());
    }

    #[test]
    fn test_preview_is_char_bounded() {
        let long = "é".repeat(500);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short...");
    }
}
