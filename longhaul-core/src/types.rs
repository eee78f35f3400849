//! Core domain types for longhaul
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One persisted analysis task plus its ordered history of iterations |
//! | **Iteration** | One appended record: model analysis or an operator prompt update |
//! | **Context window** | The last few analysis-typed iteration contents handed back to the model |
//!
//! Timestamps are local wall-clock time without an offset, serialized as
//! ISO-8601 with microsecond precision (`2024-11-01T19:20:23.123456`).

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// Status written into every new session document.
///
/// Nothing in this crate moves a session out of this state.
pub const STATUS_IN_PROGRESS: &str = "in_progress";

/// Current local time truncated to microseconds.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

// ============================================
// Session
// ============================================

/// One analysis session, stored as `{session_id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Timestamp-derived identifier, also the filename stem
    pub session_id: String,
    /// What the analysis is trying to achieve
    pub task: String,
    /// Append-only history, insertion order is meaningful
    pub iterations: Vec<Iteration>,
    /// When the session was created
    pub start_time: NaiveDateTime,
    /// Free-text status
    pub status: String,
}

impl Session {
    /// A fresh session with no iterations.
    pub fn new(session_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            task: task.into(),
            iterations: Vec::new(),
            start_time: now_local(),
            status: STATUS_IN_PROGRESS.to_string(),
        }
    }

    /// Contents of the last `n` analysis iterations, oldest first.
    ///
    /// Prompt updates are skipped, they never count toward the window.
    pub fn recent_analyses(&self, n: usize) -> Vec<&str> {
        let analyses: Vec<&str> = self
            .iterations
            .iter()
            .filter(|it| it.kind == IterationKind::Analysis)
            .map(|it| it.content.as_str())
            .collect();
        let skip = analyses.len().saturating_sub(n);
        analyses.into_iter().skip(skip).collect()
    }

    /// Number of model-generated iterations so far.
    pub fn analysis_count(&self) -> usize {
        self.iterations
            .iter()
            .filter(|it| it.kind == IterationKind::Analysis)
            .count()
    }
}

// ============================================
// Iteration
// ============================================

/// What produced an iteration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationKind {
    /// Model-generated analysis text
    Analysis,
    /// Operator-supplied steering text
    SystemPromptUpdate,
}

impl IterationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationKind::Analysis => "analysis",
            IterationKind::SystemPromptUpdate => "system_prompt_update",
        }
    }
}

impl std::fmt::Display for IterationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// When the record was appended
    pub timestamp: NaiveDateTime,
    /// Record type
    #[serde(rename = "type")]
    pub kind: IterationKind,
    /// Model output or operator prompt text
    pub content: String,
}

impl Iteration {
    /// A record stamped with the current time.
    pub fn new(kind: IterationKind, content: impl Into<String>) -> Self {
        Self {
            timestamp: now_local(),
            kind,
            content: content.into(),
        }
    }

    pub fn analysis(content: impl Into<String>) -> Self {
        Self::new(IterationKind::Analysis, content)
    }

    pub fn system_prompt_update(content: impl Into<String>) -> Self {
        Self::new(IterationKind::SystemPromptUpdate, content)
    }
}
