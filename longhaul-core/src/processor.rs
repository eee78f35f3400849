//! Iteration processor: one model call per request, appended to the session.
//!
//! There is no loop here. Running a session for N iterations means calling
//! [`IterationProcessor::process`] N times.

use std::sync::Arc;
use std::time::Duration;

use crate::interactions::InteractionLog;
use crate::llm::CompletionClient;
use crate::store::SessionStore;
use crate::types::{Iteration, Session};
use crate::{Error, Result};

/// How many prior analyses are handed back to the model.
pub const CONTEXT_WINDOW: usize = 3;

/// Interaction log type for iteration calls.
pub const INTERACTION_KIND: &str = "single_iteration_analysis";

const INSTRUCTIONS: &str = "\
Please continue analyzing this task. Take your time to think deeply. Consider:

1. What new insights or perspectives can you add?
2. What aspects need deeper investigation?
3. What patterns or connections are emerging?
4. You should think deeply and choose sub-tasks to investigate and keep doing this until you are confident that you have a good understanding of the task.
5. LIST NEXT STEPS to investigate the task.
6. Your job is to solve the task. You are a world class expert in your field. You are also a great problem solver. You are also a great thinker. You are also a great writer. You are also a great researcher. You are also a great analyst. You are also a great thinker. You are also a great writer. You are also a great researcher. You are also a great analyst. You are also a great thinker. You are also a great writer. You are also a great researcher. You are also a great analyst.
7. For any external collaboration or experiment you want to do, just assume how you would do it and what the results would be. You do not have access to the real world, but you can imagine how you would do it.
8. You can even write the code to simulate the experiment and see what the results would be.
9. Everytime you suggest a next step, ACTION ON IT and dig deeper and recursively. PICK ONLY ONE (MOST IMPORTANT) ACTION TO GO DEEPER ON.
Remember: This is a long-term analysis. You have months to complete this task. DO NOT rush. Take time to reflect carefully and build on previous insights.";

/// Last [`CONTEXT_WINDOW`] analyses, oldest first, separated by a blank line.
pub fn select_context(session: &Session) -> String {
    session.recent_analyses(CONTEXT_WINDOW).join("\n\n")
}

/// Directive prompt for the next iteration.
pub fn build_prompt(task: &str, context: &str) -> String {
    format!("Task: {task}\n\nPrevious Analysis Context:\n{context}\n\n{INSTRUCTIONS}")
}

/// Produces the next analysis increment for a session.
pub struct IterationProcessor {
    store: SessionStore,
    client: Arc<dyn CompletionClient>,
    interactions: InteractionLog,
    pacing: Duration,
}

impl IterationProcessor {
    pub fn new(
        store: SessionStore,
        client: Arc<dyn CompletionClient>,
        interactions: InteractionLog,
        pacing: Duration,
    ) -> Self {
        Self {
            store,
            client,
            interactions,
            pacing,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run one iteration for `session_id`.
    ///
    /// The session document is only touched after the model call succeeds, so
    /// a failed call leaves the history exactly as it was.
    pub async fn process(&self, session_id: &str) -> Result<Iteration> {
        tracing::info!(session_id = %session_id, "Processing next iteration");
        self.store.read(session_id).await?;

        if !self.pacing.is_zero() {
            tracing::info!(
                session_id = %session_id,
                wait_secs = self.pacing.as_secs_f64(),
                "Waiting before processing"
            );
            tokio::time::sleep(self.pacing).await;
        }

        // Re-read after the wait so prompt updates made meanwhile are seen.
        let session = self.store.read(session_id).await?;
        let context = select_context(&session);
        let prompt = build_prompt(&session.task, &context);

        tracing::info!(
            session_id = %session_id,
            context_chars = context.len(),
            "Sending request to Claude"
        );
        let text = match self.client.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Claude API error");
                return Err(match e {
                    Error::Llm(msg) => Error::Llm(msg),
                    other => Error::Llm(other.to_string()),
                });
            }
        };
        tracing::info!(session_id = %session_id, "Received response from Claude");

        if let Err(e) = self
            .interactions
            .record(&prompt, &text, INTERACTION_KIND)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to log interaction");
        }

        let mut session = self
            .store
            .append_iteration(session_id, Iteration::analysis(text))
            .await?;
        let record = session
            .iterations
            .pop()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        tracing::info!(session_id = %session_id, "Iteration complete");
        Ok(record)
    }

    /// Run [`process`](Self::process) on its own task and wait for it.
    ///
    /// Dropping the returned future does not cancel the iteration: once
    /// started it runs to completion and its record is appended.
    pub async fn process_detached(self: &Arc<Self>, session_id: &str) -> Result<Iteration> {
        let processor = Arc::clone(self);
        let id = session_id.to_string();
        tokio::spawn(async move { processor.process(&id).await })
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }
}
