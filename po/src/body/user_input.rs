//! User-input capability
//!
//! Interactive surfaces live outside the orchestrator; sequences only see
//! this trait. Server deployments use the queued implementation seeded from
//! the run request; the denying implementation is the default when no
//! user-input tool is configured.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::ToolError;

/// Cancellable user-input prompt
#[async_trait]
pub trait UserInput: Send + Sync {
    async fn prompt(&self, text: &str) -> Result<String, ToolError>;
}

/// Answers prompts from a pre-seeded queue; empty queue cancels
pub struct QueuedUserInput {
    answers: Mutex<VecDeque<String>>,
}

impl QueuedUserInput {
    pub fn new(answers: Vec<String>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl UserInput for QueuedUserInput {
    async fn prompt(&self, _text: &str) -> Result<String, ToolError> {
        let mut answers = self.answers.lock().unwrap_or_else(|p| p.into_inner());
        answers.pop_front().ok_or(ToolError::UserInputCancelled)
    }
}

/// Refuses every prompt (no user-input tool bound to the run)
pub struct DeniedUserInput;

#[async_trait]
impl UserInput for DeniedUserInput {
    async fn prompt(&self, _text: &str) -> Result<String, ToolError> {
        Err(ToolError::UserInputCancelled)
    }
}
