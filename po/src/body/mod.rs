//! Body - the capability bundle sequences execute through
//!
//! Sequences never touch vendor SDKs, the file system or subprocesses
//! directly; everything goes through the Body. Body calls are the only
//! suspension points in a run and each one observes the run's cancel token
//! and per-call timeout.
//!
//! # Modules
//!
//! - [`llm`] - LLM client trait, HTTP client, deterministic mocks
//! - [`fs`] - sandboxed per-run file system
//! - [`prompt`] - prompt template read/render
//! - [`script`] - script-to-callable executor
//! - [`formatter`] - parse/wrap/select helpers
//! - [`compose`] - composition of sub-callables per plan records
//! - [`perception`] - the sign/content bijection
//! - [`paradigm`] - instruction_fn assembly for imperatives/judgements
//! - [`user_input`] - cancellable user prompts

pub mod compose;
pub mod error;
pub mod formatter;
pub mod fs;
pub mod llm;
pub mod paradigm;
pub mod perception;
pub mod prompt;
pub mod script;
pub mod user_input;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

pub use compose::{ComposeStep, Composer};
pub use error::ToolError;
pub use formatter::Formatter;
pub use fs::FileSystem;
pub use llm::{FnLlmClient, GenerateOptions, HttpLlmClient, LlmClient, MockLlmClient};
pub use paradigm::{InstructionContext, ParadigmName, ParadigmRegistry, ParadigmSpec};
pub use prompt::PromptTool;
pub use script::ScriptRunner;
pub use user_input::{DeniedUserInput, QueuedUserInput, UserInput};

/// Cooperative cancellation shared by a run and all its Body calls
#[derive(Clone, Default)]
pub struct CancelToken(Arc<CancelInner>);

#[derive(Default)]
struct CancelInner {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.0.fired.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.fired.load(Ordering::SeqCst)
    }

    /// Resolves once the token fires; immediately if it already has
    pub async fn wait(&self) {
        while !self.is_cancelled() {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                break;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("fired", &self.is_cancelled())
            .finish()
    }
}

/// The capability bundle handed to every sequence execution
#[derive(Clone)]
pub struct Body {
    pub llm: Arc<dyn LlmClient>,
    pub file_system: FileSystem,
    pub prompt_tool: PromptTool,
    pub script_runner: ScriptRunner,
    pub formatter: Formatter,
    pub composer: Composer,
    pub user_input: Arc<dyn UserInput>,
    pub paradigms: Arc<ParadigmRegistry>,
    pub cancel: CancelToken,
    pub call_timeout: Duration,
}

impl Body {
    /// LLM call guarded by the run's cancel token and per-call timeout
    pub async fn guarded_generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, ToolError> {
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        tokio::select! {
            result = self.llm.generate(prompt, options) => result,
            _ = self.cancel.wait() => Err(ToolError::Cancelled),
            _ = tokio::time::sleep(self.call_timeout) => Err(ToolError::LlmTimeout(self.call_timeout)),
        }
    }

    /// User prompt guarded the same way
    pub async fn guarded_user_input(&self, text: &str) -> Result<String, ToolError> {
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        tokio::select! {
            result = self.user_input.prompt(text) => result,
            _ = self.cancel.wait() => Err(ToolError::Cancelled),
            _ = tokio::time::sleep(self.call_timeout) => Err(ToolError::UserInputCancelled),
        }
    }
}

/// Builder wiring a Body for one run
pub struct BodyBuilder {
    sandbox: PathBuf,
    read_roots: Vec<PathBuf>,
    llm: Arc<dyn LlmClient>,
    user_input: Arc<dyn UserInput>,
    paradigm_dir: Option<PathBuf>,
    interpreter: Option<String>,
    cancel: CancelToken,
    call_timeout: Duration,
}

impl BodyBuilder {
    pub fn new(sandbox: &Path, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            sandbox: sandbox.to_path_buf(),
            read_roots: Vec::new(),
            llm,
            user_input: Arc::new(DeniedUserInput),
            paradigm_dir: None,
            interpreter: None,
            cancel: CancelToken::new(),
            call_timeout: Duration::from_secs(300),
        }
    }

    /// A body over a mock LLM (tests, credential-free development)
    pub fn mock(sandbox: &Path) -> Self {
        Self::new(sandbox, Arc::new(MockLlmClient::new()))
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_read_root(mut self, root: &Path) -> Self {
        self.read_roots.push(root.to_path_buf());
        self
    }

    pub fn with_user_input(mut self, user_input: Arc<dyn UserInput>) -> Self {
        self.user_input = user_input;
        self
    }

    pub fn with_paradigm_dir(mut self, dir: &Path) -> Self {
        self.paradigm_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn build(self) -> Body {
        let mut file_system = FileSystem::new(self.sandbox);
        for root in self.read_roots {
            file_system = file_system.with_read_root(root);
        }

        let formatter = Formatter::new();
        let composer = Composer::new(Arc::clone(&self.llm), formatter.clone());
        let mut script_runner = ScriptRunner::new(file_system.clone());
        if let Some(interpreter) = self.interpreter {
            script_runner = script_runner.with_interpreter(interpreter);
        }
        let paradigms = match &self.paradigm_dir {
            Some(dir) => ParadigmRegistry::load_dir(dir).unwrap_or_default(),
            None => ParadigmRegistry::new(),
        };

        Body {
            llm: self.llm,
            prompt_tool: PromptTool::new(file_system.clone()),
            script_runner,
            formatter,
            composer,
            user_input: self.user_input,
            paradigms: Arc::new(paradigms),
            cancel: self.cancel,
            call_timeout: self.call_timeout,
            file_system,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cancel_token_wait() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
            true
        });

        token.fire();
        assert!(token.is_cancelled());
        assert!(handle.await.unwrap());
        // Waiting on an already-fired token resolves immediately
        token.wait().await;
    }

    #[tokio::test]
    async fn test_guarded_generate_cancel() {
        let temp = tempdir().unwrap();
        let body = BodyBuilder::mock(temp.path()).build();
        body.cancel.fire();

        let err = body
            .guarded_generate("prompt", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    #[tokio::test]
    async fn test_guarded_generate_passthrough() {
        let temp = tempdir().unwrap();
        let body = BodyBuilder::mock(temp.path())
            .with_llm(MockLlmClient::new().with_exact("q", "a").into_arc())
            .build();

        let out = body.guarded_generate("q", &GenerateOptions::default()).await.unwrap();
        assert_eq!(out, "a");
    }
}
