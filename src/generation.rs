//! Per-session generation state.
//!
//! A [`CopilotSession`] owns everything one user sees: the selected tool, the
//! prompt, the last generated result and the number of successful generations.
//! A generation is split into [`CopilotSession::begin_generation`], which
//! validates and marks the session busy, and
//! [`CopilotSession::finish_generation`], which records the outcome. Callers
//! that can hold the session across the call use [`CopilotSession::generate`].

use crate::completion::{self, CompletionClient, CompletionRequest};
use crate::config::Config;
use crate::errors::{CompletionError, GenerateError};
use crate::quota;
use crate::tools::Tool;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Generating,
    Completed,
    Failed,
}

/// Fixed parameters of every completion request.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub system_instruction: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    pub max_requests: u32,
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_instruction: config.completion.system_instruction().to_string(),
            temperature: config.completion.temperature,
            max_output_tokens: config.completion.max_tokens,
            timeout: Duration::from_secs(config.completion.timeout_secs),
            max_requests: config.max_requests,
        }
    }

    pub fn request_for(&self, prompt: &str) -> CompletionRequest {
        CompletionRequest {
            system_instruction: self.system_instruction.clone(),
            user_prompt: prompt.to_string(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Ticket for an accepted generation; hand it back to `finish_generation`.
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    pub id: u64,
    pub tool: Tool,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CopilotSession {
    tool: Tool,
    prompt: String,
    last_result: Option<String>,
    result_tool: Option<Tool>,
    last_error: Option<String>,
    request_count: u32,
    max_requests: u32,
    phase: Phase,
    in_flight: Option<PendingGeneration>,
    // Set by a reset while a call is in flight; that call's outcome is dropped.
    discard_in_flight: bool,
    next_generation_id: u64,
}

impl CopilotSession {
    pub fn new(tool: Tool, max_requests: u32) -> Self {
        Self {
            tool,
            prompt: tool.template().default_prompt.to_string(),
            last_result: None,
            result_tool: None,
            last_error: None,
            request_count: 0,
            max_requests,
            phase: Phase::Idle,
            in_flight: None,
            discard_in_flight: false,
            next_generation_id: 1,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// The tool that produced `last_result`.
    pub fn result_tool(&self) -> Option<Tool> {
        self.result_tool
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_generating(&self) -> bool {
        self.phase == Phase::Generating
    }

    pub fn in_flight(&self) -> Option<&PendingGeneration> {
        self.in_flight.as_ref()
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Switches tool and replaces the prompt with the tool's default.
    pub fn select_tool(&mut self, tool: Tool) -> Result<(), GenerateError> {
        if self.is_generating() {
            return Err(GenerateError::Busy);
        }
        self.tool = tool;
        self.prompt = tool.template().default_prompt.to_string();
        Ok(())
    }

    pub fn begin_generation(&mut self) -> Result<PendingGeneration, GenerateError> {
        if self.is_generating() {
            return Err(GenerateError::Busy);
        }
        if self.prompt.trim().is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }
        if !quota::allow(self.request_count, self.max_requests) {
            return Err(GenerateError::QuotaExceeded {
                limit: self.max_requests,
            });
        }

        let pending = PendingGeneration {
            id: self.next_generation_id,
            tool: self.tool,
            prompt: self.prompt.clone(),
            started_at: Utc::now(),
        };
        self.next_generation_id += 1;
        self.phase = Phase::Generating;
        self.in_flight = Some(pending.clone());
        Ok(pending)
    }

    /// Records the outcome of `pending`. Only successful calls count against
    /// the quota.
    pub fn finish_generation(
        &mut self,
        pending: &PendingGeneration,
        result: Result<String, CompletionError>,
    ) -> Result<String, GenerateError> {
        match &self.in_flight {
            Some(current) if current.id == pending.id => {}
            _ => return Err(GenerateError::Superseded),
        }
        self.in_flight = None;
        if std::mem::take(&mut self.discard_in_flight) {
            self.phase = Phase::Idle;
            return Err(GenerateError::Superseded);
        }

        match result {
            Ok(text) => {
                self.last_result = Some(text.clone());
                self.result_tool = Some(pending.tool);
                self.last_error = None;
                self.request_count = self.request_count.saturating_add(1);
                self.phase = Phase::Completed;
                Ok(text)
            }
            Err(e) => {
                let error = GenerateError::Completion(e);
                self.last_error = Some(error.to_string());
                self.phase = Phase::Failed;
                Err(error)
            }
        }
    }

    /// Makes one generation attempt with a single completion call.
    pub async fn generate(
        &mut self,
        client: &dyn CompletionClient,
        settings: &GenerationSettings,
    ) -> Result<String, GenerateError> {
        let pending = self.begin_generation()?;
        let request = settings.request_for(&pending.prompt);
        let result = completion::complete_with_timeout(client, &request, settings.timeout).await;
        self.finish_generation(&pending, result)
    }

    /// Clears the result, counter and prompt. A call that is still in flight
    /// keeps the session busy until it resolves, and its outcome is dropped.
    pub fn reset(&mut self) {
        self.last_result = None;
        self.result_tool = None;
        self.last_error = None;
        self.request_count = 0;
        self.prompt = self.tool.template().default_prompt.to_string();
        if self.in_flight.is_some() {
            self.discard_in_flight = true;
        } else {
            self.phase = Phase::Idle;
        }
    }

    pub fn view(&self) -> SessionView {
        let template = self.tool.template();
        let export = self.result_tool.unwrap_or(self.tool).template();
        SessionView {
            tool: self.tool,
            tool_label: template.label,
            result_tool: self.result_tool,
            result_label: self.result_tool.map(|tool| tool.template().label),
            prompt: self.prompt.clone(),
            last_result: self.last_result.clone(),
            last_error: self.last_error.clone(),
            request_count: self.request_count,
            max_requests: self.max_requests,
            remaining: quota::remaining(self.request_count, self.max_requests),
            phase: self.phase,
            is_generating: self.is_generating(),
            generating_since: self.in_flight.as_ref().map(|p| p.started_at),
            download_filename: export.download_filename(),
        }
    }
}

/// Read-only snapshot of a session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub tool: Tool,
    pub tool_label: &'static str,
    pub result_tool: Option<Tool>,
    pub result_label: Option<&'static str>,
    pub prompt: String,
    pub last_result: Option<String>,
    pub last_error: Option<String>,
    pub request_count: u32,
    pub max_requests: u32,
    pub remaining: u32,
    pub phase: Phase,
    pub is_generating: bool,
    pub generating_since: Option<DateTime<Utc>>,
    pub download_filename: String,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned results and counts how often it was called.
    pub struct ScriptedClient {
        results: Mutex<Vec<Result<String, CompletionError>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        pub fn new(results: Vec<Result<String, CompletionError>>) -> Self {
            Self {
                results: Mutex::new(results),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string()); 16])
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                actix_web::rt::time::sleep(delay).await;
            }
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Err(CompletionError::Transport("script exhausted".to_string()))
            } else {
                results.remove(0)
            }
        }
    }
}
