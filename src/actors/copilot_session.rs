use crate::actors::health::{HealthActor, ReportCompletion};
use crate::completion::{self, CompletionClient};
use crate::errors::GenerateError;
use crate::generation::{CopilotSession, GenerationSettings, SessionView};
use crate::tools::Tool;
use actix::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Serialises every operation of one user session. The completion call runs
/// as a future inside the actor context, so snapshots and further triggers
/// are still answered while it is in flight.
pub struct CopilotSessionActor {
    session_id: String,
    state: CopilotSession,
    client: Arc<dyn CompletionClient>,
    settings: Arc<GenerationSettings>,
    health: Option<Addr<HealthActor>>,
    idle_timeout: Duration,
    last_seen: Instant,
}

impl CopilotSessionActor {
    pub fn new(
        session_id: String,
        client: Arc<dyn CompletionClient>,
        settings: Arc<GenerationSettings>,
        health: Option<Addr<HealthActor>>,
        idle_timeout: Duration,
    ) -> Self {
        let state = CopilotSession::new(Tool::default(), settings.max_requests);
        Self {
            session_id,
            state,
            client,
            settings,
            health,
            idle_timeout,
            last_seen: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

impl Actor for CopilotSessionActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::debug!("Session {} started", self.session_id);
        let interval = IDLE_CHECK_INTERVAL.min(self.idle_timeout).max(Duration::from_secs(1));
        ctx.run_interval(interval, |act, ctx| {
            if !act.state.is_generating() && act.last_seen.elapsed() >= act.idle_timeout {
                log::debug!("Session {} idle for {:?}, dropping its state", act.session_id, act.idle_timeout);
                ctx.stop();
            }
        });
    }
}

// --- Messages ---

#[derive(Message)]
#[rtype(result = "SessionView")]
pub struct Snapshot;

#[derive(Message)]
#[rtype(result = "Result<SessionView, GenerateError>")]
pub struct SelectTool {
    pub tool: Tool,
}

#[derive(Message)]
#[rtype(result = "SessionView")]
pub struct EditPrompt {
    pub prompt: String,
}

/// Starts a generation, optionally replacing the prompt first.
#[derive(Message)]
#[rtype(result = "Result<String, GenerateError>")]
pub struct Generate {
    pub prompt: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SessionView")]
pub struct Reset;

// --- Handlers ---

impl Handler<Snapshot> for CopilotSessionActor {
    type Result = MessageResult<Snapshot>;

    fn handle(&mut self, _msg: Snapshot, _ctx: &mut Context<Self>) -> Self::Result {
        self.touch();
        MessageResult(self.state.view())
    }
}

impl Handler<SelectTool> for CopilotSessionActor {
    type Result = Result<SessionView, GenerateError>;

    fn handle(&mut self, msg: SelectTool, _ctx: &mut Context<Self>) -> Self::Result {
        self.touch();
        self.state.select_tool(msg.tool).map_err(|e| {
            log::warn!("Session {}: tool switch to {} rejected: {}", self.session_id, msg.tool, e);
            e
        })?;
        Ok(self.state.view())
    }
}

impl Handler<EditPrompt> for CopilotSessionActor {
    type Result = MessageResult<EditPrompt>;

    fn handle(&mut self, msg: EditPrompt, _ctx: &mut Context<Self>) -> Self::Result {
        self.touch();
        self.state.set_prompt(msg.prompt);
        MessageResult(self.state.view())
    }
}

impl Handler<Reset> for CopilotSessionActor {
    type Result = MessageResult<Reset>;

    fn handle(&mut self, _msg: Reset, _ctx: &mut Context<Self>) -> Self::Result {
        self.touch();
        if self.state.is_generating() {
            log::info!("Session {} reset while a generation was in flight; its result will be discarded", self.session_id);
        }
        self.state.reset();
        MessageResult(self.state.view())
    }
}

impl Handler<Generate> for CopilotSessionActor {
    type Result = ResponseActFuture<Self, Result<String, GenerateError>>;

    fn handle(&mut self, msg: Generate, _ctx: &mut Context<Self>) -> Self::Result {
        self.touch();

        if let Some(prompt) = msg.prompt {
            if self.state.is_generating() {
                log::warn!("Session {}: generate ignored, a generation is already running", self.session_id);
                return Box::pin(fut::ready(Err(GenerateError::Busy)));
            }
            self.state.set_prompt(prompt);
        }

        let pending = match self.state.begin_generation() {
            Ok(pending) => pending,
            Err(e) => {
                log::warn!("Session {}: generation rejected: {}", self.session_id, e);
                return Box::pin(fut::ready(Err(e)));
            }
        };

        log::info!(
            "Session {}: generating {} code ({}/{} requests used)",
            self.session_id,
            pending.tool,
            self.state.request_count(),
            self.state.max_requests()
        );

        let client = self.client.clone();
        let settings = self.settings.clone();
        let health = self.health.clone();
        let request = settings.request_for(&pending.prompt);

        let call = async move {
            let start_time = Instant::now();
            let result = completion::complete_with_timeout(client.as_ref(), &request, settings.timeout).await;
            if let Some(health) = health {
                health.do_send(ReportCompletion {
                    duration_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                    succeeded: result.is_ok(),
                });
            }
            result
        };

        Box::pin(call.into_actor(self).map(move |result, act, _ctx| {
            act.touch();
            let outcome = act.state.finish_generation(&pending, result);
            match &outcome {
                Ok(text) => log::info!("Session {}: generated {} bytes of {} code", act.session_id, text.len(), pending.tool),
                Err(GenerateError::Superseded) => {
                    log::info!("Session {}: discarded a result that finished after a reset", act.session_id)
                }
                Err(e) => log::error!("Session {}: {}", act.session_id, e),
            }
            outcome
        }))
    }
}
