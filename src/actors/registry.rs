use crate::actors::copilot_session::CopilotSessionActor;
use crate::actors::health::{HealthActor, ReportActiveSessions};
use crate::completion::CompletionClient;
use crate::generation::GenerationSettings;
use actix::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Message)]
#[rtype(result = "Addr<CopilotSessionActor>")]
pub struct Checkout {
    pub session_id: String,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct ActiveSessions;

/// Hands out one session actor per session id. Session actors never share
/// state; the registry only tracks their addresses.
pub struct SessionRegistryActor {
    sessions: HashMap<String, Addr<CopilotSessionActor>>,
    client: Arc<dyn CompletionClient>,
    settings: Arc<GenerationSettings>,
    health: Option<Addr<HealthActor>>,
    idle_timeout: Duration,
}

impl SessionRegistryActor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        settings: Arc<GenerationSettings>,
        health: Option<Addr<HealthActor>>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            client,
            settings,
            health,
            idle_timeout,
        }
    }

    fn prune(&mut self) {
        let before = self.sessions.len();
        self.sessions.retain(|_, addr| addr.connected());
        let removed = before - self.sessions.len();
        if removed > 0 {
            log::debug!("Pruned {} expired sessions, {} still active", removed, self.sessions.len());
        }
        if let Some(health) = &self.health {
            health.do_send(ReportActiveSessions(self.sessions.len()));
        }
    }
}

impl Actor for SessionRegistryActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(PRUNE_INTERVAL, |act, _| act.prune());
    }
}

impl Handler<Checkout> for SessionRegistryActor {
    type Result = MessageResult<Checkout>;

    fn handle(&mut self, msg: Checkout, _ctx: &mut Context<Self>) -> Self::Result {
        if let Some(addr) = self.sessions.get(&msg.session_id) {
            if addr.connected() {
                return MessageResult(addr.clone());
            }
        }

        let addr = CopilotSessionActor::new(
            msg.session_id.clone(),
            self.client.clone(),
            self.settings.clone(),
            self.health.clone(),
            self.idle_timeout,
        )
        .start();
        self.sessions.insert(msg.session_id, addr.clone());
        if let Some(health) = &self.health {
            health.do_send(ReportActiveSessions(self.sessions.len()));
        }
        MessageResult(addr)
    }
}

impl Handler<ActiveSessions> for SessionRegistryActor {
    type Result = usize;

    fn handle(&mut self, _msg: ActiveSessions, _ctx: &mut Context<Self>) -> Self::Result {
        self.prune();
        self.sessions.len()
    }
}
