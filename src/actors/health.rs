use actix::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const RETENTION: Duration = Duration::from_secs(5 * 60);

// --- Messages ---

#[derive(Message)]
#[rtype(result = "()")]
pub struct ReportCompletion {
    pub duration_ms: f64,
    pub succeeded: bool,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct ReportActiveSessions(pub usize);

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

// --- Data Structures ---

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LatencyMetrics {
    pub p95_ms: f64,
    pub mean_ms: f64,
}

#[derive(Serialize, Clone, Debug)]
pub struct TimeWindowMetrics {
    pub completion: LatencyMetrics,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Serialize, Clone, Debug)]
pub struct SystemHealth {
    pub active_sessions: usize,
    pub thirty_seconds: TimeWindowMetrics,
    pub one_minute: TimeWindowMetrics,
    pub five_minutes: TimeWindowMetrics,
}

struct CompletionDataPoint {
    timestamp: Instant,
    duration_ms: f64,
    succeeded: bool,
}

// --- Actor ---

pub struct HealthActor {
    completions: VecDeque<CompletionDataPoint>,
    active_sessions: usize,
}

impl HealthActor {
    pub fn new() -> Self {
        Self {
            completions: VecDeque::new(),
            active_sessions: 0,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.completions.front() {
            if now.duration_since(front.timestamp) < RETENTION {
                break;
            }
            self.completions.pop_front();
        }
    }

    fn calculate_window_metrics(&self, now: Instant, window: Duration) -> TimeWindowMetrics {
        let in_window: Vec<&CompletionDataPoint> = self
            .completions
            .iter()
            .filter(|dp| now.duration_since(dp.timestamp) < window)
            .collect();

        let succeeded = in_window.iter().filter(|dp| dp.succeeded).count();
        let failed = in_window.len() - succeeded;

        let mut values: Vec<f64> = in_window.iter().map(|dp| dp.duration_ms).collect();
        let completion = if values.is_empty() {
            LatencyMetrics { p95_ms: 0.0, mean_ms: 0.0 }
        } else {
            values.sort_by(|a, b| a.total_cmp(b));
            let p95_index = (values.len() as f64 * 0.95).floor() as usize;
            LatencyMetrics {
                p95_ms: values[p95_index.min(values.len() - 1)],
                mean_ms: values.iter().sum::<f64>() / values.len() as f64,
            }
        };

        TimeWindowMetrics {
            completion,
            succeeded,
            failed,
        }
    }
}

impl Default for HealthActor {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for HealthActor {
    type Context = Context<Self>;
}

// --- Handlers ---

impl Handler<ReportCompletion> for HealthActor {
    type Result = ();

    fn handle(&mut self, msg: ReportCompletion, _ctx: &mut Context<Self>) {
        let now = Instant::now();
        self.prune(now);
        self.completions.push_back(CompletionDataPoint {
            timestamp: now,
            duration_ms: msg.duration_ms,
            succeeded: msg.succeeded,
        });
    }
}

impl Handler<ReportActiveSessions> for HealthActor {
    type Result = ();

    fn handle(&mut self, msg: ReportActiveSessions, _ctx: &mut Context<Self>) {
        self.active_sessions = msg.0;
    }
}

impl Handler<GetSystemHealth> for HealthActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self>) -> Self::Result {
        let now = Instant::now();
        self.prune(now);

        MessageResult(SystemHealth {
            active_sessions: self.active_sessions,
            thirty_seconds: self.calculate_window_metrics(now, Duration::from_secs(30)),
            one_minute: self.calculate_window_metrics(now, Duration::from_secs(60)),
            five_minutes: self.calculate_window_metrics(now, RETENTION),
        })
    }
}
