//! Assistant: the per-query pipeline
//!
//! Each query goes route → guard → dispatch → respond. Progress is streamed
//! as [`AssistantEvent`]s and every call ends with exactly one final answer.
//! Failures never escape [`Assistant::process`]; they are logged and replaced
//! by [`FALLBACK_ANSWER`].

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dispatcher::{Dispatcher, SpecialistExecutionError};
use crate::guardrail::RouteGuard;
use crate::history::{ConversationHistory, Message, Role};
use crate::route::{Route, RouteSchema, RoutingError};
use crate::router::RouteDecider;
use crate::turns::{CompletedTurn, TurnSink};

/// Answer given whenever routing or a specialist fails
pub const FALLBACK_ANSWER: &str =
    "I'm sorry, I ran into a problem and couldn't complete your request.";

/// Events are drained while the query runs, so a small buffer suffices
const ASK_CHANNEL_CAPACITY: usize = 1;

/// Progress or result of one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantEvent {
    Status(String),
    FinalAnswer(String),
}

impl AssistantEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalAnswer(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Status(text) | Self::FinalAnswer(text) => text,
        }
    }
}

/// Where the assistant is in the current query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Routing,
    Guardrail,
    Dispatching,
    Responding,
    Errored,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Specialist(#[from] SpecialistExecutionError),
}

/// One conversation session
pub struct Assistant {
    router: Arc<dyn RouteDecider>,
    schema: Arc<RouteSchema>,
    guards: Vec<Arc<dyn RouteGuard>>,
    dispatcher: Arc<Dispatcher>,
    history: ConversationHistory,
    phase: Phase,
    turn_sink: Option<TurnSink>,
}

impl Assistant {
    pub fn new(
        router: Arc<dyn RouteDecider>,
        schema: Arc<RouteSchema>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            router,
            schema,
            guards: Vec::new(),
            dispatcher,
            history: ConversationHistory::default(),
            phase: Phase::Idle,
            turn_sink: None,
        }
    }

    /// Append a post-routing stage. Stages run in insertion order.
    pub fn with_guard(mut self, guard: Arc<dyn RouteGuard>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = ConversationHistory::new(capacity);
        self
    }

    pub fn with_turn_sink(mut self, sink: TurnSink) -> Self {
        self.turn_sink = Some(sink);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Handle one query, streaming events to `events`. Returns the final answer.
    ///
    /// The user turn is recorded before routing and the answer after, so
    /// history grows by exactly two messages. If this future is dropped
    /// mid-flight the user turn stays without a reply.
    pub async fn process(&mut self, query: &str, events: &mpsc::Sender<AssistantEvent>) -> String {
        let prior = self.history.snapshot();
        self.history.push(Role::User, query);

        let mut routed_to: Option<String> = None;
        let answer = match self.run_pipeline(query, &prior, events, &mut routed_to).await {
            Ok(answer) if !answer.trim().is_empty() => answer,
            Ok(_) => {
                self.set_phase(Phase::Errored);
                error!("Specialist {:?} returned an empty answer", routed_to);
                FALLBACK_ANSWER.to_string()
            }
            Err(e) => {
                self.set_phase(Phase::Errored);
                error!("Query failed: {:#}", anyhow::Error::from(e));
                FALLBACK_ANSWER.to_string()
            }
        };

        self.set_phase(Phase::Responding);
        self.history.push(Role::Assistant, answer.clone());
        emit(events, AssistantEvent::FinalAnswer(answer.clone())).await;

        if let Some(sink) = &self.turn_sink {
            sink.offer(CompletedTurn::new(query, answer.clone(), routed_to));
        }
        self.set_phase(Phase::Idle);
        answer
    }

    /// Run one query and collect every event it produced
    pub async fn ask(&mut self, query: &str) -> Vec<AssistantEvent> {
        let (tx, mut rx) = mpsc::channel(ASK_CHANNEL_CAPACITY);
        let run = async move {
            self.process(query, &tx).await;
        };
        let collect = async {
            let mut collected = Vec::new();
            while let Some(event) = rx.recv().await {
                collected.push(event);
            }
            collected
        };
        let ((), collected) = tokio::join!(run, collect);
        collected
    }

    async fn run_pipeline(
        &mut self,
        query: &str,
        prior: &[Message],
        events: &mpsc::Sender<AssistantEvent>,
        routed_to: &mut Option<String>,
    ) -> Result<String, PipelineError> {
        emit(events, AssistantEvent::Status("Thinking... (routing query)".to_string())).await;
        self.set_phase(Phase::Routing);

        let route = self.router.decide(query, prior, &self.schema).await?;
        if !self.schema.owns(&route) {
            return Err(RoutingError::Invalid {
                reason: "route was produced by a different schema".to_string(),
                raw: serde_json::to_string(&route).unwrap_or_default(),
            }
            .into());
        }
        let name = route.specialist_name().to_string();
        *routed_to = Some(name.clone());
        info!("Routed to {}", name);

        let route = self.apply_guards(query, route);

        emit(events, AssistantEvent::Status(format!("Routing to: {}", name))).await;
        emit(
            events,
            AssistantEvent::Status(format!("Specialist '{}' is working...", name)),
        )
        .await;
        self.set_phase(Phase::Dispatching);

        Ok(self.dispatcher.execute(&route, prior).await?)
    }

    fn apply_guards(&mut self, query: &str, route: Route) -> Route {
        if self.guards.is_empty() {
            return route;
        }
        self.set_phase(Phase::Guardrail);
        self.guards.iter().fold(route, |route, guard| {
            debug!("Applying guard {}", guard.name());
            guard.apply(query, route)
        })
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Assistant phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

async fn emit(events: &mpsc::Sender<AssistantEvent>, event: AssistantEvent) {
    if events.send(event).await.is_err() {
        debug!("Event receiver dropped, continuing without progress updates");
    }
}
