//! Connection Lifecycle Management
//!
//! Drives one session at a time through its states:
//! - **Idle**: nothing opened yet
//! - **Connecting**: session opened, waiting for spawn
//! - **Spawned**: in the world, behaviors installed
//! - **Ended**: kicked, disconnected or failed
//!
//! After `Ended` the manager either gives up or, with auto-reconnect, waits
//! and starts over with a brand-new session and a fresh `Idle` state.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::behaviors::{self, BehaviorContext};
use crate::commands::Dispatcher;
use crate::config::Config;
use crate::movement::Arbiter;
use crate::scheduler::Scheduler;
use crate::session::{Session, SessionConnector, SessionEvent, SessionHandle};

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Spawned,
    Ended,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Spawned => "spawned",
            Self::Ended => "ended",
        }
    }

    /// Next state for a trigger; only forward moves are allowed
    pub fn transition(self, trigger: Trigger) -> Result<Self, InvalidTransition> {
        match (self, trigger) {
            (Self::Idle, Trigger::Open) => Ok(Self::Connecting),
            (Self::Connecting, Trigger::Spawn) => Ok(Self::Spawned),
            (Self::Connecting | Self::Spawned, Trigger::Terminate) => Ok(Self::Ended),
            (from, trigger) => Err(InvalidTransition { from, trigger }),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What moves the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Open,
    Spawn,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no transition from {from} on {trigger:?}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub trigger: Trigger,
}

static FORMATTING_CODES: Lazy<Regex> =
    Lazy::new(|| Regex::new("§.").expect("formatting code pattern is valid"));

/// Remove `§x` formatting codes
pub fn strip_formatting(text: &str) -> String {
    FORMATTING_CODES.replace_all(text, "").into_owned()
}

/// Human-readable kick reason from a raw kick payload.
///
/// Uses `text`, then `extra[0].text`, then `translate`; anything that is not
/// a chat component is returned as-is.
pub fn kick_reason(raw: &str) -> String {
    let text = match serde_json::from_str::<Value>(raw) {
        Ok(value) => component_text(&value).unwrap_or_else(|| raw.to_string()),
        Err(e) => {
            debug!("Kick payload is not JSON ({}), logging raw", e);
            raw.to_string()
        }
    };
    strip_formatting(&text)
}

fn component_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => {
            let primary = value.get("text").and_then(Value::as_str).unwrap_or("");
            if !primary.is_empty() {
                return Some(primary.to_string());
            }

            let fallback = value
                .get("extra")
                .and_then(|extra| extra.get(0))
                .and_then(|first| match first {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .filter(|s| !s.is_empty());

            fallback
                .or_else(|| value.get("translate").and_then(Value::as_str))
                .map(str::to_string)
        }
        _ => None,
    }
}

/// Operator console input; `None` once the console is closed
type Console = Option<mpsc::Receiver<String>>;

async fn next_line(console: &mut Console) -> Option<String> {
    match console {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

enum Step {
    Event(Option<SessionEvent>),
    Line(Option<String>),
}

/// Per-session collaborators
struct Live {
    session: Arc<dyn Session>,
    arbiter: Arbiter,
    dispatcher: Dispatcher,
}

/// Lifecycle manager for the connect / spawn / reconnect cycle
pub struct LifecycleManager {
    config: Arc<Config>,
    connector: Arc<dyn SessionConnector>,
    scheduler: Scheduler,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(config: Arc<Config>, connector: Arc<dyn SessionConnector>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            config,
            connector,
            scheduler: Scheduler::new(),
            state,
        }
    }

    /// State of the current session
    pub fn current_state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run sessions until one ends and auto-reconnect is off
    pub async fn run(&self, input: mpsc::Receiver<String>) {
        let mut console: Console = Some(input);
        info!("Lifecycle manager started");

        loop {
            self.run_session(&mut console).await;
            self.scheduler.cancel_all();

            if !self.config.utils.auto_reconnect {
                info!("Auto-reconnect disabled, staying disconnected");
                return;
            }

            let delay = self.config.reconnect_delay();
            info!("Reconnecting in {:?}", delay);
            self.wait_before_reconnect(&mut console).await;
        }
    }

    async fn run_session(&self, console: &mut Console) {
        let mut state = LifecycleState::Idle;
        self.state.send_replace(state);
        self.advance(&mut state, Trigger::Open);

        let SessionHandle {
            session,
            navigator,
            mut events,
        } = match self.connector.open(&self.config).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to open session: {}", e);
                self.advance(&mut state, Trigger::Terminate);
                return;
            }
        };

        let arbiter = Arbiter::new(navigator, self.scheduler.clone());
        let live = Live {
            dispatcher: Dispatcher::new(
                Arc::clone(&session),
                arbiter.clone(),
                self.scheduler.clone(),
                Arc::clone(&self.config),
            ),
            session,
            arbiter,
        };

        if let Err(e) = live.session.connect().await {
            error!("{}", e);
            self.advance(&mut state, Trigger::Terminate);
            return;
        }

        loop {
            let step = tokio::select! {
                event = events.recv() => Step::Event(event),
                line = next_line(console) => Step::Line(line),
            };

            match step {
                Step::Event(Some(event)) => {
                    self.handle_event(&mut state, event, &live);
                    if state == LifecycleState::Ended {
                        return;
                    }
                }
                Step::Event(None) => {
                    warn!("Session event stream closed");
                    self.advance(&mut state, Trigger::Terminate);
                    return;
                }
                Step::Line(Some(line)) => {
                    live.dispatcher.dispatch(&line).await;
                }
                Step::Line(None) => {
                    info!("Operator console closed");
                    *console = None;
                }
            }
        }
    }

    fn handle_event(&self, state: &mut LifecycleState, event: SessionEvent, live: &Live) {
        let terminal = event.is_terminal();

        match event {
            SessionEvent::Spawn => {
                if self.advance(state, Trigger::Spawn) {
                    info!("Bot joined the server");
                    behaviors::install(&BehaviorContext {
                        session: Arc::clone(&live.session),
                        arbiter: live.arbiter.clone(),
                        scheduler: self.scheduler.clone(),
                        config: Arc::clone(&self.config),
                    });
                } else {
                    debug!("Spawn while {}, behaviors already installed", state);
                }
            }
            SessionEvent::Chat { username, message } => info!("<{}> {}", username, message),
            SessionEvent::Message(text) => info!("{}", strip_formatting(&text)),
            SessionEvent::GoalReached => live.arbiter.notify_goal_reached(),
            SessionEvent::GoalStuck(progress) => live.arbiter.notify_stuck(progress),
            SessionEvent::Death => {
                warn!(
                    "Bot has died and was respawned at {}",
                    live.session.position()
                );
            }
            SessionEvent::Kicked(raw) => {
                warn!("Bot was kicked from the server. Reason: {}", kick_reason(&raw))
            }
            SessionEvent::End(reason) => info!("Session ended: {}", reason),
            SessionEvent::Error(message) => error!("{}", message),
        }

        if terminal {
            self.advance(state, Trigger::Terminate);
        }
    }

    /// Apply a trigger; returns whether the state changed
    fn advance(&self, state: &mut LifecycleState, trigger: Trigger) -> bool {
        match state.transition(trigger) {
            Ok(next) => {
                info!("Lifecycle: {} -> {}", state, next);
                *state = next;
                self.state.send_replace(next);
                true
            }
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    async fn wait_before_reconnect(&self, console: &mut Console) {
        let sleep = tokio::time::sleep(self.config.reconnect_delay());
        tokio::pin!(sleep);

        loop {
            let line = tokio::select! {
                _ = &mut sleep => return,
                line = next_line(console) => line,
            };

            match line {
                Some(line) => warn!("No active session, dropping command: {}", line),
                None => *console = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let state = LifecycleState::Idle;
        let state = state.transition(Trigger::Open).unwrap();
        assert_eq!(state, LifecycleState::Connecting);
        let state = state.transition(Trigger::Spawn).unwrap();
        assert_eq!(state, LifecycleState::Spawned);
        let state = state.transition(Trigger::Terminate).unwrap();
        assert_eq!(state, LifecycleState::Ended);
    }

    #[test]
    fn test_no_backwards_or_repeated_transitions() {
        assert!(LifecycleState::Spawned.transition(Trigger::Spawn).is_err());
        assert!(LifecycleState::Ended.transition(Trigger::Open).is_err());
        assert!(LifecycleState::Ended.transition(Trigger::Terminate).is_err());
        assert!(LifecycleState::Idle.transition(Trigger::Spawn).is_err());
        assert_eq!(
            LifecycleState::Connecting.transition(Trigger::Terminate),
            Ok(LifecycleState::Ended)
        );
    }

    #[test]
    fn test_kick_reason_primary_text() {
        assert_eq!(kick_reason(r#"{"text":"§cYou are banned"}"#), "You are banned");
    }

    #[test]
    fn test_kick_reason_falls_back_to_extra() {
        let raw = r#"{"text":"","extra":[{"text":"§6Server §lrestarting"},{"text":"!"}]}"#;
        assert_eq!(kick_reason(raw), "Server restarting");
    }

    #[test]
    fn test_kick_reason_other_shapes() {
        assert_eq!(kick_reason(r#""§4Flying is not enabled""#), "Flying is not enabled");
        assert_eq!(
            kick_reason(r#"{"translate":"multiplayer.disconnect.idling"}"#),
            "multiplayer.disconnect.idling"
        );
        assert_eq!(kick_reason("§cnot json at all"), "not json at all");
        assert_eq!(kick_reason(r#"{"text":""}"#), r#"{"text":""}"#);
        assert_eq!(kick_reason("[1,2]"), "[1,2]");
    }
}
