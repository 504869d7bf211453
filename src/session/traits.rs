//! Session Capability Definitions
//!
//! The game transport and the pathfinder live outside this crate. Everything
//! the orchestration layer needs from them is expressed here.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;

/// Error types for session operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Position in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Control states the agent can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Sprint,
    Sneak,
}

impl Control {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
            Self::Jump => "jump",
            Self::Sprint => "sprint",
            Self::Sneak => "sneak",
        }
    }
}

/// Entity category as reported by the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Mob,
    Hostile,
    Animal,
    Object,
    Global,
    Orb,
    Other,
}

impl EntityKind {
    /// Categories the anti-idle hit loop may attack
    pub fn is_attackable(&self) -> bool {
        !matches!(
            self,
            Self::Object | Self::Player | Self::Global | Self::Orb | Self::Other
        )
    }
}

/// A nearby entity snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub kind: EntityKind,
    pub name: String,
    pub position: Position,
}

/// Inventory item snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub slot: u8,
    pub name: String,
}

/// Agent orientation in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Heading {
    pub yaw: f32,
    pub pitch: f32,
}

/// Pathfinding progress reported when the navigator gives up on a path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathProgress {
    pub elapsed_ms: u64,
    pub visited_nodes: u64,
}

impl PathProgress {
    /// Nodes explored per second, assuming 20 ticks/s
    pub fn nodes_per_second(&self) -> f64 {
        self.visited_nodes as f64 * 50.0
    }
}

/// Events pushed by a live session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Spawn,
    Chat { username: String, message: String },
    Message(String),
    GoalReached,
    GoalStuck(PathProgress),
    Death,
    /// Raw kick payload, usually a JSON chat component
    Kicked(String),
    End(String),
    Error(String),
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Chat { .. } => "chat",
            Self::Message(_) => "message",
            Self::GoalReached => "goal_reached",
            Self::GoalStuck(_) => "goal_stuck",
            Self::Death => "death",
            Self::Kicked(_) => "kicked",
            Self::End(_) => "end",
            Self::Error(_) => "error",
        }
    }

    /// Events that terminate the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Kicked(_) | Self::End(_) | Self::Error(_))
    }
}

/// Target handed to the pathfinder
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavTarget {
    /// Stand on an exact block
    Block { x: f64, y: f64, z: f64 },
    /// Reach a column, any height
    Xz { x: f64, z: f64 },
}

impl fmt::Display for NavTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block { x, y, z } => write!(f, "block ({}, {}, {})", x, y, z),
            Self::Xz { x, z } => write!(f, "column ({}, {})", x, z),
        }
    }
}

/// Pathfinding capability
pub trait Navigator: Send + Sync {
    /// Replace the current target; `None` stops navigation
    fn set_goal(&self, target: Option<NavTarget>);
}

/// Live game session - implement for each transport
#[async_trait]
pub trait Session: Send + Sync {
    /// Open the connection and log in
    async fn connect(&self) -> Result<(), SessionError>;

    /// Send a chat line (server commands included)
    async fn chat(&self, text: &str) -> Result<(), SessionError>;

    fn set_control_state(&self, control: Control, active: bool);

    async fn look(&self, heading: Heading) -> Result<(), SessionError>;

    fn heading(&self) -> Heading;

    fn position(&self) -> Position;

    /// Nearest entity matching the predicate
    fn nearest_entity(&self, filter: &dyn Fn(&Entity) -> bool) -> Option<Entity>;

    async fn attack(&self, entity: &Entity) -> Result<(), SessionError>;

    async fn swing_arm(&self) -> Result<(), SessionError>;

    async fn activate_entity(&self, entity: &Entity) -> Result<(), SessionError>;

    async fn set_quickbar_slot(&self, slot: u8) -> Result<(), SessionError>;

    fn inventory(&self) -> Vec<Item>;

    async fn equip(&self, item: &Item) -> Result<(), SessionError>;

    async fn activate_item(&self) -> Result<(), SessionError>;

    /// Cast and wait for a catch
    async fn fish(&self) -> Result<(), SessionError>;
}

/// Everything one connection attempt yields
pub struct SessionHandle {
    pub session: Arc<dyn Session>,
    pub navigator: Arc<dyn Navigator>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Builds a fresh session for every connection attempt
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(&self, config: &Config) -> Result<SessionHandle, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attackable_kinds() {
        assert!(EntityKind::Hostile.is_attackable());
        assert!(EntityKind::Mob.is_attackable());
        assert!(EntityKind::Animal.is_attackable());
        assert!(!EntityKind::Player.is_attackable());
        assert!(!EntityKind::Orb.is_attackable());
        assert!(!EntityKind::Object.is_attackable());
    }

    #[test]
    fn test_terminal_events() {
        assert!(SessionEvent::Kicked("{}".into()).is_terminal());
        assert!(SessionEvent::End("socketClosed".into()).is_terminal());
        assert!(SessionEvent::Error("read ECONNRESET".into()).is_terminal());
        assert!(!SessionEvent::Death.is_terminal());
        assert!(!SessionEvent::Spawn.is_terminal());
        assert!(!SessionEvent::GoalReached.is_terminal());
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::ConnectionFailed("connection refused".into());
        assert_eq!(err.to_string(), "Connection failed: connection refused");
    }

    #[test]
    fn test_path_progress_rate() {
        let progress = PathProgress { elapsed_ms: 40, visited_nodes: 3 };
        assert_eq!(progress.nodes_per_second(), 150.0);
    }
}
