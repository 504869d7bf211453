//! afkbot
//!
//! Remote-control client that keeps an agent alive inside a game-world
//! session: it connects on behalf of a user, takes operator commands from the
//! console, and runs background behaviors while the session lasts.
//!
//! # Features
//!
//! - **Lifecycle**: explicit Idle/Connecting/Spawned/Ended state machine with auto-reconnect
//! - **Scheduler**: name-keyed repeating and one-shot tasks, torn down on disconnect
//! - **Movement**: one arbiter for manual goals and the patrol loop
//! - **Commands**: `/server commands` passthrough and `!local` directives
//! - **Behaviors**: auto-auth, scripted chat, start position, anti-afk
//!
//! # Architecture
//!
//! ```text
//! stdin ──► Console ──► LifecycleManager ──► SessionConnector ──► Session
//!                            │                                     │
//!                            ├── Dispatcher ──┐                    │
//!                            ├── Behaviors ───┼──► Arbiter ──► Navigator
//!                            └── Scheduler ◄──┘
//! ```
//!
//! The transport and pathfinder are external; [`session::SimConnector`]
//! stands in for them.

pub mod behaviors;
pub mod commands;
pub mod config;
pub mod console;
pub mod lifecycle;
pub mod movement;
pub mod scheduler;
pub mod session;

pub use behaviors::{Behavior, BehaviorContext, MessageCycle};
pub use commands::{Command, CommandError, CommandKind, Directive, Dispatcher};
pub use config::{Config, ConfigError};
pub use lifecycle::{kick_reason, LifecycleManager, LifecycleState, Trigger};
pub use movement::{circle_points, Arbiter, MovementGoal};
pub use scheduler::{Scheduler, TaskKind};
pub use session::{
    NavTarget, Navigator, Position, Session, SessionConnector, SessionError, SessionEvent,
    SimConnector, SimOptions,
};
