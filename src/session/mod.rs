//! Game Session Abstraction
//!
//! The transport and the pathfinder are external collaborators. The core only
//! sees the [`Session`] and [`Navigator`] traits; [`sim`] provides an
//! in-memory implementation of both.

pub mod sim;
pub mod traits;

pub use sim::{SessionOp, SimConnector, SimOptions, SimSession};
pub use traits::{
    Control, Entity, EntityKind, Heading, Item, NavTarget, Navigator, PathProgress, Position,
    Session, SessionConnector, SessionError, SessionEvent, SessionHandle,
};
