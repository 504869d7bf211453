//! Simulated Session
//!
//! In-memory transport that logs and records every operation instead of
//! talking to a server. The binary uses it as a dry-run transport; tests use
//! it to inject events and inspect what the core asked the world to do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::traits::*;
use crate::config::Config;

/// One recorded call into the simulated world
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOp {
    Chat(String),
    Control(Control, bool),
    Look(Heading),
    Attack(u32),
    SwingArm,
    ActivateEntity(u32),
    QuickbarSlot(u8),
    Equip(String),
    ActivateItem,
    Fish,
    Goal(Option<NavTarget>),
}

/// Initial world contents for every simulated session
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Emit `Spawn` as soon as `connect` succeeds
    pub auto_spawn: bool,
    /// Make `connect` fail
    pub refuse_connections: bool,
    pub spawn_position: Position,
    pub entities: Vec<Entity>,
    pub inventory: Vec<Item>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            auto_spawn: true,
            refuse_connections: false,
            spawn_position: Position::new(0.0, 64.0, 0.0),
            entities: Vec::new(),
            inventory: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct World {
    position: Position,
    heading: Heading,
    controls: HashMap<Control, bool>,
    entities: Vec<Entity>,
    inventory: Vec<Item>,
    ops: Vec<SessionOp>,
}

/// A single simulated connection
pub struct SimSession {
    id: usize,
    options: SimOptions,
    world: Mutex<World>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SimSession {
    fn new(id: usize, options: SimOptions) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let world = World {
            position: options.spawn_position,
            entities: options.entities.clone(),
            inventory: options.inventory.clone(),
            ..Default::default()
        };
        let session = Arc::new(Self {
            id,
            options,
            world: Mutex::new(world),
            events: tx,
        });
        (session, rx)
    }

    /// Sequence number of this session within its connector
    pub fn id(&self) -> usize {
        self.id
    }

    /// Push an event as if the server had sent it
    pub fn emit(&self, event: SessionEvent) {
        debug!("sim[{}] emit {}", self.id, event.as_str());
        let _ = self.events.send(event);
    }

    /// Every operation recorded so far
    pub fn ops(&self) -> Vec<SessionOp> {
        self.world.lock().ops.clone()
    }

    /// Chat lines sent so far
    pub fn chats(&self) -> Vec<String> {
        self.world
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                SessionOp::Chat(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Navigator goals issued so far
    pub fn goals(&self) -> Vec<Option<NavTarget>> {
        self.world
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                SessionOp::Goal(goal) => Some(*goal),
                _ => None,
            })
            .collect()
    }

    pub fn control_state(&self, control: Control) -> bool {
        self.world.lock().controls.get(&control).copied().unwrap_or(false)
    }

    pub fn set_position(&self, position: Position) {
        self.world.lock().position = position;
    }

    fn record(&self, op: SessionOp) {
        self.world.lock().ops.push(op);
    }
}

impl Navigator for SimSession {
    fn set_goal(&self, target: Option<NavTarget>) {
        match target {
            Some(t) => debug!("sim[{}] navigating to {}", self.id, t),
            None => debug!("sim[{}] navigation cleared", self.id),
        }
        self.record(SessionOp::Goal(target));
    }
}

#[async_trait]
impl Session for SimSession {
    async fn connect(&self) -> Result<(), SessionError> {
        if self.options.refuse_connections {
            return Err(SessionError::ConnectionFailed("connection refused".to_string()));
        }
        info!("sim[{}] connected", self.id);
        if self.options.auto_spawn {
            self.emit(SessionEvent::Spawn);
        }
        Ok(())
    }

    async fn chat(&self, text: &str) -> Result<(), SessionError> {
        info!("sim[{}] chat: {}", self.id, text);
        self.record(SessionOp::Chat(text.to_string()));
        Ok(())
    }

    fn set_control_state(&self, control: Control, active: bool) {
        debug!("sim[{}] {}={}", self.id, control.as_str(), active);
        let mut world = self.world.lock();
        world.controls.insert(control, active);
        world.ops.push(SessionOp::Control(control, active));
    }

    async fn look(&self, heading: Heading) -> Result<(), SessionError> {
        let mut world = self.world.lock();
        world.heading = heading;
        world.ops.push(SessionOp::Look(heading));
        Ok(())
    }

    fn heading(&self) -> Heading {
        self.world.lock().heading
    }

    fn position(&self) -> Position {
        self.world.lock().position
    }

    fn nearest_entity(&self, filter: &dyn Fn(&Entity) -> bool) -> Option<Entity> {
        let world = self.world.lock();
        let here = world.position;
        world
            .entities
            .iter()
            .filter(|e| filter(e))
            .min_by(|a, b| {
                distance_sq(here, a.position).total_cmp(&distance_sq(here, b.position))
            })
            .cloned()
    }

    async fn attack(&self, entity: &Entity) -> Result<(), SessionError> {
        debug!("sim[{}] attack {} #{}", self.id, entity.name, entity.id);
        self.record(SessionOp::Attack(entity.id));
        Ok(())
    }

    async fn swing_arm(&self) -> Result<(), SessionError> {
        self.record(SessionOp::SwingArm);
        Ok(())
    }

    async fn activate_entity(&self, entity: &Entity) -> Result<(), SessionError> {
        self.record(SessionOp::ActivateEntity(entity.id));
        Ok(())
    }

    async fn set_quickbar_slot(&self, slot: u8) -> Result<(), SessionError> {
        self.record(SessionOp::QuickbarSlot(slot));
        Ok(())
    }

    fn inventory(&self) -> Vec<Item> {
        self.world.lock().inventory.clone()
    }

    async fn equip(&self, item: &Item) -> Result<(), SessionError> {
        self.record(SessionOp::Equip(item.name.clone()));
        Ok(())
    }

    async fn activate_item(&self) -> Result<(), SessionError> {
        self.record(SessionOp::ActivateItem);
        Ok(())
    }

    async fn fish(&self) -> Result<(), SessionError> {
        self.record(SessionOp::Fish);
        Ok(())
    }
}

fn distance_sq(a: Position, b: Position) -> f64 {
    let (dx, dy, dz) = (a.x - b.x, a.y - b.y, a.z - b.z);
    dx * dx + dy * dy + dz * dz
}

/// Hands out a new [`SimSession`] per connection attempt
pub struct SimConnector {
    options: SimOptions,
    opened: AtomicUsize,
    sessions: Mutex<Vec<Arc<SimSession>>>,
}

impl SimConnector {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            opened: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Number of sessions opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Most recently opened session
    pub fn latest(&self) -> Option<Arc<SimSession>> {
        self.sessions.lock().last().cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<SimSession>> {
        self.sessions.lock().clone()
    }
}

impl Default for SimConnector {
    fn default() -> Self {
        Self::new(SimOptions::default())
    }
}

#[async_trait]
impl SessionConnector for SimConnector {
    async fn open(&self, config: &Config) -> Result<SessionHandle, SessionError> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "sim[{}] opening session for {} at {}:{} ({})",
            id,
            config.account.username,
            config.server.host,
            config.server.port,
            config.server.version
        );
        let (session, events) = SimSession::new(id, self.options.clone());
        self.sessions.lock().push(session.clone());
        Ok(SessionHandle {
            session: session.clone(),
            navigator: session,
            events,
        })
    }
}
