//! Operator Command Dispatcher
//!
//! One input line is one command:
//! - `/...` goes to the server verbatim (its own command syntax)
//! - `!verb args` is a local directive
//! - anything else is rejected with a warning
//!
//! Malformed directives and failing handlers are logged and dropped; they
//! never stop the event loop.

use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::movement::{Arbiter, MovementGoal, PATROL_STEP};
use crate::scheduler::Scheduler;
use crate::session::{Control, Entity, EntityKind, Session};

/// Prefix of commands forwarded to the server
pub const SYSTEM_PREFIX: char = '/';

/// Prefix of locally interpreted directives
pub const DIRECTIVE_PREFIX: char = '!';

/// How long `shift` and `jump` hold their control
pub const CONTROL_PULSE: Duration = Duration::from_millis(500);

/// Highest quick-bar slot index
pub const MAX_SLOT: u8 = 8;

/// Quick-bar slot the `fish` directive uses
const FISHING_SLOT: u8 = 1;

/// Command classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SystemPassthrough,
    LocalDirective,
    Unrecognized,
}

/// A parsed input line
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub raw: String,
    pub kind: CommandKind,
    /// First word without its prefix
    pub verb: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let raw = line.trim_end_matches(['\r', '\n']).to_string();

        let (kind, body) = if let Some(body) = raw.strip_prefix(SYSTEM_PREFIX) {
            (CommandKind::SystemPassthrough, body)
        } else if let Some(body) = raw.strip_prefix(DIRECTIVE_PREFIX) {
            (CommandKind::LocalDirective, body)
        } else {
            (CommandKind::Unrecognized, "")
        };

        let mut words = body.split_whitespace();
        let verb = words.next().unwrap_or_default().to_string();
        let args = words.map(str::to_string).collect();

        Self { raw, kind, verb, args }
    }
}

/// Directive parse errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown directive: !{0}")]
    UnknownDirective(String),

    #[error("Malformed !{verb}, usage: {usage}")]
    BadArguments { verb: String, usage: &'static str },
}

/// Local directives
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Move { x: f64, y: f64, z: f64 },
    Stop,
    Pos,
    Shift,
    Jump,
    Slot(u8),
    Fish,
    FishBeta,
    Join,
    Patrol,
}

impl Directive {
    pub fn parse(verb: &str, args: &[String]) -> Result<Self, CommandError> {
        let bad = |usage| CommandError::BadArguments {
            verb: verb.to_string(),
            usage,
        };

        let no_args = |directive: Directive, usage| {
            if args.is_empty() {
                Ok(directive)
            } else {
                Err(bad(usage))
            }
        };

        match verb {
            "move" => {
                let usage = "!move <x> <y> <z>";
                let coords = args
                    .iter()
                    .map(|a| a.parse::<f64>().ok().filter(|v| v.is_finite()))
                    .collect::<Option<Vec<f64>>>()
                    .ok_or_else(|| bad(usage))?;
                match coords.as_slice() {
                    [x, y, z] => Ok(Self::Move { x: *x, y: *y, z: *z }),
                    _ => Err(bad(usage)),
                }
            }
            "slot" => {
                let usage = "!slot <0-8>";
                match args {
                    [slot] => slot
                        .parse::<u8>()
                        .ok()
                        .filter(|s| *s <= MAX_SLOT)
                        .map(Self::Slot)
                        .ok_or_else(|| bad(usage)),
                    _ => Err(bad(usage)),
                }
            }
            "stop" => no_args(Self::Stop, "!stop"),
            "pos" => no_args(Self::Pos, "!pos"),
            "shift" => no_args(Self::Shift, "!shift"),
            "jump" => no_args(Self::Jump, "!jump"),
            "fish" => no_args(Self::Fish, "!fish"),
            "fish-beta" => no_args(Self::FishBeta, "!fish-beta"),
            "join" => no_args(Self::Join, "!join"),
            "patrol" => no_args(Self::Patrol, "!patrol"),
            other => Err(CommandError::UnknownDirective(other.to_string())),
        }
    }
}

/// Routes operator lines for one session
pub struct Dispatcher {
    session: Arc<dyn Session>,
    arbiter: Arbiter,
    scheduler: Scheduler,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(
        session: Arc<dyn Session>,
        arbiter: Arbiter,
        scheduler: Scheduler,
        config: Arc<Config>,
    ) -> Self {
        Self {
            session,
            arbiter,
            scheduler,
            config,
        }
    }

    /// Handle one input line; returns how it was classified
    pub async fn dispatch(&self, line: &str) -> CommandKind {
        let command = Command::parse(line);

        match command.kind {
            CommandKind::SystemPassthrough => match self.session.chat(&command.raw).await {
                Ok(()) => info!("Sent command: {}", command.raw),
                Err(e) => warn!("Failed to send '{}': {}", command.raw, e),
            },
            CommandKind::LocalDirective => match Directive::parse(&command.verb, &command.args) {
                Ok(directive) => {
                    if let Err(e) = self.execute(directive).await {
                        warn!("{} failed: {:#}", command.raw, e);
                    }
                }
                Err(e) => warn!("{}", e),
            },
            CommandKind::Unrecognized => warn!("Invalid command format: {}", command.raw),
        }

        command.kind
    }

    pub async fn execute(&self, directive: Directive) -> anyhow::Result<()> {
        match directive {
            Directive::Move { x, y, z } => {
                self.arbiter.set_goal(MovementGoal::Point { x, y, z });
                self.arbiter.on_stuck(|progress| {
                    info!(
                        "I can't get there. Stuck after {}ms. Visited {} nodes ({:.2}/s)",
                        progress.elapsed_ms,
                        progress.visited_nodes,
                        progress.nodes_per_second()
                    );
                });
                self.arbiter.on_goal_reached(|| info!("I'm here!"));
            }
            Directive::Stop => self.arbiter.set_goal(MovementGoal::None),
            Directive::Pos => info!("Current position: {}", self.session.position()),
            Directive::Shift => self.pulse(Control::Sneak),
            Directive::Jump => self.pulse(Control::Jump),
            Directive::Slot(slot) => {
                self.session.set_quickbar_slot(slot).await?;
                info!("Selected slot {}", slot);
            }
            Directive::Fish => {
                self.session.set_quickbar_slot(FISHING_SLOT).await?;
                self.session.activate_item().await?;
                info!("Used item in slot {}", FISHING_SLOT);
            }
            Directive::FishBeta => {
                let rod = self
                    .session
                    .inventory()
                    .into_iter()
                    .find(|item| item.name.contains("rod"))
                    .context("no fishing rod in inventory")?;
                self.session.equip(&rod).await?;
                info!("Equipped {}, casting", rod.name);

                // Fishing waits for a bite; keep it off the event loop
                let session = Arc::clone(&self.session);
                self.scheduler.register("fishing", None, move || {
                    let session = Arc::clone(&session);
                    async move {
                        session.fish().await?;
                        info!("Caught something");
                        anyhow::Ok(())
                    }
                });
            }
            Directive::Join => {
                let Some(player) = self
                    .session
                    .nearest_entity(&|e: &Entity| e.kind == EntityKind::Player)
                else {
                    bail!("no player nearby");
                };
                self.session.activate_entity(&player).await?;
                info!("Interacted with {}", player.name);
            }
            Directive::Patrol => {
                let radius = self
                    .config
                    .utils
                    .anti_afk
                    .circle_walk
                    .radius
                    .context("no circle-walk radius configured")?;
                if !radius.is_finite() || radius <= 0.0 {
                    bail!("circle-walk radius {} is not usable", radius);
                }
                self.arbiter
                    .patrol_around(self.session.position(), radius, PATROL_STEP);
            }
        }

        Ok(())
    }

    /// Hold a control briefly, then release it
    fn pulse(&self, control: Control) {
        self.session.set_control_state(control, true);
        let session = Arc::clone(&self.session);
        self.scheduler.register_delayed(
            &format!("release-{}", control.as_str()),
            CONTROL_PULSE,
            move || {
                session.set_control_state(control, false);
                async { anyhow::Ok(()) }
            },
        );
    }
}
