//! Autonomous Behavior Bundle
//!
//! Background behaviors installed once per session on spawn:
//! - **auto-auth**: register/login shortly after joining
//! - **chat-messages**: scripted chat, once or on a loop
//! - **start position**: walk to a fixed block
//! - **anti-afk**: sneak, jump, rotate, hit, circle walk
//!
//! Every timer goes through the [`Scheduler`] so the lifecycle manager can
//! tear the whole bundle down with one `cancel_all`.

use parking_lot::Mutex;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::movement::{Arbiter, MovementGoal, PATROL_STEP};
use crate::scheduler::Scheduler;
use crate::session::{Control, Entity, Heading, Session};

/// Wait before sending auth commands
pub const AUTH_DELAY: Duration = Duration::from_millis(500);

/// Heading update period for the rotate behavior
pub const ROTATE_INTERVAL: Duration = Duration::from_millis(100);

/// Radians added to the yaw on every rotate tick
pub const ROTATE_STEP: f32 = 1.0;

pub const TASK_AUTO_AUTH: &str = "auto-auth";
pub const TASK_CHAT: &str = "chat-messages";
pub const TASK_ROTATE: &str = "anti-afk-rotate";
pub const TASK_HIT: &str = "anti-afk-hit";

/// Everything a behavior may touch
#[derive(Clone)]
pub struct BehaviorContext {
    pub session: Arc<dyn Session>,
    pub arbiter: Arbiter,
    pub scheduler: Scheduler,
    pub config: Arc<Config>,
}

/// Behaviors that can be installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    AutoAuth,
    ChatMessages,
    StartPosition,
    Sneak,
    Jump,
    Rotate,
    Hit,
    CircleWalk,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoAuth => "auto-auth",
            Self::ChatMessages => "chat-messages",
            Self::StartPosition => "start-position",
            Self::Sneak => "anti-afk-sneak",
            Self::Jump => "anti-afk-jump",
            Self::Rotate => "anti-afk-rotate",
            Self::Hit => "anti-afk-hit",
            Self::CircleWalk => "anti-afk-circle-walk",
        }
    }
}

/// Round-robin over the configured chat messages
#[derive(Debug, Clone)]
pub struct MessageCycle {
    messages: Vec<String>,
    next: usize,
}

impl MessageCycle {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages, next: 0 }
    }

    /// Next message, wrapping to the first after the last
    pub fn next_message(&mut self) -> Option<&str> {
        if self.messages.is_empty() {
            return None;
        }
        let index = self.next;
        self.next = (index + 1) % self.messages.len();
        Some(&self.messages[index])
    }
}

/// Install every enabled behavior; returns what was installed
pub fn install(ctx: &BehaviorContext) -> Vec<Behavior> {
    let mut installed = Vec::new();
    let utils = &ctx.config.utils;

    if utils.auto_auth.enabled {
        install_auto_auth(ctx);
        installed.push(Behavior::AutoAuth);
    }

    if utils.chat_messages.enabled {
        install_chat_messages(ctx);
        installed.push(Behavior::ChatMessages);
    }

    if ctx.config.position.enabled {
        match ctx.config.position.target() {
            Some(target) => {
                install_start_position(ctx, target);
                installed.push(Behavior::StartPosition);
            }
            None => warn!("Start position is enabled without coordinates, skipping"),
        }
    }

    if utils.anti_afk.enabled {
        installed.extend(install_anti_afk(ctx));
    }

    info!(
        "Installed behaviors: [{}]",
        installed.iter().map(|b| b.as_str()).collect::<Vec<_>>().join(", ")
    );
    installed
}

fn install_auto_auth(ctx: &BehaviorContext) {
    info!("Started auto-auth module");
    let session = Arc::clone(&ctx.session);
    let password = ctx.config.utils.auto_auth.password.clone();

    ctx.scheduler.register_delayed(TASK_AUTO_AUTH, AUTH_DELAY, move || {
        let session = Arc::clone(&session);
        let password = password.clone();
        async move {
            session.chat(&format!("/register {} {}", password, password)).await?;
            session.chat(&format!("/login {}", password)).await?;
            info!("Authentication commands executed");
            anyhow::Ok(())
        }
    });
}

fn install_chat_messages(ctx: &BehaviorContext) {
    info!("Started chat-messages module");
    let chat = &ctx.config.utils.chat_messages;
    let session = Arc::clone(&ctx.session);

    if chat.repeat {
        let Some(interval) = ctx.config.chat_repeat_interval() else {
            warn!("Unusable chat repeat-delay {}, not repeating", chat.repeat_delay);
            return;
        };
        let cycle = Arc::new(Mutex::new(MessageCycle::new(chat.messages.clone())));
        ctx.scheduler.register(TASK_CHAT, Some(interval), move || {
            let session = Arc::clone(&session);
            let message = cycle.lock().next_message().map(str::to_string);
            async move {
                if let Some(message) = message {
                    session.chat(&message).await?;
                }
                anyhow::Ok(())
            }
        });
    } else {
        let messages = chat.messages.clone();
        ctx.scheduler.register(TASK_CHAT, None, move || {
            let session = Arc::clone(&session);
            let messages = messages.clone();
            async move {
                for message in &messages {
                    session.chat(message).await?;
                }
                anyhow::Ok(())
            }
        });
    }
}

fn install_start_position(ctx: &BehaviorContext, (x, y, z): (f64, f64, f64)) {
    info!("Starting moving to target location ({}, {}, {})", x, y, z);

    let session = Arc::clone(&ctx.session);
    ctx.arbiter.on_goal_reached(move || {
        info!("Bot arrived to target location. {}", session.position());
    });
    ctx.arbiter.set_goal(MovementGoal::Point { x, y, z });
}

fn install_anti_afk(ctx: &BehaviorContext) -> Vec<Behavior> {
    let afk = &ctx.config.utils.anti_afk;
    let mut installed = Vec::new();

    if afk.sneak {
        ctx.session.set_control_state(Control::Sneak, true);
        installed.push(Behavior::Sneak);
    }

    if afk.jump {
        ctx.session.set_control_state(Control::Jump, true);
        installed.push(Behavior::Jump);
    }

    if afk.hit.enabled {
        match ctx.config.hit_interval() {
            Some(interval) => {
                install_hit(ctx, interval);
                installed.push(Behavior::Hit);
            }
            None => warn!("Hit is enabled without a usable delay, skipping"),
        }
    }

    if afk.rotate {
        let session = Arc::clone(&ctx.session);
        ctx.scheduler.register(TASK_ROTATE, Some(ROTATE_INTERVAL), move || {
            let session = Arc::clone(&session);
            async move {
                let heading = session.heading();
                session
                    .look(Heading {
                        yaw: (heading.yaw + ROTATE_STEP).rem_euclid(TAU),
                        pitch: heading.pitch,
                    })
                    .await?;
                anyhow::Ok(())
            }
        });
        installed.push(Behavior::Rotate);
    }

    if afk.circle_walk.enabled {
        match afk.circle_walk.radius {
            Some(radius) => {
                ctx.arbiter
                    .patrol_around(ctx.session.position(), radius, PATROL_STEP);
                installed.push(Behavior::CircleWalk);
            }
            None => warn!("Circle walk is enabled without a radius, skipping"),
        }
    }

    installed
}

fn install_hit(ctx: &BehaviorContext, interval: Duration) {
    let session = Arc::clone(&ctx.session);
    let attack_mobs = ctx.config.utils.anti_afk.hit.attack_mobs;
    ctx.scheduler.register(TASK_HIT, Some(interval), move || {
        let session = Arc::clone(&session);
        async move {
            if attack_mobs {
                let target = session.nearest_entity(&|e: &Entity| e.kind.is_attackable());
                match target {
                    Some(entity) => {
                        session.attack(&entity).await?;
                        return anyhow::Ok(());
                    }
                    None => debug!("No attackable entity in range"),
                }
            }
            session.swing_arm().await?;
            anyhow::Ok(())
        }
    });
}
