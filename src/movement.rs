//! Movement Goal Arbiter
//!
//! Single owner of the agent's navigation target. Manual goals and the
//! autonomous patrol both go through [`Arbiter::set_goal`], so the navigator
//! only ever chases one target.
//!
//! Patrol is best effort: every step the next point is handed to the
//! navigator whether or not the previous one was reached.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;
use crate::session::{NavTarget, Navigator, PathProgress, Position};

/// Scheduler task that advances the patrol
pub const PATROL_TASK: &str = "patrol";

/// Default time spent walking toward each patrol point
pub const PATROL_STEP: Duration = Duration::from_millis(1000);

/// The logical movement goal
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MovementGoal {
    #[default]
    None,
    Point { x: f64, y: f64, z: f64 },
    Patrol { points: Vec<(f64, f64)>, step: Duration },
}

impl MovementGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Point { .. } => "point",
            Self::Patrol { .. } => "patrol",
        }
    }
}

pub type ReachedCallback = Arc<dyn Fn() + Send + Sync>;
pub type StuckCallback = Arc<dyn Fn(PathProgress) + Send + Sync>;

/// Square patrol around `center`: east, south, west, north
pub fn circle_points(center: Position, radius: f64) -> Vec<(f64, f64)> {
    let (x, z) = (center.x, center.z);
    vec![
        (x + radius, z),
        (x, z + radius),
        (x - radius, z),
        (x, z - radius),
    ]
}

#[derive(Default)]
struct ArbiterState {
    goal: MovementGoal,
    /// Bumped on every goal change; patrol ticks from older goals are ignored
    generation: u64,
    on_reached: Option<ReachedCallback>,
    on_stuck: Option<StuckCallback>,
}

struct ArbiterInner {
    navigator: Arc<dyn Navigator>,
    scheduler: Scheduler,
    state: Mutex<ArbiterState>,
}

/// Movement goal arbiter. Clones share the same goal.
#[derive(Clone)]
pub struct Arbiter {
    inner: Arc<ArbiterInner>,
}

impl Arbiter {
    pub fn new(navigator: Arc<dyn Navigator>, scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(ArbiterInner {
                navigator,
                scheduler,
                state: Mutex::new(ArbiterState::default()),
            }),
        }
    }

    pub fn current_goal(&self) -> MovementGoal {
        self.inner.state.lock().goal.clone()
    }

    /// Replace the current goal
    pub fn set_goal(&self, goal: MovementGoal) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.goal = goal.clone();
            state.generation
        };

        // Any running patrol belongs to an older goal now
        self.inner.scheduler.cancel(PATROL_TASK);

        match goal {
            MovementGoal::None => {
                self.inner.navigator.set_goal(None);
                info!("Stopped moving");
            }
            MovementGoal::Point { x, y, z } => {
                self.inner.navigator.set_goal(Some(NavTarget::Block { x, y, z }));
                info!("Moving to target location ({}, {}, {})", x, y, z);
            }
            MovementGoal::Patrol { points, step } => {
                if points.is_empty() || step.is_zero() {
                    self.inner.navigator.set_goal(None);
                    warn!(
                        "Patrol needs points and a non-zero step (got {} points, {:?}); staying put",
                        points.len(),
                        step
                    );
                    return;
                }
                // The navigator keeps its current target until the first step
                info!("Patrolling {} points every {:?}", points.len(), step);
                self.start_patrol(points, step, generation);
            }
        }
    }

    /// Patrol the square of `radius` around `center`
    pub fn patrol_around(&self, center: Position, radius: f64, step: Duration) {
        info!("Starting circle walk around {} with radius {}", center, radius);
        self.set_goal(MovementGoal::Patrol {
            points: circle_points(center, radius),
            step,
        });
    }

    fn start_patrol(&self, points: Vec<(f64, f64)>, step: Duration, generation: u64) {
        let weak: Weak<ArbiterInner> = Arc::downgrade(&self.inner);
        let points = Arc::new(points);
        let next = Arc::new(Mutex::new(0usize));

        self.inner.scheduler.register(PATROL_TASK, Some(step), move || {
            let weak = weak.clone();
            let points = Arc::clone(&points);
            let next = Arc::clone(&next);
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                if inner.state.lock().generation != generation {
                    return Ok(());
                }

                let index = {
                    let mut next = next.lock();
                    let index = *next;
                    *next = (index + 1) % points.len();
                    index
                };
                let (x, z) = points[index];
                debug!("Patrol advancing to point {} ({}, {})", index, x, z);
                inner.navigator.set_goal(Some(NavTarget::Xz { x, z }));
                anyhow::Ok(())
            }
        });
    }

    /// Replace the goal-reached callback
    pub fn on_goal_reached<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.state.lock().on_reached = Some(Arc::new(callback));
    }

    /// Replace the stuck callback
    pub fn on_stuck<F>(&self, callback: F)
    where
        F: Fn(PathProgress) + Send + Sync + 'static,
    {
        self.inner.state.lock().on_stuck = Some(Arc::new(callback));
    }

    /// Forward a goal-reached notification. Never changes the goal.
    pub fn notify_goal_reached(&self) {
        let callback = self.inner.state.lock().on_reached.clone();
        match callback {
            Some(cb) => cb(),
            None => debug!("Goal reached with no listener"),
        }
    }

    /// Forward a stuck notification. Never changes the goal.
    pub fn notify_stuck(&self, progress: PathProgress) {
        let callback = self.inner.state.lock().on_stuck.clone();
        match callback {
            Some(cb) => cb(progress),
            None => debug!("Path stuck after {}ms with no listener", progress.elapsed_ms),
        }
    }
}
