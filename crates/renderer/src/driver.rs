//! Frame driver state machine.
//!
//! The driver owns the instance clock and the single outstanding tick request.
//! It never touches GPU objects; the lifecycle manager decides what the loop
//! conditions are and the driver turns them into state transitions, clock
//! pauses, and `request_tick`/`cancel_tick` calls on the host.
//!
//! ```text
//!            compile ok + visible              visibility lost
//!   Idle  ──────────────────────▶  Running  ──────────────────▶  Suspended
//!    ▲                              │   ▲                            │
//!    └──── compile failed ──────────┘   └──── visibility restored ───┘
//!
//!   any ── destroy ──▶ Destroyed        Running ── context lost ──▶ Lost
//! ```
use std::time::Duration;

use tracing::{debug, trace};

use crate::backend::HostSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No program; nothing scheduled.
    Idle,
    /// A tick is scheduled and every tick draws.
    Running,
    /// Program retained but the loop is paused (hidden, paused, or released).
    Suspended,
    /// The drawing context was lost mid-frame. Nothing is scheduled and every
    /// handle is considered invalid; only a rebuild leaves this state.
    Lost,
    /// Terminal.
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    /// Host time corresponding to elapsed zero.
    pub start_epoch: Duration,
    /// Clock reading at the last tick or pause.
    pub elapsed: Duration,
    /// Whether the caller wants the clock to advance.
    pub running: bool,
}

/// Inputs the lifecycle manager derives from its own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConditions {
    pub visible: bool,
    pub has_program: bool,
    /// GPU resources are currently held (false after release-on-hide).
    pub resident: bool,
}

#[derive(Debug)]
pub struct FrameDriver {
    state: DriverState,
    clock: ClockState,
    tick_pending: bool,
    frames: u64,
}

impl FrameDriver {
    pub fn new(now: Duration) -> Self {
        Self {
            state: DriverState::Idle,
            clock: ClockState {
                start_epoch: now,
                elapsed: Duration::ZERO,
                running: true,
            },
            tick_pending: false,
            frames: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn clock(&self) -> ClockState {
        self.clock
    }

    pub fn tick_pending(&self) -> bool {
        self.tick_pending
    }

    /// Frames drawn since construction.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn set_running(&mut self, running: bool) {
        self.clock.running = running;
    }

    /// Moves to the state implied by `conditions`.
    ///
    /// The loop runs iff the clock is running, the host is visible, and a
    /// program exists. `Lost` and `Destroyed` are left untouched.
    pub fn sync<H: HostSurface>(&mut self, conditions: LoopConditions, now: Duration, host: &mut H) {
        if matches!(self.state, DriverState::Lost | DriverState::Destroyed) {
            return;
        }

        let target = if self.clock.running && conditions.visible && conditions.has_program {
            DriverState::Running
        } else if conditions.resident && !conditions.has_program {
            DriverState::Idle
        } else {
            DriverState::Suspended
        };

        if target == self.state {
            if target == DriverState::Running {
                self.schedule(host);
            }
            return;
        }

        debug!(from = ?self.state, to = ?target, "frame driver transition");
        if target == DriverState::Running {
            // Resume from the frozen reading so time never jumps.
            self.clock.start_epoch = now.saturating_sub(self.clock.elapsed);
            self.state = target;
            self.schedule(host);
        } else {
            if self.state == DriverState::Running {
                self.clock.elapsed = now.saturating_sub(self.clock.start_epoch);
            }
            self.cancel(host);
            self.state = target;
        }
    }

    /// Starts a tick. Returns the clock reading when a tick was pending and
    /// the driver is running; otherwise the call is a no-op.
    pub fn begin_tick(&mut self, now: Duration) -> Option<Duration> {
        if self.state != DriverState::Running || !self.tick_pending {
            trace!(state = ?self.state, "tick ignored");
            return None;
        }
        self.tick_pending = false;
        let elapsed = now.saturating_sub(self.clock.start_epoch);
        self.clock.elapsed = elapsed.max(self.clock.elapsed);
        Some(self.clock.elapsed)
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Requests the next tick if the driver is running and none is pending.
    pub fn schedule<H: HostSurface>(&mut self, host: &mut H) {
        if self.state == DriverState::Running && !self.tick_pending {
            self.tick_pending = true;
            host.request_tick();
        }
    }

    /// Withdraws the pending tick, if any.
    pub fn cancel<H: HostSurface>(&mut self, host: &mut H) {
        if self.tick_pending {
            self.tick_pending = false;
            host.cancel_tick();
        }
    }

    pub fn mark_lost<H: HostSurface>(&mut self, now: Duration, host: &mut H) {
        if self.state == DriverState::Destroyed {
            return;
        }
        if self.state == DriverState::Running {
            self.clock.elapsed = now.saturating_sub(self.clock.start_epoch);
        }
        self.cancel(host);
        self.state = DriverState::Lost;
    }

    /// Leaves `Lost` so a rebuilt instance can resume through [`sync`](Self::sync).
    pub fn revive(&mut self) {
        if self.state == DriverState::Lost {
            self.state = DriverState::Idle;
        }
    }

    /// Enters the terminal state. Callers cancel the pending tick first.
    pub fn mark_destroyed(&mut self, now: Duration) {
        if self.state == DriverState::Running {
            self.clock.elapsed = now.saturating_sub(self.clock.start_epoch);
        }
        self.tick_pending = false;
        self.state = DriverState::Destroyed;
    }
}
