//! Axis motion tracking
//!
//! While a move is outstanding every complete response is inspected: position
//! reports (`CURPOS=<steps>`) update the axis, `OK` ends the move at the
//! commanded destination and `ERROR` abandons it.

use std::time::{Duration, Instant};

use bridge_config::{steps_to_mm, AxisSettings};
use serde::{Deserialize, Serialize};

use super::command::ERROR_MARKER;

pub const POSITION_MARKER: &str = "CURPOS=";
pub const MOVE_ENDED_MARKER: &str = "OK";
pub const NO_SIGNAL_MARKER: &str = "NOSIGNAL";

/// What a response means for the outstanding move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEvent {
    /// Position stream; keep receiving, the exchange is not complete
    Progress,
    /// Destination reached
    Ended,
    /// The device rejected or aborted the move
    Failed,
    /// Nothing motion related, the response completes the exchange as usual
    Unrelated,
}

/// Result of inspecting one response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionUpdate {
    pub event: MotionEvent,
    /// New axis position in mm
    pub position: Option<f64>,
}

/// In-progress view of the last move, for polling callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MotionProgress {
    /// No move outstanding
    Ended,
    /// Position reports stopped arriving within the move's budget
    NotifyTimeout,
    /// Latest known position in mm
    Position(f64),
}

/// How a dispatch changes the outstanding move
#[derive(Debug, Clone)]
pub enum MotionChange {
    Keep,
    /// The command starts a move
    Start(MotionTracker),
    /// The command stops this axis; its move is abandoned
    Cancel(char),
}

/// State of the one outstanding move
#[derive(Debug, Clone)]
pub struct MotionTracker {
    axis: char,
    destination: f64,
    steps_per_mm: u32,
    budget: Duration,
    last_notify: Instant,
    notify_timed_out: bool,
}

impl MotionTracker {
    pub fn new(axis: &AxisSettings, destination: f64, budget: Duration) -> Self {
        Self {
            axis: axis.letter,
            destination,
            steps_per_mm: axis.steps_per_mm,
            budget,
            last_notify: Instant::now(),
            notify_timed_out: false,
        }
    }

    pub fn axis(&self) -> char {
        self.axis
    }

    pub fn destination(&self) -> f64 {
        self.destination
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn notify_timed_out(&self) -> bool {
        self.notify_timed_out
    }

    /// Restart the staleness clock when the move is actually dispatched
    pub fn start(&mut self, now: Instant) {
        self.last_notify = now;
        self.notify_timed_out = false;
    }

    pub fn handle(&mut self, response: &str, now: Instant) -> MotionUpdate {
        let mut position = None;

        if response.contains(NO_SIGNAL_MARKER) {
            // joystick idle report, carries no position
        } else if response.contains(POSITION_MARKER) {
            position = self.parse_position(response);
            if now.saturating_duration_since(self.last_notify) > self.budget {
                self.notify_timed_out = true;
            } else {
                self.last_notify = now;
            }
        }

        let event = if response.contains(MOVE_ENDED_MARKER) {
            position = Some(self.destination);
            MotionEvent::Ended
        } else if response.contains(ERROR_MARKER) {
            MotionEvent::Failed
        } else if response.contains(POSITION_MARKER) {
            MotionEvent::Progress
        } else {
            MotionEvent::Unrelated
        };

        MotionUpdate { event, position }
    }

    /// Value of the last `CURPOS=` report that is terminated by `\n`
    fn parse_position(&self, response: &str) -> Option<f64> {
        let start = response.rfind(POSITION_MARKER)? + POSITION_MARKER.len();
        let end = start + response[start..].find('\n')?;
        let steps: i64 = response[start..end].trim().parse().ok()?;
        steps_to_mm(steps as f64, self.steps_per_mm)
    }
}

/// Staleness budget for a move
///
/// An explicit caller value wins, otherwise three notification periods; either
/// is floored to `minimum`.
pub fn notify_budget(explicit: Option<Duration>, notify_period_ms: u32, minimum: Duration) -> Duration {
    explicit
        .unwrap_or_else(|| Duration::from_millis(3 * u64::from(notify_period_ms)))
        .max(minimum)
}
