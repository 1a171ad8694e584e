//! Axis-scoped device commands
//!
//! | Operation | Request |
//! |---|---|
//! | define axis | `SETAXIS;<letter>;<steps/mm>;<inverse>;<speed>;<pos steps>;<notify>;<min>;<max>;` |
//! | read position | `GETPOS;<letter>;` |
//! | move | `MOVE;<dest steps>;<speed>;<letter>;` |
//! | stop | `STOP;<letter>;` |
//! | joystick | configured `SETJS;true;...` text, or `SETJS;false;` |

use bridge_config::{steps_to_mm, AxisSettings};
use errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::command::{Command, SendMode, SerialResponse};
use super::motion::{notify_budget, MotionChange, MotionTracker, POSITION_MARKER};
use super::SerialEngine;

pub const JOYSTICK_ENABLE_PREFIX: &str = "SETJS;true;";
pub const JOYSTICK_DISABLE_COMMAND: &str = "SETJS;false;";

/// Parameters of a define/overwrite-axis command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDefinition {
    pub letter: char,
    pub steps_per_mm: u32,
    #[serde(default)]
    pub inverse: bool,
    pub speed: u32,
    #[serde(default)]
    pub rapid_speed: u32,
    /// Current position, mm
    #[serde(default)]
    pub position: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Position notification period, ms
    #[serde(default)]
    pub notify_period: u32,
}

impl SerialEngine {
    /// Create or overwrite an axis and configure it on the device
    ///
    /// Soft limits are taken from `definition` only when the axis is new;
    /// an existing axis keeps its limits.
    pub async fn define_axis(&self, definition: AxisDefinition) -> BridgeResult<SerialResponse> {
        self.inner.ensure_open()?;

        let request = {
            let mut axes = self.inner.axes.write();
            let existed = axes.contains(definition.letter);
            if !existed {
                let mut axis = AxisSettings::new(definition.letter, definition.steps_per_mm);
                axis.axis_min_value = definition.min_value;
                axis.axis_max_value = definition.max_value;
                axes.insert(axis)?;
            }

            let axis = axes
                .get_mut(definition.letter)
                .ok_or(BridgeError::AxisNotFound(definition.letter))?;
            axis.steps_per_mm = definition.steps_per_mm;
            axis.inverse = definition.inverse;
            axis.speed = axis.limit_speed(definition.speed);
            axis.rapid_speed = axis.limit_speed(definition.rapid_speed);
            axis.current_position = definition.position;
            axis.start_pos = 0;
            axis.position_notify_period = definition.notify_period;

            info!(
                "{} axis {}: {} steps/mm, speed {}, limits [{}, {}]",
                if existed { "Redefined" } else { "Defined" },
                axis.letter,
                axis.steps_per_mm,
                axis.speed,
                axis.axis_min_value,
                axis.axis_max_value
            );

            format!(
                "SETAXIS;{};{};{};{};{};{};{};{};",
                axis.letter,
                axis.steps_per_mm,
                axis.inverse,
                axis.speed,
                axis.to_steps(axis.current_position),
                axis.position_notify_period,
                axis.axis_min_value,
                axis.axis_max_value
            )
        };

        self.send(Command::Text(request), SendMode::wait_for(self.command_timeout()))
            .await
    }

    /// Ask the device for an axis position, in mm
    pub async fn get_position(&self, letter: char) -> BridgeResult<f64> {
        self.inner.ensure_open()?;

        let (name, steps_per_mm) = {
            let axes = self.inner.axes.read();
            let axis = axes.get(letter).ok_or(BridgeError::AxisNotFound(letter))?;
            (axis.letter, axis.steps_per_mm)
        };

        if self.is_queued_mode() {
            return Err(BridgeError::invalid_config(
                "queued_mode",
                "reading a position needs an immediate response, leave queued mode first",
            ));
        }

        let request = format!("GETPOS;{};", name);
        let response = self
            .send(Command::Text(request), SendMode::wait_for(self.command_timeout()))
            .await?
            .into_result()?;

        let text = response.text();
        let value = text
            .strip_prefix(POSITION_MARKER)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| {
                BridgeError::MalformedResponse(format!("GETPOS;{}; answered '{}'", name, text))
            })?;

        steps_to_mm(value, steps_per_mm).ok_or_else(|| {
            BridgeError::invalid_config("steps_per_mm", format!("axis {} has no step scale", name))
        })
    }

    /// Move an axis to `destination` (mm)
    ///
    /// `speed` 0 uses the axis speed. Out-of-range destinations fail before
    /// any I/O; moves below the minimum distance or of zero steps succeed
    /// without I/O. Without waiting, progress must be observable through
    /// position notifications or the queue.
    pub async fn move_axis(
        &self,
        letter: char,
        destination: f64,
        speed: u32,
        mode: SendMode,
    ) -> BridgeResult<SerialResponse> {
        self.inner.ensure_open()?;

        let (request, tracker) = {
            let axes = self.inner.axes.read();
            let axis = axes.get(letter).ok_or(BridgeError::AxisNotFound(letter))?;
            if !axis.is_enabled() {
                return Err(BridgeError::AxisDisabled(axis.letter));
            }

            if !axis.in_range(destination) {
                return Err(BridgeError::OutOfRange {
                    axis: axis.letter,
                    target: destination,
                    min: axis.axis_min_value,
                    max: axis.axis_max_value,
                });
            }

            let distance = destination - axis.current_position;
            if axis.min_distance_to_move > 0.0 && distance.abs() < axis.min_distance_to_move {
                debug!("Axis {}: move of {} mm below minimum distance", axis.letter, distance);
                return Ok(SerialResponse::ok(b"OK".to_vec()));
            }
            if axis.to_steps(distance) == 0 {
                return Ok(SerialResponse::ok(b"OK".to_vec()));
            }

            if !mode.is_wait() && axis.position_notify_period == 0 && !self.is_queued_mode() {
                return Err(BridgeError::InvalidMoveMode(axis.letter));
            }

            let speed = if speed > 0 { speed } else { axis.speed };
            let request = format!(
                "MOVE;{};{};{};",
                axis.to_steps(destination),
                speed,
                axis.letter
            );

            let explicit = match mode {
                SendMode::Wait(timeout) => timeout.filter(|t| !t.is_zero()),
                SendMode::NoWait => None,
            };
            let budget = notify_budget(
                explicit,
                axis.position_notify_period,
                self.min_move_notify_timeout(),
            );
            (request, MotionTracker::new(axis, destination, budget))
        };

        let response = self
            .submit(Command::Text(request), mode, MotionChange::Start(tracker))
            .await?;

        if mode.is_wait() && response.is_ok() {
            if let Some(axis) = self.inner.axes.write().get_mut(letter) {
                axis.current_position = destination;
            }
        }
        Ok(response)
    }

    /// Stop an axis; its outstanding move, if any, is abandoned
    pub async fn stop(&self, letter: char) -> BridgeResult<SerialResponse> {
        self.inner.ensure_open()?;

        let name = self
            .inner
            .axes
            .read()
            .get(letter)
            .map(|axis| axis.letter)
            .ok_or(BridgeError::AxisNotFound(letter))?;

        self.submit(
            Command::Text(format!("STOP;{};", name)),
            SendMode::wait_for(self.command_timeout()),
            MotionChange::Cancel(name),
        )
        .await
    }

    /// Enable the joystick on `letter`, or disable it
    ///
    /// Disabling always sends `SETJS;false;`, as does enabling without a
    /// configured command.
    pub async fn joystick(&self, letter: char, enable: bool) -> BridgeResult<SerialResponse> {
        self.inner.ensure_open()?;

        let request = joystick_request(
            &self.inner.settings.joystick_command,
            enable && self.inner.settings.enable_joystick,
            letter,
            |l| self.inner.axes.read().get(l).map(|axis| axis.letter),
        )?;

        self.send(Command::Text(request), SendMode::wait_for(self.command_timeout()))
            .await
    }
}

/// Build the joystick request; `lookup` resolves an axis letter
fn joystick_request(
    configured: &str,
    enable: bool,
    letter: char,
    lookup: impl Fn(char) -> Option<char>,
) -> BridgeResult<String> {
    if !enable || configured.is_empty() {
        return Ok(JOYSTICK_DISABLE_COMMAND.to_string());
    }

    let Some(rest) = configured.strip_prefix(JOYSTICK_ENABLE_PREFIX) else {
        return Ok(configured.to_string());
    };

    let name = lookup(letter).ok_or(BridgeError::AxisNotFound(letter))?;
    // Replace the configured axis field, keep everything after it
    let tail = rest.find(';').map_or(";", |pos| &rest[pos..]);
    Ok(format!("{}{}{}", JOYSTICK_ENABLE_PREFIX, name, tail))
}
