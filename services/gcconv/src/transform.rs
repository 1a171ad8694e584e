//! Per-line GCode rewriting
//!
//! Turns one source line into the lines of the converted program. Axis words
//! of enabled axes become register assignments followed by a call of the move
//! macro; spindle directives get a spindle trigger in front of them.
//!
//! ```text
//! G1 X10.5 F500      G1 F500        (kept line, X removed)
//!                    #15=0          (axis select, only when it changes)
//!                    #16=10.500     (destination)
//!                    #17=500        (speed override, when not the default)
//!                    M3             (move macro)
//! ```

use bridge_config::registers::start_position_address;
use bridge_config::{AxisSettings, BridgeSettings, CommonRegister, MacroNames};
use errors::{conversion_error, BridgeResult};
use tracing::debug;

/// Spindle directives in the order they are looked for
const SPINDLE_DIRECTIVES: [&str; 3] = ["M3", "M4", "M5"];
const SPINDLE_STOP: &str = "M5";

/// Move classification taken from the line's leading opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    /// `G0`/`G00`: always runs at the axis rapid speed
    Rapid,
    /// `G1`/`G01`
    Linear,
    /// Axis word without a recognised motion opcode
    Move,
}

impl MotionKind {
    fn of_line(line: &str) -> Self {
        let upper = line.trim_start().to_ascii_uppercase();
        if opcode_matches(&upper, &["G00", "G0"]) {
            Self::Rapid
        } else if opcode_matches(&upper, &["G01", "G1"]) {
            Self::Linear
        } else {
            Self::Move
        }
    }
}

/// `line` starts with one of `codes` not followed by another digit
fn opcode_matches(line: &str, codes: &[&str]) -> bool {
    codes.iter().any(|code| {
        line.strip_prefix(code)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
    })
}

/// One axis move captured from a source line
#[derive(Debug, Clone, PartialEq)]
pub struct AxisMotion {
    pub axis: char,
    /// Ordinal among all configured axes
    pub index: usize,
    pub destination: f64,
    /// Per-move speed, 0 when the device default applies
    pub speed: u32,
    pub kind: MotionKind,
}

/// Stateful line rewriter for one converted file
#[derive(Debug)]
pub struct LineTransformer {
    /// Enabled axes in letter order
    axes: Vec<AxisSettings>,
    alphabet: Vec<char>,
    disable_macros: Vec<String>,
    macros: MacroNames,
    terminator: String,
    last_axis_index: Option<usize>,
    source_lines: usize,
    output_lines: usize,
}

impl LineTransformer {
    /// Fails when no axis is enabled: nothing could be delegated
    pub fn new(settings: &BridgeSettings) -> BridgeResult<Self> {
        let axes: Vec<AxisSettings> = settings.axes.enabled().cloned().collect();
        if axes.is_empty() {
            return Err(conversion_error!("No axis selected. Operation canceled."));
        }

        Ok(Self {
            axes,
            alphabet: settings.axis_alphabet_letters(),
            disable_macros: settings
                .disable_macros
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .collect(),
            macros: settings.macros.clone(),
            terminator: settings.line_terminator.clone(),
            last_axis_index: None,
            source_lines: 0,
            output_lines: 0,
        })
    }

    pub fn source_lines(&self) -> usize {
        self.source_lines
    }

    pub fn output_lines(&self) -> usize {
        self.output_lines
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Rewrite one logical source line, appending the result to `out`
    ///
    /// The first line of a file is replaced by the initialisation header.
    pub fn transform_line(&mut self, line: &str, out: &mut String) {
        self.source_lines += 1;
        let line = line.trim();

        if self.source_lines == 1 {
            self.push_header(out);
            return;
        }

        if line.starts_with('(') {
            self.push_line(out, line);
            return;
        }

        if self.disable_macros.iter().any(|m| line.contains(m.as_str())) {
            self.push_line(out, &CommonRegister::PluginEnable.assign(0));
            self.push_line(out, line);
            self.push_line(out, &CommonRegister::PluginEnable.assign(1));
            return;
        }

        let kept = self.rewrite_spindle(line, out);
        if kept.is_empty() {
            return;
        }

        let (kept, motions) = self.capture_motions(line, kept);

        let only_axis_words = !motions.is_empty()
            && !kept
                .chars()
                .any(|k| self.alphabet.iter().any(|a| a.eq_ignore_ascii_case(&k)));
        if !only_axis_words && !kept.is_empty() {
            self.push_line(out, &kept);
        }

        for motion in &motions {
            self.push_motion(out, motion);
        }
    }

    /// Plugin enable, one-time start positions, then close and reopen the port
    fn push_header(&mut self, out: &mut String) {
        self.push_line(out, &CommonRegister::PluginEnable.assign(1));

        let starts: Vec<String> = self
            .axes
            .iter()
            .enumerate()
            .map(|(position, axis)| {
                format!(
                    "#{}={:.3}",
                    start_position_address(position),
                    f64::from(axis.start_pos)
                )
            })
            .collect();
        for start in &starts {
            self.push_line(out, start);
        }

        let close = self.macros.close_port.clone();
        let init = self.macros.init.clone();
        self.push_line(out, &close);
        self.push_line(out, &init);
    }

    /// Emit the spindle trigger and directive, return the line without them
    fn rewrite_spindle(&mut self, line: &str, out: &mut String) -> String {
        let upper = line.to_ascii_uppercase();
        let Some((directive, start)) = SPINDLE_DIRECTIVES
            .iter()
            .find_map(|d| upper.find(d).map(|pos| (*d, pos)))
        else {
            return line.to_string();
        };

        // M30, M40...: a different opcode
        if upper[start + directive.len()..].starts_with(|c: char| c.is_ascii_digit()) {
            return line.to_string();
        }

        self.push_line(out, &CommonRegister::SpindleTrigger.assign(1));

        let speed = (directive != SPINDLE_STOP)
            .then(|| find_spindle_speed(&upper))
            .flatten();

        let kept = match speed {
            Some((speed_start, speed_len)) => {
                self.push_line(out, &line[speed_start..speed_start + speed_len]);
                self.push_line(out, directive);
                // Remove the later token first so the earlier offset stays valid
                let mut spans = [(start, directive.len()), (speed_start, speed_len)];
                spans.sort_by(|a, b| b.0.cmp(&a.0));
                spans
                    .iter()
                    .fold(line.to_string(), |kept, &(pos, len)| remove_span(&kept, pos, len))
            },
            None => {
                self.push_line(out, directive);
                remove_span(line, start, directive.len())
            },
        };
        kept.trim().to_string()
    }

    /// Scan `line` for feed and axis words; replaced axis words are removed from `kept`
    fn capture_motions(&self, line: &str, mut kept: String) -> (String, Vec<AxisMotion>) {
        let kind = MotionKind::of_line(line);
        let bytes = line.as_bytes();
        let mut feed: Option<f64> = None;
        let mut captured: Vec<(&AxisSettings, f64)> = Vec::new();

        let mut i = 0;
        while i < bytes.len() {
            let letter = bytes[i].to_ascii_uppercase();
            if !letter.is_ascii_alphabetic() {
                i += 1;
                continue;
            }

            let len = number_len(&bytes[i + 1..]);
            let number = &line[i + 1..i + 1 + len];

            if letter == b'F' {
                if let Ok(value) = number.parse::<f64>() {
                    feed = Some(value);
                }
            } else if let Some(axis) = self.axis(char::from(letter)) {
                match number.parse::<f64>() {
                    Ok(destination) => {
                        if axis.replace_in_source {
                            kept = remove_word(&kept, &line[i..i + 1 + len]);
                        }
                        captured.push((axis, destination));
                    },
                    Err(_) if len > 0 => debug!("Skipping unparsable axis word in '{}'", line),
                    Err(_) => {},
                }
            }

            i += 1 + len;
        }

        let motions = captured
            .into_iter()
            .map(|(axis, destination)| AxisMotion {
                axis: axis.letter,
                index: axis.index,
                destination,
                speed: resolve_speed(axis, kind, feed),
                kind,
            })
            .collect();

        (kept.trim().to_string(), motions)
    }

    fn push_motion(&mut self, out: &mut String, motion: &AxisMotion) {
        if self.last_axis_index != Some(motion.index) {
            self.push_line(out, &CommonRegister::AxisSelect.assign(motion.index));
            self.last_axis_index = Some(motion.index);
        }

        self.push_line(
            out,
            &CommonRegister::Destination.assign(format!("{:.3}", motion.destination)),
        );

        let default_speed = self.axis(motion.axis).map_or(0, |axis| axis.speed);
        if motion.speed != 0 && motion.speed != default_speed {
            self.push_line(out, &CommonRegister::SpeedOverride.assign(motion.speed));
        }

        let macro_name = self.macros.move_axis.clone();
        self.push_line(out, &macro_name);
    }

    fn axis(&self, letter: char) -> Option<&AxisSettings> {
        let letter = letter.to_ascii_uppercase();
        self.axes.iter().find(|axis| axis.letter == letter)
    }

    fn push_line(&mut self, out: &mut String, line: &str) {
        out.push_str(line);
        out.push_str(&self.terminator);
        self.output_lines += 1;
    }
}

/// Rapid moves use the rapid speed; other moves the feed capped by the
/// axis ceiling, or no override when the feed is zero or absent
fn resolve_speed(axis: &AxisSettings, kind: MotionKind, feed: Option<f64>) -> u32 {
    match (kind, feed) {
        (MotionKind::Rapid, _) => axis.rapid_speed,
        (_, Some(feed)) if feed > 0.0 => axis.limit_speed(feed as u32),
        _ => 0,
    }
}

/// Length of the run of `[0-9.-]` at the start of `bytes`
fn number_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|&&b| b.is_ascii_digit() || b == b'-' || b == b'.')
        .count()
}

/// First `S<digits>` word as `(start, len)`; `upper` is the upper-cased line
fn find_spindle_speed(upper: &str) -> Option<(usize, usize)> {
    let bytes = upper.as_bytes();
    bytes.iter().enumerate().find_map(|(pos, &b)| {
        let digits = bytes[pos + 1..]
            .iter()
            .take_while(|d| d.is_ascii_digit())
            .count();
        (b == b'S' && digits > 0).then_some((pos, 1 + digits))
    })
}

/// Remove `len` bytes at `start`, collapsing the whitespace left on both sides
fn remove_span(line: &str, start: usize, len: usize) -> String {
    let before = &line[..start];
    let after = &line[start + len..];
    if before.ends_with(char::is_whitespace) && after.starts_with(char::is_whitespace) {
        format!("{}{}", before, after.trim_start())
    } else {
        format!("{}{}", before, after)
    }
}

/// Remove the first occurrence of `word`
fn remove_word(line: &str, word: &str) -> String {
    match line.find(word) {
        Some(start) => remove_span(line, start, word.len()),
        None => line.to_string(),
    }
}
