//! Host macro generation
//!
//! Renders the init, move and close-port macro templates with the axis table
//! and the register layout, and writes them as `<name>.m1s` files.
//!
//! Templates use positional `{n}` placeholders (`{{` and `}}` for literal
//! braces):
//!
//! | Template | Arguments |
//! |---|---|
//! | init | axis table block, axis count, init variables per axis, move variables per axis, port, baud rate, start position base, shared register base, axis variable base |
//! | move | axis count, move variables per axis, start position base, shared register base, axis variable base |
//! | close port | shared register base |

use std::fs;
use std::path::{Path, PathBuf};

use bridge_config::registers::{
    AXIS_INIT_VARIABLES_COUNT, AXIS_MOVE_VARIABLES_COUNT, AXIS_START_POSITION_BASE,
    AXIS_VARIABLES_BASE, COMMON_VARIABLES_BASE,
};
use bridge_config::{AxisTable, BridgeSettings};
use errors::{config_error, BridgeError, BridgeResult};
use tracing::{debug, info};

pub const INIT_TEMPLATE_FILE: &str = "MacrosInitTemplate.txt";
pub const MOVE_TEMPLATE_FILE: &str = "MacrosMoveTemplate.txt";
pub const CLOSE_PORT_TEMPLATE_FILE: &str = "MacrosCloseSerialPortTemplate.txt";

/// Extension of generated macro files
pub const MACRO_EXTENSION: &str = "m1s";

/// Column names of the per-axis parameter row, in row order
pub const AXIS_VARIABLES_HEADER: &str = "axis stepsPerMm speed curPosCPeriod estop moveTimeout droNumber droMultiplier startPos curPosNPeriod inverse g0speed axisMinValue axisMaxValue";

const AXIS_SET_OPEN: &str = "axisSet = Array(";

/// The three macro templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroTemplates {
    pub init: String,
    pub move_axis: String,
    pub close_port: String,
}

impl MacroTemplates {
    /// Read the templates from `dir`
    pub fn load(dir: &Path) -> BridgeResult<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            fs::read_to_string(&path).map_err(|e| {
                config_error!("Failed to read macro template {}: {}", path.display(), e)
            })
        };

        Ok(Self {
            init: read(INIT_TEMPLATE_FILE)?,
            move_axis: read(MOVE_TEMPLATE_FILE)?,
            close_port: read(CLOSE_PORT_TEMPLATE_FILE)?,
        })
    }

    /// Templates shipped with the converter
    pub fn builtin() -> Self {
        Self {
            init: include_str!("../templates/MacrosInitTemplate.txt").to_string(),
            move_axis: include_str!("../templates/MacrosMoveTemplate.txt").to_string(),
            close_port: include_str!("../templates/MacrosCloseSerialPortTemplate.txt").to_string(),
        }
    }
}

/// Files written by [`write_macros`]
#[derive(Debug, Default)]
pub struct MacroExport {
    pub files: Vec<PathBuf>,
}

/// Render the three macros into `dir`, named after the configured macro names
pub fn write_macros(
    settings: &BridgeSettings,
    templates: &MacroTemplates,
    dir: &Path,
) -> BridgeResult<MacroExport> {
    if settings.axes.is_empty() {
        return Err(BridgeError::invalid_config("axes", "no axis defined"));
    }

    let axis_count = settings.axes.len().to_string();
    let init_count = AXIS_INIT_VARIABLES_COUNT.to_string();
    let move_count = AXIS_MOVE_VARIABLES_COUNT.to_string();
    let start_base = AXIS_START_POSITION_BASE.to_string();
    let common_base = COMMON_VARIABLES_BASE.to_string();
    let axis_base = AXIS_VARIABLES_BASE.to_string();

    let block = axis_set_block(&settings.axes, &settings.line_terminator);
    let port = settings.port_name.clone();
    let baud = settings.baud_rate.to_string();

    let rendered = [
        (
            &settings.macros.init,
            render_template(
                INIT_TEMPLATE_FILE,
                &templates.init,
                &[
                    &block,
                    &axis_count,
                    &init_count,
                    &move_count,
                    &port,
                    &baud,
                    &start_base,
                    &common_base,
                    &axis_base,
                ],
            )?,
        ),
        (
            &settings.macros.move_axis,
            render_template(
                MOVE_TEMPLATE_FILE,
                &templates.move_axis,
                &[&axis_count, &move_count, &start_base, &common_base, &axis_base],
            )?,
        ),
        (
            &settings.macros.close_port,
            render_template(CLOSE_PORT_TEMPLATE_FILE, &templates.close_port, &[&common_base])?,
        ),
    ];

    fs::create_dir_all(dir)?;

    let mut export = MacroExport::default();
    for (name, content) in rendered {
        let path = dir.join(format!("{}.{}", name, MACRO_EXTENSION));
        fs::write(&path, content)?;
        debug!("Wrote macro {}", path.display());
        export.files.push(path);
    }

    info!("Saved {} macros to {}", export.files.len(), dir.display());
    Ok(export)
}

/// Substitute positional `{n}` placeholders
pub fn render_template(name: &str, template: &str, args: &[&str]) -> BridgeResult<String> {
    let invalid = |reason: String| BridgeError::invalid_config(name, reason);

    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            },
            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_digit() => index.push(d),
                        _ => return Err(invalid(format!("malformed placeholder '{{{}'", index))),
                    }
                }
                let arg = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| args.get(i))
                    .ok_or_else(|| {
                        invalid(format!(
                            "placeholder {{{}}} has no value ({} available)",
                            index,
                            args.len()
                        ))
                    })?;
                out.push_str(arg);
            },
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            },
            '}' => return Err(invalid("unmatched '}'".to_string())),
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Column-aligned `axisSet = Array(...)` with two commented header lines
///
/// ```text
///                'X,                                  Y
///                'axis stepsPerMm speed ...  axis stepsPerMm speed ...
/// axisSet = Array(0,   400,      300,  ...   1,   400,      300,  ...)
/// ```
pub fn axis_set_block(axes: &AxisTable, terminator: &str) -> String {
    let columns: Vec<&str> = AXIS_VARIABLES_HEADER.split_whitespace().collect();
    let indent = " ".repeat(AXIS_SET_OPEN.len() - 1);
    let mut block = String::new();

    let letters: Vec<String> = axes.iter().map(|axis| axis.letter.to_string()).collect();
    block.push_str(&indent);
    block.push('\'');
    push_aligned(
        &mut block,
        &letters,
        std::iter::repeat(AXIS_VARIABLES_HEADER.len()),
    );
    block.push_str(terminator);

    block.push_str(&indent);
    block.push('\'');
    block.push_str(&vec![AXIS_VARIABLES_HEADER; axes.len()].join(" "));
    block.push_str(terminator);

    let values: Vec<String> = axes.parameter_table().into_iter().flatten().collect();
    block.push_str(AXIS_SET_OPEN);
    push_aligned(
        &mut block,
        &values,
        columns.iter().map(|column| column.len()).cycle(),
    );
    block.push(')');

    block
}

/// `value,` padded to its column width; the last value has neither comma nor padding
fn push_aligned(out: &mut String, values: &[String], widths: impl Iterator<Item = usize>) {
    let last = values.len().saturating_sub(1);
    for (i, (value, width)) in values.iter().zip(widths).enumerate() {
        out.push_str(value);
        if i < last {
            out.push(',');
            out.push_str(&" ".repeat(width.saturating_sub(value.len())));
        }
    }
}
