//! `serialsrv` command line
//!
//! Opens the configured port, runs one engine operation and prints the outcome.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bridge_config::BridgeSettings;
use clap::{Parser, Subcommand, ValueEnum};
use common::LogConfig;
use errors::BridgeError;
use tracing::{info, Level};

use crate::engine::{AxisDefinition, Command, MotionProgress, SendMode, SerialEngine, SerialResponse};
use crate::modbus::{ModbusCommand, ModbusFunction, RegisterType};

/// Serial command engine CLI
#[derive(Parser, Debug)]
#[command(
    name = "serialsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Send commands to the motor controller over the serial bridge",
    long_about = None
)]
pub struct Cli {
    /// Settings file (default: settings.yaml in the working directory or GCConverter/)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Serial port, overrides the settings
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Baud rate, overrides the settings
    #[arg(short, long, global = true)]
    pub baud: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a raw text command
    Raw {
        /// Command text, e.g. "GETPOS;X;"
        command: String,
        /// Do not wait for the response
        #[arg(long)]
        no_wait: bool,
        /// Response timeout in ms (default: read timeout)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Send a Modbus request and print the register values
    Modbus {
        #[arg(long, default_value_t = 1)]
        slave: u8,
        #[arg(long, value_enum, default_value = "holding")]
        register: RegisterArg,
        #[arg(long, value_enum, default_value = "read")]
        function: FunctionArg,
        /// Register address
        address: u16,
        /// Read count or value to write
        data: u16,
    },

    /// Define or redefine an axis on the device
    SetAxis {
        letter: char,
        steps_per_mm: u32,
        speed: u32,
        #[arg(long, default_value_t = 0)]
        rapid_speed: u32,
        #[arg(long)]
        inverse: bool,
        /// Current position, mm
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        position: f64,
        #[arg(long, default_value_t = -20.0, allow_negative_numbers = true)]
        min: f64,
        #[arg(long, default_value_t = 40.0, allow_negative_numbers = true)]
        max: f64,
        /// Position notification period, ms
        #[arg(long, default_value_t = 0)]
        notify: u32,
    },

    /// Move an axis
    Move {
        letter: char,
        /// Destination, mm
        #[arg(allow_negative_numbers = true)]
        destination: f64,
        /// Speed, 0 = axis default
        #[arg(long, default_value_t = 0)]
        speed: u32,
        /// Return right away and follow the position notifications
        #[arg(long)]
        no_wait: bool,
        /// Response timeout in ms
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Read an axis position
    Position { letter: char },

    /// Stop an axis
    Stop { letter: char },

    /// Enable or disable the joystick on an axis
    Joystick {
        letter: char,
        #[arg(long)]
        disable: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RegisterArg {
    Holding,
    Input,
    Discrete,
    Coils,
}

impl From<RegisterArg> for RegisterType {
    fn from(arg: RegisterArg) -> Self {
        match arg {
            RegisterArg::Holding => Self::Holding,
            RegisterArg::Input => Self::Input,
            RegisterArg::Discrete => Self::Discrete,
            RegisterArg::Coils => Self::Coils,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FunctionArg {
    Read,
    Write,
    WriteMany,
}

impl From<FunctionArg> for ModbusFunction {
    fn from(arg: FunctionArg) -> Self {
        match arg {
            FunctionArg::Read => Self::ReadValue,
            FunctionArg::Write => Self::SetValue,
            FunctionArg::WriteMany => Self::SetValues,
        }
    }
}

/// Poll interval while following a move
const MOVE_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = BridgeSettings::load(cli.config.as_deref())?;

    common::logging::init_with_config(LogConfig {
        service_name: "serialsrv".to_string(),
        log_dir: settings.log_folder.clone(),
        console_level: cli.log_level.parse().unwrap_or(Level::INFO),
        enable_file: settings.enable_log,
        enable_json: false,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let engine = SerialEngine::new(settings)?;
    engine
        .open_serial(cli.port.as_deref(), cli.baud)
        .await
        .context("Failed to open serial port")?;

    let result = execute(&engine, cli.command).await;
    if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<BridgeError>()) {
        err.log("Command failed");
    }
    engine.close().await;
    result
}

async fn execute(engine: &SerialEngine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Raw {
            command,
            no_wait,
            timeout_ms,
        } => {
            let mode = if no_wait {
                SendMode::NoWait
            } else {
                SendMode::Wait(timeout_ms.map(Duration::from_millis))
            };
            print_response(&engine.send(Command::Text(command), mode).await?);
        },
        Commands::Modbus {
            slave,
            register,
            function,
            address,
            data,
        } => {
            let frame =
                ModbusCommand::build(slave, register.into(), function.into(), address, data)?;
            let values = engine.send_modbus(frame).await?;
            println!("{:?}", values);
        },
        Commands::SetAxis {
            letter,
            steps_per_mm,
            speed,
            rapid_speed,
            inverse,
            position,
            min,
            max,
            notify,
        } => {
            let response = engine
                .define_axis(AxisDefinition {
                    letter,
                    steps_per_mm,
                    inverse,
                    speed,
                    rapid_speed,
                    position,
                    min_value: min,
                    max_value: max,
                    notify_period: notify,
                })
                .await?;
            print_response(&response);
        },
        Commands::Move {
            letter,
            destination,
            speed,
            no_wait,
            timeout_ms,
        } => {
            let mode = if no_wait {
                SendMode::NoWait
            } else {
                SendMode::Wait(timeout_ms.map(Duration::from_millis))
            };
            let response = engine.move_axis(letter, destination, speed, mode).await?;
            print_response(&response);
            if no_wait {
                follow_move(engine).await;
            }
        },
        Commands::Position { letter } => {
            println!("{}", engine.get_position(letter).await?);
        },
        Commands::Stop { letter } => {
            print_response(&engine.stop(letter).await?);
        },
        Commands::Joystick { letter, disable } => {
            print_response(&engine.joystick(letter, !disable).await?);
        },
    }

    let stats = engine.stats();
    info!(
        "Sent {} requests ({} bytes), {} responses, {} timeouts",
        stats.requests, stats.bytes_sent, stats.responses, stats.timeouts
    );
    Ok(())
}

/// Print position notifications until the move ends
async fn follow_move(engine: &SerialEngine) {
    loop {
        match engine.moving_position() {
            MotionProgress::Ended => {
                println!("move ended");
                break;
            },
            MotionProgress::NotifyTimeout => {
                println!("position notifications timed out");
                break;
            },
            MotionProgress::Position(position) => println!("{:.3}", position),
        }
        if !engine.is_open() {
            break;
        }
        tokio::time::sleep(MOVE_POLL_INTERVAL).await;
    }
}

fn print_response(response: &SerialResponse) {
    println!("{:?}: {}", response.code, response.text());
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_with_negative_destination() {
        let cli = Cli::try_parse_from(["serialsrv", "--port", "/dev/ttyUSB0", "move", "x", "-3.5"])
            .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        match cli.command {
            Commands::Move {
                letter,
                destination,
                no_wait,
                ..
            } => {
                assert_eq!(letter, 'x');
                assert_eq!(destination, -3.5);
                assert!(!no_wait);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_modbus() {
        let cli = Cli::try_parse_from([
            "serialsrv", "modbus", "--function", "write", "--slave", "2", "0", "20000",
        ])
        .unwrap();
        match cli.command {
            Commands::Modbus {
                slave,
                function,
                address,
                data,
                ..
            } => {
                assert_eq!(slave, 2);
                assert!(matches!(function, FunctionArg::Write));
                assert_eq!((address, data), (0, 20000));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_axis_limits() {
        let cli = Cli::try_parse_from([
            "serialsrv", "set-axis", "Z", "400", "300", "--min", "-50", "--max", "0",
        ])
        .unwrap();
        match cli.command {
            Commands::SetAxis { min, max, .. } => {
                assert_eq!(min, -50.0);
                assert_eq!(max, 0.0);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
