//! `gcconv` command line

use std::path::PathBuf;

use anyhow::Context;
use bridge_config::BridgeSettings;
use clap::{Parser, Subcommand};
use common::LogConfig;
use errors::BridgeError;
use tracing::{info, warn, Level};

use crate::converter::convert_file;
use crate::macros::{write_macros, MacroTemplates};

/// GCode converter CLI
#[derive(Parser, Debug)]
#[command(
    name = "gcconv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Convert GCode programs and generate host macros for the serial bridge",
    long_about = None
)]
pub struct Cli {
    /// Settings file (default: settings.yaml in the working directory or GCConverter/)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a GCode program
    Convert {
        /// Source program
        source: PathBuf,
        /// Converted program, replaced if it exists
        destination: PathBuf,
    },

    /// Generate the init, move and close-port macros
    Macros {
        /// Output directory, usually the host profile's macro folder
        directory: PathBuf,
        /// Directory holding custom macro templates
        #[arg(short, long)]
        templates: Option<PathBuf>,
    },

    /// Check the settings file and print every problem found
    Validate,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = BridgeSettings::load(cli.config.as_deref())?;

    common::logging::init_with_config(LogConfig {
        service_name: "gcconv".to_string(),
        log_dir: settings.log_folder.clone(),
        console_level: cli.log_level.parse().unwrap_or(Level::INFO),
        enable_file: settings.enable_log,
        enable_json: false,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let result = execute(&settings, cli.command);
    if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<BridgeError>()) {
        err.log("gcconv");
    }
    result
}

fn execute(settings: &BridgeSettings, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Convert {
            source,
            destination,
        } => {
            let stats = convert_file(settings, &source, &destination)
                .with_context(|| format!("Failed to convert {}", source.display()))?;
            println!(
                "{} -> {}: {} lines in, {} lines out",
                source.display(),
                destination.display(),
                stats.source_lines,
                stats.output_lines
            );
        },
        Commands::Macros {
            directory,
            templates,
        } => {
            let templates = match templates {
                Some(dir) => MacroTemplates::load(&dir)?,
                None => MacroTemplates::builtin(),
            };
            let export = write_macros(settings, &templates, &directory)?;
            for file in &export.files {
                println!("{}", file.display());
            }
        },
        Commands::Validate => {
            let result = settings.validate();
            for warning in &result.warnings {
                warn!("{}", warning);
                println!("warning: {}", warning);
            }
            for error in &result.errors {
                println!("error: {}", error);
            }
            if !result.is_valid {
                anyhow::bail!("{} problem(s) found in settings", result.errors.len());
            }
            info!("Settings are valid");
            println!("settings OK");
        },
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from(["gcconv", "-c", "cfg.yaml", "convert", "in.nc", "out.tap"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yaml")));
        match cli.command {
            Commands::Convert {
                source,
                destination,
            } => {
                assert_eq!(source, PathBuf::from("in.nc"));
                assert_eq!(destination, PathBuf::from("out.tap"));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_macros_with_templates() {
        let cli = Cli::try_parse_from(["gcconv", "macros", "out", "--templates", "tpl", "-l", "debug"])
            .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Macros {
                directory,
                templates,
            } => {
                assert_eq!(directory, PathBuf::from("out"));
                assert_eq!(templates, Some(PathBuf::from("tpl")));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_convert_requires_both_paths() {
        assert!(Cli::try_parse_from(["gcconv", "convert", "in.nc"]).is_err());
    }
}
