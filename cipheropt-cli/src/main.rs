// CLI application
use clap::{Parser, ValueEnum};
use cipheropt_core::compiler::config::OptimizationLevel;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

mod commands;

use commands::{encode_module, inspect_encoding, inspect_module, optimize_module};

#[derive(Parser)]
#[command(name = "cipheropt")]
#[command(about = "Expression tree optimizer for secure arithmetic")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    None,
    Basic,
    Aggressive,
}

impl From<Level> for OptimizationLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::None => OptimizationLevel::None,
            Level::Basic => OptimizationLevel::Basic,
            Level::Aggressive => OptimizationLevel::Aggressive,
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Optimize every opted-in function of a module
    Optimize {
        /// Path to the JSON module description
        #[arg(short, long)]
        input: PathBuf,

        /// Optimization level (ignored when --config is given)
        #[arg(short, long, value_enum, default_value = "basic")]
        level: Level,

        /// Path to an optimizer configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write statistics, reports and encodings as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the tree encoding of one function
    Encode {
        /// Path to the JSON module description
        #[arg(short, long)]
        input: PathBuf,

        /// Function to encode
        #[arg(short, long)]
        function: String,

        /// Write the encoding to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the expression trees of a module, or decode a saved encoding
    Inspect {
        /// Path to the JSON module description
        #[arg(short, long, required_unless_present = "encoding")]
        input: Option<PathBuf>,

        /// Only inspect this function
        #[arg(short, long)]
        function: Option<String>,

        /// Path to a JSON tree encoding to decode; constants are recovered from
        /// `--input` when it is given
        #[arg(short, long)]
        encoding: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            input,
            level,
            config,
            output,
        } => {
            let pb = create_progress_bar("Optimizing module...");
            optimize_module(&input, level.into(), config.as_deref(), output.as_deref())?;
            pb.finish_with_message("Optimization complete");
        }
        Commands::Encode {
            input,
            function,
            output,
        } => {
            let pb = create_progress_bar("Encoding expression trees...");
            encode_module(&input, &function, output.as_deref())?;
            pb.finish_with_message("Encoding complete");
        }
        Commands::Inspect {
            input,
            function,
            encoding,
        } => {
            match (input, encoding) {
                (input, Some(encoding)) => inspect_encoding(&encoding, input.as_deref())?,
                (Some(input), None) => inspect_module(&input, function.as_deref())?,
                (None, None) => anyhow::bail!("Either --input or --encoding is required"),
            }
        }
    }

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
