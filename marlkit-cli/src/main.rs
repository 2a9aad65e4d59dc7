//! marlkit CLI: hyperparameter sweeps over training scripts and scripted
//! action courses for two-agent cooking episodes.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// marlkit: sweeps and courses for multi-agent RL experiments
#[derive(Parser, Debug)]
#[command(name = "marlkit", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Patch and sweep training scripts
    Sweep {
        #[command(subcommand)]
        action: SweepAction,
    },
    /// Generate and inspect action courses
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default `.marlkit/config.toml`
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(clap::Subcommand, Debug)]
enum SweepAction {
    /// Write the patched script next to the original and print its path
    Patch {
        /// Training script containing the factory function
        script: PathBuf,
        /// Hyperparameter to inject (repeatable, order is kept)
        #[arg(short, long = "param", required = true)]
        params: Vec<String>,
        /// Factory function name
        #[arg(long)]
        function: Option<String>,
        /// Inner training function name
        #[arg(long)]
        subfunction: Option<String>,
    },
    /// Run every seed x hyperparameter combination through the script
    Run {
        /// Training script containing the factory function
        script: PathBuf,
        /// Hyperparameter space file (TOML or JSON: name -> [values])
        #[arg(long)]
        space: PathBuf,
        /// Base training config file (JSON object)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seeds per hyperparameter combination
        #[arg(long)]
        seeds: Option<usize>,
        /// Root seed the per-run seeds are split from
        #[arg(long)]
        seed: Option<u64>,
        /// Environment passed to the factory as make(ENV)
        #[arg(long)]
        env: Option<String>,
        /// Keep the patched module after the run
        #[arg(long)]
        keep_tmp: bool,
        /// Write the full sweep output as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the seed mean of this output leaf per run (e.g. metrics/returns)
        #[arg(long)]
        mean: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CourseAction {
    /// Append randomly generated courses
    Generate {
        /// Course file (defaults to course.file from config)
        file: Option<PathBuf>,
        /// Actions per agent
        #[arg(short = 'n', long)]
        length: Option<usize>,
        /// Number of courses to append
        #[arg(short, long, default_value = "1")]
        count: usize,
        /// Seed for reproducible courses
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List every course in the file
    List {
        /// Course file (defaults to course.file from config)
        file: Option<PathBuf>,
    },
    /// Print the course at a zero-based index as JSON
    Show {
        /// Zero-based course index
        index: usize,
        /// Course file (defaults to course.file from config)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "marlkit", "marlkit")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "marlkit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
