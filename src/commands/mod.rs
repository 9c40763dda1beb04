use std::path::{Path, PathBuf};

use blocksync::{Message, TeamConfig};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod replay;

use replay::run_replay;

#[derive(Parser)]
#[command(
    name = "blocksync",
    version,
    about = "Decentralised block-delivery agents: replay recorded worlds, inspect messages and team config",
    long_about = None
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Drive a team of agents through a recorded scenario
    Replay {
        /// Scenario JSON: {"ticks": [{"observations": {"<agent>": {...}}}]}
        #[arg(long)]
        scenario: PathBuf,
        /// Team configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many ticks
        #[arg(short = 't', long)]
        ticks: Option<usize>,
        /// Print each tick as JSON instead of text
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        json: bool,
        /// Write the final report (slots, stats) to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Decode one wire message and pretty-print it
    Decode {
        /// Raw message JSON
        message: String,
    },
    /// Print the resolved per-agent configuration
    Config {
        /// Team configuration (TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also resolve these ids (agents absent from the file get defaults)
        #[arg(long = "agent", value_name = "ID")]
        agents: Vec<String>,
    },
}

pub fn run() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = dispatch(cli.command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn dispatch(command: Command) -> Result<(), String> {
    match command {
        Command::Replay {
            scenario,
            config,
            ticks,
            json,
            report,
        } => run_replay(&scenario, config.as_deref(), ticks, json, report.as_deref()),
        Command::Decode { message } => run_decode(&message),
        Command::Config { config, agents } => run_config(config.as_deref(), &agents),
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<TeamConfig, String> {
    match path {
        Some(path) => TeamConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(TeamConfig::default()),
    }
}

fn run_decode(raw: &str) -> Result<(), String> {
    let message = Message::decode(raw).map_err(|e| e.to_string())?;
    println!("{} from {}", message.kind(), message.agent_id);
    let pretty = serde_json::to_string_pretty(&message.to_wire()).map_err(|e| e.to_string())?;
    println!("{}", pretty);
    Ok(())
}

fn run_config(path: Option<&Path>, extra: &[String]) -> Result<(), String> {
    let config = load_config(path)?;
    let mut profiles = config.profiles();
    for id in extra {
        if !profiles.iter().any(|p| &p.id == id) {
            profiles.push(config.profile(id));
        }
    }
    let json = serde_json::to_string_pretty(&serde_json::json!({
        "defaults": config.defaults,
        "agents": profiles,
    }))
    .map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
