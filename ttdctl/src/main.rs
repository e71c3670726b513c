//! Dedicated game-server controller.
//!
//! Starts the server in a session directory, relays console commands from stdin,
//! autosaves with pruning, and keeps the session's `openttd.cfg` in sync.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use ttdctl::exit_codes;
use ttdctl::io::config::{ControllerConfig, DEFAULT_SETTINGS_PATH, load_config};
use ttdctl::logging;
use ttdctl::session::{Action, LaunchOptions, resolve_action, run_action};
use ttdctl::supervisor::{StopReason, SupervisorOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "ttdctl",
    version,
    about = "Run a dedicated game server with autosave and console relay"
)]
struct Cli {
    /// `create` a new session or `load` the newest savegame of an existing one.
    #[arg(value_enum)]
    action: Option<Action>,

    /// Session directory (default: the latest-session link, or game.001).
    dir: Option<PathBuf>,

    /// Starting year for a new game.
    #[arg(short = 't', long)]
    starting_year: Option<u32>,

    /// Server password.
    #[arg(short, long)]
    password: Option<String>,

    /// Install this config file instead of the session's `openttd.cfg`.
    #[arg(short = 'c', long, value_name = "FILE")]
    use_config: Option<PathBuf>,

    /// Minutes between autosaves.
    #[arg(short, long, value_name = "MINUTES")]
    autosave: Option<u64>,

    /// Create even if the directory already holds savegames.
    #[arg(short, long)]
    force: bool,

    /// Debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Server executable.
    #[arg(short, long, value_name = "FILE")]
    server: Option<String>,

    /// Directory holding the runtime `openttd.cfg` and `default.cfg`.
    #[arg(short = 'u', long, value_name = "DIR")]
    personal_dir: Option<PathBuf>,

    /// Controller settings file.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_input: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            // Printing help can only fail on a closed stdout.
            let _ = err.print();
            process::exit(code);
        }
    };
    logging::init(cli.debug);

    match run(cli) {
        Ok(outcome) => process::exit(exit_code(&outcome)),
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<SupervisorOutcome> {
    let config = settings(&cli)?;
    let request = resolve_action(cli.action, cli.dir, &config.last_link)?;
    let options = LaunchOptions {
        starting_year: cli.starting_year,
        password: cli.password,
        use_config: cli.use_config,
        force: cli.force,
        interactive: !cli.no_input,
    };
    debug!(?request, ?options, "starting session");
    run_action(&request, &options, &config)
}

/// Settings file with command-line overrides applied.
fn settings(cli: &Cli) -> Result<ControllerConfig> {
    let mut config = load_config(&cli.settings)?;
    if let Some(server) = &cli.server {
        config.server = server.clone();
    }
    if let Some(minutes) = cli.autosave {
        config.autosave_minutes = minutes;
    }
    if let Some(dir) = &cli.personal_dir {
        config.personal_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn exit_code(outcome: &SupervisorOutcome) -> i32 {
    match outcome.exit {
        Some(exit) if outcome.reason == StopReason::ServerExited && !exit.success() => {
            exit_codes::SERVER_FAILED
        }
        _ => exit_codes::OK,
    }
}
