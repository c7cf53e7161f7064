mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{Session, EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_SUCCESS};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "modorder",
    version,
    about = "Check and fix dependency and load-order problems in a mod list"
)]
struct Cli {
    /// Directory containing one subdirectory per installed package.
    #[arg(long, default_value = "mods", global = true)]
    mods: PathBuf,

    /// Active order file.
    #[arg(long, default_value = "modlist.json", global = true)]
    modlist: PathBuf,

    /// Per-package user data directory.
    #[arg(long, default_value = ".modorder", global = true)]
    data: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Treat failed version checks as critical.
    #[arg(long, default_value_t = false, global = true)]
    developer: bool,

    /// Skip remote version checks.
    #[arg(long, default_value_t = false, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List installed packages with their load position and worst severity.
    List {
        /// Only show active packages.
        #[arg(long, default_value_t = false)]
        active: bool,
    },
    /// Report every problem in the active mod list.
    Check {
        /// Lowest severity that makes the command exit non-zero (1-3).
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=3))]
        fail_on: u8,
        /// Seconds to wait for remote version checks.
        #[arg(long, default_value_t = 15)]
        wait: u64,
    },
    /// Apply the first remedy of every critical problem and save the order.
    Fix {
        /// Print the remedies that would be applied without saving.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the content hash of an installed package.
    Hash {
        /// Package id.
        id: String,
    },
    /// Manage local copies that track a source package.
    Source {
        #[command(subcommand)]
        action: SourceCommand,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum SourceCommand {
    /// Record `source` as the origin of `id`, taking its current content as baseline.
    Set { id: String, source: String },
    /// Forget the source of `id`.
    Clear { id: String },
    /// Show files that differ between `id` and its source.
    Diff { id: String },
    /// Replace `id` with a fresh copy of its source.
    Sync { id: String },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MODORDER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let session = Session {
        mods: cli.mods,
        modlist: cli.modlist,
        data: cli.data,
        json: cli.json,
        developer: cli.developer,
        offline: cli.offline,
    };

    let result = match cli.command {
        Commands::List { active } => commands::list::run(&session, active),
        Commands::Check { fail_on, wait } => commands::check::run(&session, fail_on, wait),
        Commands::Fix { dry_run } => commands::fix::run(&session, dry_run),
        Commands::Hash { id } => commands::hash::run(&session, &id),
        Commands::Source { action } => match action {
            SourceCommand::Set { id, source } => commands::source::set(&session, &id, &source),
            SourceCommand::Clear { id } => commands::source::clear(&session, &id),
            SourceCommand::Diff { id } => commands::source::diff(&session, &id),
            SourceCommand::Sync { id } => commands::source::sync(&session, &id),
        },
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "modorder", &mut std::io::stdout());
            Ok(EXIT_SUCCESS)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
