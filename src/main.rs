//! pdstore CLI entry point.

use clap::Parser;
use pdstore::cli::commands::{self, Context};
use pdstore::cli::{Cli, Commands};
use pdstore::config::Settings;
use pdstore::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => return report(&e, cli.json, cli.quiet),
    };

    init_tracing(cli.verbose, cli.quiet, &settings);

    let ctx = Context::new(&cli, settings);
    match run(&cli, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e, ctx.json, ctx.quiet),
    }
}

fn report(e: &Error, json: bool, quiet: bool) -> ExitCode {
    if json {
        eprintln!("{}", e.to_structured_json());
    } else if !quiet {
        if let Some(hint) = e.hint() {
            eprintln!("Error: {e}\n  Hint: {hint}");
        } else {
            eprintln!("Error: {e}");
        }
    }
    ExitCode::from(e.exit_code())
}

fn init_tracing(verbose: u8, quiet: bool, settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, then the verbosity flag, then PDSTORE_LOG_LEVEL
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new(settings.log_level().as_filter()),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Human-readable locally, one JSON object per line everywhere else
    if settings.environment().is_development() {
        builder.without_time().init();
    } else {
        builder.json().init();
    }
}

fn run(cli: &Cli, ctx: &Context) -> Result<(), Error> {
    match &cli.command {
        Commands::Init => commands::init::execute(ctx),
        Commands::Migrate { no_backup } => commands::migrate::execute(ctx, *no_backup),
        Commands::Status => commands::status::execute(ctx),
        Commands::Backup { command } => commands::backup::execute(command, ctx),
        Commands::Version => commands::version::execute(ctx.json),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
