//! Lookdeck CLI - bind Looker query results into slide decks

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

use lookdeck::error::{FixSuggestion, LookdeckError};
use lookdeck::{resolve_destination, run_pipeline, Deck, LookerClient, LookerConfig, RunOptions};

#[derive(Parser)]
#[command(name = "lookdeck")]
#[command(about = "Lookdeck - bind Looker query results into slide decks")]
#[command(version)]
struct Cli {
    /// Path to the deck snapshot to process (default: first *.deck.json
    /// in the current directory)
    #[arg(short = 'f', long)]
    file_path: Option<PathBuf>,

    /// Directory that will contain the generated deck
    #[arg(short = 'o', long, default_value = "output")]
    output_dir: PathBuf,

    /// Overwrite the deck file in place instead of writing a new one
    #[arg(short = 's', long = "self")]
    write_in_place: bool,

    /// Do not open the generated deck after processing
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Stop adding red outlines around elements with errors
    #[arg(long)]
    hide_errors: bool,

    /// Run-level filter value, applied to each binding's declared filter field
    #[arg(long)]
    filter: Option<String>,

    /// Dump each distinct query's raw result into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), LookdeckError> {
    // Connection configuration gates the whole run.
    let config = LookerConfig::from_env()?;

    let input = resolve_input(cli.file_path.as_deref())?;
    let mut deck = Deck::load(&input)?;

    let client = LookerClient::connect(&config)
        .await
        .map_err(|e| LookdeckError::Execution(format!("cannot connect to Looker: {e:#}")))?;

    let options = RunOptions {
        filter: cli.filter,
        hide_errors: cli.hide_errors,
        write_in_place: cli.write_in_place,
        dump_dir: cli.dump_dir,
    };
    let report = run_pipeline(&mut deck, &client, &options).await?;

    if report.bound_elements == 0 {
        eprintln!(
            "{} No bound elements found. Add a binding (id: <look_id>) to an \
             element description to load data into it.",
            "!".yellow().bold()
        );
        return Ok(());
    }

    println!(
        "{} {} element(s): {} rendered, {} skipped, {} failed | {} distinct quer{}",
        "→".cyan(),
        report.bound_elements,
        report.rendered().to_string().green(),
        report.skipped(),
        report.failed().to_string().red(),
        report.distinct_queries,
        if report.distinct_queries == 1 { "y" } else { "ies" },
    );

    let destination = resolve_destination(&input, &cli.output_dir, cli.write_in_place, &Local::now());
    if !cli.write_in_place {
        std::fs::create_dir_all(&cli.output_dir)?;
    }
    deck.save(&destination)?;
    println!("{} Wrote {}", "✓".green(), destination.display());

    // Per-element failures never change the exit code.
    if !cli.quiet {
        open_artifact(&destination);
    }
    Ok(())
}

/// Use the given path, or fall back to the first deck snapshot found in
/// the current directory.
fn resolve_input(arg: Option<&Path>) -> Result<PathBuf, LookdeckError> {
    if let Some(path) = arg {
        if !path.exists() {
            return Err(LookdeckError::Document(format!(
                "{} does not exist",
                path.display()
            )));
        }
        return Ok(path.to_path_buf());
    }

    let found = glob::glob("*.deck.json")
        .map_err(|e| LookdeckError::Document(e.to_string()))?
        .flatten()
        .next();
    match found {
        Some(path) => {
            warn!(
                "no file path provided, using first found file: {}. \
                 To specify a file, use -f <file_path>.",
                path.display()
            );
            Ok(path)
        }
        None => Err(LookdeckError::Document(
            "no deck snapshot found in the current directory; specify one with -f <file_path>"
                .to_string(),
        )),
    }
}

/// Best-effort open with the platform opener; never fails the run
fn open_artifact(path: &Path) {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = std::process::Command::new("open");
        c.arg(path);
        c
    };
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(path);
        c
    };

    match command.spawn() {
        Ok(_) => info!("opened {}", path.display()),
        Err(e) => {
            warn!("could not open the deck: {e}");
            info!("you can find the file at {}", path.display());
        }
    }
}
