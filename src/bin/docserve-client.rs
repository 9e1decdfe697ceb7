//! Client binary for edgequake-docserve.
//!
//! `process` uploads a file and prints the service's JSON response;
//! `download` saves a produced file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_docserve::client::DEFAULT_SERVER_URL;
use edgequake_docserve::{DocServeClient, DocServeError};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

/// Talk to a running docserve instance.
#[derive(Parser, Debug)]
#[command(
    name = "docserve-client",
    version,
    about = "Upload documents to a docserve instance and download the results",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Base URL of the service.
    #[arg(long, global = true, env = "DOCSERVE_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Request timeout in seconds (conversions can be slow).
    #[arg(long, global = true, env = "DOCSERVE_CLIENT_TIMEOUT", default_value_t = 900)]
    timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSERVE_VERBOSE")]
    verbose: bool,

    /// Print nothing but errors and the response body.
    #[arg(short, long, global = true, env = "DOCSERVE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file to POST /process/ and print the JSON response.
    Process {
        /// File to upload.
        file: PathBuf,
    },
    /// Fetch a produced file from GET /download/{name}.
    Download {
        /// File name, e.g. report.json or report-page-1.png.
        name: String,

        /// Where to write it. Default: the file name in the working directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Query GET /health.
    Health,
}

fn spinner(msg: String, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(msg);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let client = DocServeClient::new(&cli.server, cli.timeout)
        .with_context(|| format!("Cannot create client for {}", cli.server))?;

    match cli.command {
        Command::Process { file } => {
            let bar = spinner(format!("Processing {}", file.display()), cli.quiet);
            let result = client.process_file(&file).await;
            bar.finish_and_clear();
            let response = result.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !cli.quiet {
                eprintln!(
                    "{} {} {}",
                    green("✓"),
                    response.output_directory,
                    dim(&format!("({})", response.processing_time))
                );
            }
        }
        Command::Download { name, output } => {
            let dest = output.unwrap_or_else(|| PathBuf::from(&name));
            let bytes = client.download_to(&name, &dest).await.map_err(report)?;
            if !cli.quiet {
                eprintln!(
                    "{} File downloaded successfully: {} {}",
                    green("✓"),
                    dest.display(),
                    dim(&format!("({bytes} bytes)"))
                );
            }
        }
        Command::Health => {
            let health = client.health().await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }
    Ok(())
}

/// Print a one-line failure summary and hand the error on to anyhow.
fn report(e: DocServeError) -> anyhow::Error {
    match &e {
        DocServeError::ServerStatus { status, detail, .. } => {
            eprintln!("{} Failed: HTTP {} {}", red("✗"), status, dim(detail));
        }
        other => eprintln!("{} {}", red("✗"), other),
    }
    anyhow::Error::new(e)
}
