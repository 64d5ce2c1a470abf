use std::path::PathBuf;

use clap::{ArgAction, Parser};
use wycennik::Result;
use wycennik::config::Settings;
use wycennik::logging::init_logging;
use wycennik::session::{Session, Shell, StdTerminal};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    let working_dir = std::env::current_dir()?;
    let settings = Settings::resolve(cli.path.as_deref(), cli.root.as_deref(), &working_dir)?;
    tracing::info!(root = %settings.root.display(), "session starting");

    Shell::new(Session::new(settings), StdTerminal).run()
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Keep a cost estimate in an xlsx spreadsheet."
)]
struct Cli {
    /// Estimate file to open, or folder to start in.
    path: Option<PathBuf>,

    /// Folder the session may not leave. Defaults to the folder of `path`,
    /// or the current directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Log more detail to stderr; repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}
