use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use is_terminal::IsTerminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_integrity_audit::config::{Config, DEFAULT_ENV_PHP};
use rust_integrity_audit::db::Database;
use rust_integrity_audit::repair::{LineAnswers, RepairSession};
use rust_integrity_audit::report::ReportPresenter;
use rust_integrity_audit::scan::{NoProgress, ScanOrchestrator};

/// Finds rows that reference missing parent rows and optionally deletes them.
#[derive(Debug, Parser)]
#[command(name = "rust-integrity-audit", version, about)]
struct Cli {
    /// Print one status line per table while scanning
    #[arg(long)]
    progress: bool,

    /// Offer to delete orphaned rows after the scan
    #[arg(long)]
    fix: bool,

    /// Magento env.php used when no DATABASE_URL / DB_* variables are set
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ENV_PHP)]
    env_php: PathBuf,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

/// Scans the database and, with `--fix`, runs the repair session.
async fn run<W: Write>(cli: &Cli, presenter: &mut ReportPresenter<W>) -> anyhow::Result<()> {
    presenter.banner()?;

    let config = Config::load(&cli.env_php)?;
    let db = Database::connect(&config).await?;

    if cli.progress {
        presenter.progress_enabled()?;
    }

    let scanner = ScanOrchestrator::new(&db, &db);
    let scanned = if cli.progress {
        scanner.run(&mut *presenter).await
    } else {
        scanner.run(&mut NoProgress).await
    };
    let outcome = scanned.context("Integrity scan aborted")?;

    presenter.summary(&outcome)?;

    if cli.fix {
        let mut answers = LineAnswers::stdin();
        let summary = RepairSession::new(&db, &mut answers, &mut *presenter)
            .run(&outcome.registry)
            .await?;
        tracing::info!(
            "Repair session done: cancelled={}, rows deleted={}",
            summary.cancelled,
            summary.rows_deleted()
        );
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_integrity_audit=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let color = !cli.no_color && io::stdout().is_terminal();
    colored::control::set_override(color);

    let mut presenter = ReportPresenter::new(io::stdout(), color);
    match run(&cli, &mut presenter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Fatal error: {:?}", e);
            let _ = presenter.fatal(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
