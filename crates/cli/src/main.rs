use crate::{
    commands::{Commands, ConnectionArgs, ImportArgs, Source},
    error::CliError,
    output::ProgressDisplay,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use connectors::store::{StoreConnector, postgres::PgConnector};
use engine_runtime::{
    error::ImportError, execution::executor::ImportRun, preflight::PreflightOptions,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod discovery;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "bulkload",
    version,
    about = "Bulk import JSON and CSV files into a document store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = matches!(&cli.command, Commands::Import(args) if args.debug);
    init_logging(debug);

    let code = match cli.command {
        Commands::Import(args) => import(args).await,
        Commands::TestConn { connection } => test_conn(connection).await,
    }
    .unwrap_or_else(|err| {
        eprintln!("{err}");
        ExitCode::GeneralError
    });

    std::process::exit(code.as_i32());
}

// Logs go to stderr so the progress bar owns stdout.
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn import(args: ImportArgs) -> Result<ExitCode, CliError> {
    let settings = args.import_settings()?;
    let (jobs, options) = match args.source()? {
        Source::Directory {
            root,
            filters,
            fields,
        } => {
            let found = discovery::discover(&root, &filters, fields.as_ref())?;
            output::print_ignored(&found.ignored);
            let options = PreflightOptions {
                force: args.force,
                adopt_primary_key: false,
            };
            (found.jobs, options)
        }
        Source::File { job, explicit_key } => {
            let options = PreflightOptions {
                force: args.force,
                adopt_primary_key: !explicit_key,
            };
            (vec![job], options)
        }
    };

    info!(
        store = %settings.connection,
        clients = settings.clients.get(),
        durability = %settings.write.durability,
        conflict = %settings.write.conflict,
        "Import configured"
    );
    let connector = Arc::new(PgConnector::new(settings.connection.clone()));
    let mut run = ImportRun::new(settings, connector, jobs);
    let shutdown = ShutdownCoordinator::new(run.controller());
    shutdown.register_handlers();

    match run.preflight(options).await {
        Ok(()) => {}
        Err(ImportError::Interrupted) => {
            eprintln!("Interrupted");
            return Ok(ExitCode::ShutdownRequested);
        }
        Err(err) => return Err(err.into()),
    }

    let display = ProgressDisplay::new();
    let report = run.execute_with(|ratio| display.update(ratio)).await;
    display.finish(report.status);
    output::print_report(&report);

    if shutdown.is_shutdown_requested() {
        return Ok(ExitCode::ShutdownRequested);
    }
    Ok(ExitCode::from_status(report.status))
}

async fn test_conn(args: ConnectionArgs) -> Result<ExitCode, CliError> {
    let settings = args.settings()?;
    let connector = PgConnector::new(settings);
    let conn = connector.connect().await?;
    let databases = conn.list_databases().await?;
    println!("Connected to {}", connector.describe());
    for db in databases {
        println!("  {db}");
    }
    Ok(ExitCode::Success)
}
