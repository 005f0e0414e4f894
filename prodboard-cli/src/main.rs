mod args;
mod logging;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info};
use prodboard::db::migrations;
use prodboard::{load_config, Config, ProdboardError, ReportEngine};

use args::{parse_args, usage, CliArgs, Command};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&argv) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print!("{}", usage());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, usage());
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init_logging() {
        eprintln!("warning: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(explicit: Option<PathBuf>) -> Result<Config, ProdboardError> {
    let path = explicit
        .or_else(|| std::env::var_os("PRODBOARD_CONFIG").map(PathBuf::from))
        .or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".prodboard").join("config.json"))
                .filter(|p| p.exists())
        });

    match path {
        Some(path) => {
            info!("Using config {}", path.display());
            Ok(load_config(&path)?)
        }
        None => Ok(Config::default()),
    }
}

fn run(cli: CliArgs) -> Result<(), ProdboardError> {
    let config = resolve_config(cli.config)?;
    let mut engine = ReportEngine::open(config)?;

    match cli.command {
        Command::Run => run_workers(&mut engine)?,
        Command::Submit {
            report_type,
            criteria,
        } => {
            let criteria: serde_json::Value = serde_json::from_str(&criteria).map_err(|e| {
                prodboard::ConfigError::Validation {
                    message: format!("criteria is not valid JSON: {}", e),
                }
            })?;
            let receipt = engine.service().submit(&report_type, &criteria)?;
            print_json(&receipt);
        }
        Command::List { limit, all } => {
            if all {
                let limit = limit.unwrap_or(engine.config().status.default_limit);
                let jobs = engine.ledger().list_recent(limit, true)?;
                print_json(&jobs);
            } else {
                print_json(&engine.service().list_status(limit)?);
            }
        }
        Command::Show { id } => print_json(&engine.service().job_status(id)?),
        Command::Delete { id } => {
            engine.service().delete(id)?;
            info!("Job {} deleted", id);
        }
        Command::Artifact { id, out } => {
            let download = engine.service().fetch_artifact(id)?;
            let out = out.unwrap_or_else(|| PathBuf::from(download.file_name()));
            std::fs::write(&out, &download.content).map_err(|e| {
                prodboard::ArtifactError::WriteFile {
                    path: out.clone(),
                    source: e,
                }
            })?;
            println!("{}", out.display());
        }
        Command::Migrate => {
            let conn = engine.ledger_pool().acquire()?;
            let version = migrations::current_version(&conn)?;
            info!("Database at schema version {}", version);
            println!("{}", version);
        }
    }

    engine.shutdown(DRAIN_TIMEOUT)
}

fn run_workers(engine: &mut ReportEngine) -> Result<(), ProdboardError> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| prodboard::WorkerError::SpawnFailed(format!("signal handler: {}", e)))?;

    let started = engine.start_workers()?;
    info!("Running {} worker(s); press Ctrl-C to stop", started);

    let _ = stop_rx.recv();
    info!("Interrupt received, finishing in-flight jobs");
    engine.stop_workers();
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match serde_json::to_writer_pretty(&mut out, value) {
        Ok(()) => {
            let _ = writeln!(out);
        }
        Err(e) => error!("Failed to write output: {}", e),
    }
}
