use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identifier_cell::{IdentifierCellState, IdentifierKind};
use shared_config::AppConfig;

/// Assigns public identifiers to rows created before they had one.
///
/// Every command is idempotent: rows that already carry an identifier are
/// never touched, so re-running after a success or a failure is safe.
#[derive(Debug, Parser)]
#[command(name = "identifier-backfill", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Assign CL-NNNNN codes to clinics without one
    ClinicCodes,
    /// Assign DOC-NNNN ids to doctors without one
    DoctorIds,
    /// Assign EMP-NNNN ids to helpdesk users without one
    EmployeeIds,
    /// Assign PAT-NNNNNN ids to patient profiles without one
    PatientIds,
    /// Run every backfill above in turn
    All,
}

impl Command {
    fn kind(self) -> Option<IdentifierKind> {
        match self {
            Command::ClinicCodes => Some(IdentifierKind::Clinic),
            Command::DoctorIds => Some(IdentifierKind::Doctor),
            Command::EmployeeIds => Some(IdentifierKind::Employee),
            Command::PatientIds => Some(IdentifierKind::Patient),
            Command::All => None,
        }
    }
}

fn describe(kind: IdentifierKind, assigned: usize) -> String {
    let noun = match kind {
        IdentifierKind::Clinic => "clinic codes",
        IdentifierKind::Doctor => "doctor ids",
        IdentifierKind::Employee => "employee ids",
        IdentifierKind::Patient => "patient ids",
    };
    format!("Assigned {} {}.", assigned, noun)
}

async fn run(command: Command) -> anyhow::Result<Vec<String>> {
    let config = Arc::new(AppConfig::from_env());
    let state = IdentifierCellState::from_config(config).await?;
    info!("Backfill policy: {:?}", state.backfill.policy());

    let report = match command.kind() {
        Some(kind) => vec![(kind, state.backfill.backfill(kind).await?)],
        None => state.backfill.backfill_all().await?,
    };

    Ok(report
        .into_iter()
        .map(|(kind, assigned)| describe(kind, assigned))
        .collect())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Backfill failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommands_take_no_arguments() {
        let cli = Cli::try_parse_from(["identifier-backfill", "clinic-codes"]).unwrap();
        assert_eq!(cli.command.kind(), Some(IdentifierKind::Clinic));

        let cli = Cli::try_parse_from(["identifier-backfill", "all"]).unwrap();
        assert_eq!(cli.command.kind(), None);

        assert!(Cli::try_parse_from(["identifier-backfill", "patient-ids", "extra"]).is_err());
        assert!(Cli::try_parse_from(["identifier-backfill"]).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(IdentifierKind::Clinic, 5), "Assigned 5 clinic codes.");
        assert_eq!(describe(IdentifierKind::Patient, 0), "Assigned 0 patient ids.");
    }
}
