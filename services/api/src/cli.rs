use crate::infra::build_service;
use crate::server;
use clap::{Args, Parser, Subcommand};
use college_admissions::admissions::{
    export_applications, ApplicationFilter, ApplicationStatus, Program,
};
use college_admissions::config::{AppConfig, ConfigError, StoreBackend};
use college_admissions::error::AppError;
use college_admissions::telemetry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "College Admissions",
    about = "Run the admissions intake service and review applications from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Look up the status of an application
    Status(StatusArgs),
    /// Approve, reject, or reset an application
    SetStatus(SetStatusArgs),
    /// Write matching applications as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct StatusArgs {
    /// Application id returned at submission
    #[arg(long)]
    pub(crate) id: Option<String>,
    /// Applicant email address
    #[arg(long)]
    pub(crate) email: Option<String>,
    /// Applicant or guardian phone number
    #[arg(long)]
    pub(crate) phone: Option<String>,
    /// Payment transaction id
    #[arg(long)]
    pub(crate) transaction_id: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct SetStatusArgs {
    /// Application id
    pub(crate) id: String,
    /// New status: pending, approved, or rejected
    pub(crate) status: String,
    /// Reviewer notes replacing any stored notes
    #[arg(long)]
    pub(crate) notes: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ExportArgs {
    /// Only export applications with this status
    #[arg(long, value_parser = parse_status)]
    pub(crate) status: Option<ApplicationStatus>,
    /// Only export applications for this program
    #[arg(long, value_parser = parse_program)]
    pub(crate) program: Option<Program>,
    /// Output file (defaults to stdout)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

fn parse_status(raw: &str) -> Result<ApplicationStatus, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not one of pending, approved, rejected"))
}

fn parse_program(raw: &str) -> Result<Program, String> {
    raw.parse().map_err(|_| {
        let known: Vec<&str> = Program::ALL.iter().map(|program| program.label()).collect();
        format!("'{raw}' is not one of {}", known.join(", "))
    })
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Status(args) => run_status(args).await,
        Command::SetStatus(args) => run_set_status(args).await,
        Command::Export(args) => run_export(args).await,
    }
}

fn load_for_command(command: &'static str) -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    require_persistent_store(config.store.backend, command)?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

/// The in-memory store starts empty in every process, so one-shot commands
/// would only ever see nothing.
fn require_persistent_store(backend: StoreBackend, command: &'static str) -> Result<(), ConfigError> {
    match backend {
        StoreBackend::Memory => Err(ConfigError::EphemeralStore(command)),
        StoreBackend::Mongo => Ok(()),
    }
}

async fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let config = load_for_command("status")?;
    let service = build_service(&config).await?;

    let view = if let Some(id) = args.id.as_deref() {
        service.status_by_id(id).await?
    } else if let Some(email) = args.email.as_deref() {
        service.status_by_email(email).await?
    } else if let Some(phone) = args.phone.as_deref() {
        service.status_by_phone(phone).await?
    } else {
        let transaction_id = args.transaction_id.as_deref().unwrap_or_default();
        service.status_by_transaction_id(transaction_id).await?
    };

    print_json(&view)
}

async fn run_set_status(args: SetStatusArgs) -> Result<(), AppError> {
    let config = load_for_command("set-status")?;
    let service = build_service(&config).await?;
    let update = service
        .update_status(&args.id, &args.status, args.notes)
        .await?;
    print_json(&update)
}

async fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let config = load_for_command("export")?;
    let service = build_service(&config).await?;
    let filter = ApplicationFilter {
        status: args.status,
        program: args.program,
    };

    let written = match args.output {
        Some(path) => {
            let file = std::fs::File::create(&path)?;
            let written = export_applications(&*service, filter, file).await?;
            eprintln!("wrote {written} applications to {}", path.display());
            written
        }
        None => export_applications(&*service, filter, std::io::stdout().lock()).await?,
    };
    tracing::info!(written, "export finished");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}
