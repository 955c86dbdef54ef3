use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pdbbind_manager::app::{DatasetManager, ProgressSinkKind};
use pdbbind_manager::catalog::DatasetCatalog;
use pdbbind_manager::config::{ConfigLoader, ResolvedConfig};
use pdbbind_manager::domain::{Credentials, DatasetRef, RecordType};
use pdbbind_manager::download::{ArchiveTransport, Downloader, HttpTransport, TransportResponse};
use pdbbind_manager::error::PdbbindError;
use pdbbind_manager::output::{JsonOutput, LogProgress, OutputMode};
use pdbbind_manager::store::DatasetStore;
use pdbbind_manager::tui::Tui;

#[derive(Parser)]
#[command(name = "pdbbind")]
#[command(about = "Download, unpack and index PDBbind protein-ligand datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// JSON config file (defaults to ./pdbbind.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage PDBbind datasets")]
    Data(DataArgs),
}

#[derive(Args)]
struct DataArgs {
    #[command(subcommand)]
    command: DataCommand,
}

#[derive(Subcommand)]
enum DataCommand {
    #[command(about = "Download and extract a dataset (or every dataset in the config)")]
    Prepare(PrepareArgs),
    #[command(about = "Map identifiers to activity values or record files")]
    Records(RecordsArgs),
    #[command(about = "Show on-disk state of a dataset's archives")]
    Status(DatasetArgs),
    #[command(about = "Re-hash downloaded archives against their manifests")]
    Verify(DatasetArgs),
    #[command(about = "List known releases and subsets")]
    Catalog,
}

#[derive(Args)]
struct PrepareArgs {
    /// Dataset as <release>:<subset>, e.g. 2016:refined
    dataset: Option<DatasetRef>,
}

#[derive(Args)]
struct RecordsArgs {
    record_type: RecordType,
    dataset: DatasetRef,
}

#[derive(Args)]
struct DatasetArgs {
    dataset: DatasetRef,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PdbbindError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PdbbindError) -> u8 {
    match error {
        PdbbindError::UnknownRelease(_)
        | PdbbindError::UnknownSubset { .. }
        | PdbbindError::InvalidDatasetRef(_)
        | PdbbindError::InvalidRecordType(_)
        | PdbbindError::UnsupportedRecordType { .. }
        | PdbbindError::ConfigRead(_)
        | PdbbindError::ConfigParse(_) => 2,
        PdbbindError::Http(_)
        | PdbbindError::HttpStatus { .. }
        | PdbbindError::IncompleteDownload { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let Commands::Data(args) = cli.command;
    let resolve_config = || ConfigLoader::resolve(cli.config.as_deref());
    match args.command {
        DataCommand::Prepare(args) => run_prepare(args, resolve_config()?, output_mode),
        DataCommand::Records(args) => {
            let manager = offline_manager(&resolve_config()?);
            let report = manager.locate_records(&args.dataset, args.record_type)?;
            JsonOutput::print_records(&report).into_diagnostic()
        }
        DataCommand::Status(args) => {
            let manager = offline_manager(&resolve_config()?);
            let status = manager.status(&args.dataset)?;
            JsonOutput::print_status(&status).into_diagnostic()
        }
        DataCommand::Verify(args) => run_verify(args, resolve_config()?, output_mode),
        DataCommand::Catalog => {
            JsonOutput::print_catalog(&DatasetCatalog::entries()).into_diagnostic()
        }
    }
}

fn run_prepare(
    args: PrepareArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let datasets = match args.dataset {
        Some(dataset) => vec![dataset],
        None if config.datasets.is_empty() => {
            return Err(miette::Report::msg(
                "no dataset given and none listed in the config (try `pdbbind data prepare 2016:refined`)",
            ));
        }
        None => config.datasets.clone(),
    };

    let transport = HttpTransport::new(config.timeout)?;
    let manager = build_manager(&config, transport);

    match output_mode {
        OutputMode::NonInteractive => {
            let results = datasets
                .iter()
                .map(|dataset| manager.prepare(dataset, &LogProgress))
                .collect::<Result<Vec<_>, PdbbindError>>()?;
            JsonOutput::print_prepare(&results).into_diagnostic()
        }
        OutputMode::Interactive => {
            let title = datasets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let mut tui = Tui::new(ProgressSinkKind::Prepare, title);
            let results = tui.run(move |sink| {
                datasets
                    .iter()
                    .map(|dataset| manager.prepare(dataset, sink))
                    .collect::<Result<Vec<_>, PdbbindError>>()
            });
            if results.is_err() {
                tui.print_log();
            }
            JsonOutput::print_prepare(&results?).into_diagnostic()
        }
    }
}

fn run_verify(
    args: DatasetArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let manager = offline_manager(&config);
    let result = match output_mode {
        OutputMode::NonInteractive => manager.verify(&args.dataset, &LogProgress)?,
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Verify, args.dataset.to_string());
            let dataset = args.dataset;
            tui.run(move |sink| manager.verify(&dataset, sink))?
        }
    };
    JsonOutput::print_verify(&result).into_diagnostic()
}

fn build_manager<T: ArchiveTransport>(config: &ResolvedConfig, transport: T) -> DatasetManager<T> {
    DatasetManager::new(
        DatasetStore::new(config.dataset_directory.clone()),
        DatasetCatalog::new(config.base_url.clone()),
        Downloader::new(transport),
    )
    .with_credentials(config.credentials.clone())
    .with_lock_timeout(config.lock_timeout)
}

/// Commands that only read the dataset directory never touch the network.
fn offline_manager(config: &ResolvedConfig) -> DatasetManager<NopTransport> {
    build_manager(config, NopTransport)
}

struct NopTransport;

impl ArchiveTransport for NopTransport {
    fn get(
        &self,
        url: &str,
        _credentials: Option<&Credentials>,
        _offset: u64,
    ) -> Result<TransportResponse, PdbbindError> {
        Err(PdbbindError::Http(format!(
            "network access not configured for this command: {url}"
        )))
    }
}
