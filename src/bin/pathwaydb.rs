use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pathwaydb::app::{App, FetchOptions};
use pathwaydb::config::{ConfigLoader, DatasetRequest, ResolvedConfig};
use pathwaydb::connectors::IngestOptions;
use pathwaydb::domain::{DatasetKey, GeneIdType};
use pathwaydb::error::PathwayError;
use pathwaydb::fetcher::{HttpFetch, HttpFetcher};
use pathwaydb::output::{JsonOutput, OutputMode, TextOutput};
use pathwaydb::rate_limit::RateLimiter;
use pathwaydb::response_cache::{CachedFetcher, ResponseCache};
use pathwaydb::store::Store;
use pathwaydb::terms::TermNames;

#[derive(Parser)]
#[command(name = "pathwaydb")]
#[command(about = "Offline-cacheable KEGG, GO and MSigDB annotation stores")]
#[command(version, author)]
struct Cli {
    /// Print JSON instead of text summaries.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (defaults to ./pathwaydb.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage annotation datasets")]
    Data(DataArgs),
    #[command(about = "Filter rows of a dataset (e.g. --where gene_symbols=TP53,BRCA1)")]
    Query(QueryArgs),
    #[command(about = "Summary statistics for a dataset")]
    Stats(KeyArgs),
    #[command(about = "Export a dataset as TSV or JSON records")]
    Export(ExportArgs),
    #[command(about = "Fill in missing pathway and term names")]
    Backfill(BackfillArgs),
    #[command(about = "Manage the HTTP response cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct DataArgs {
    #[command(subcommand)]
    command: DataCommand,
}

#[derive(Subcommand)]
enum DataCommand {
    #[command(about = "Fetch datasets")]
    Fetch(FetchArgs),
    #[command(about = "Fetch datasets (alias of fetch)")]
    Add(FetchArgs),
    #[command(about = "List locally available datasets")]
    List,
    #[command(about = "Show dataset info")]
    Info(KeyArgs),
    #[command(about = "Clear project-local store")]
    Clear(ClearArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Dataset key such as kegg:hsa, go:human or msigdb:human:H.
    key: Option<String>,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    dry_run: bool,

    /// Skip fetching pathway and term names.
    #[arg(long)]
    no_descriptions: bool,

    /// Keep only GO annotations with these evidence codes.
    #[arg(long = "evidence", value_delimiter = ',')]
    evidence_codes: Vec<String>,
}

#[derive(Args)]
struct KeyArgs {
    key: String,
}

#[derive(Args)]
struct ClearArgs {
    /// Also remove the shared cache stores.
    #[arg(long)]
    cache: bool,
}

#[derive(Args)]
struct QueryArgs {
    key: String,

    /// `field=value[,value...]`; repeat for more criteria.
    #[arg(long = "where", short = 'w', conflicts_with = "gene")]
    criteria: Vec<String>,

    /// Rows for one gene instead of filter criteria.
    #[arg(long)]
    gene: Option<String>,

    #[arg(long, value_enum, default_value_t = GeneIdType::Symbol, requires = "gene")]
    id_type: GeneIdType,

    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct ExportArgs {
    key: String,

    #[arg(long)]
    json: bool,

    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct BackfillArgs {
    key: String,

    /// Use bundled names only.
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Delete every cached HTTP response")]
    ClearResponses,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PathwayError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PathwayError) -> u8 {
    match error {
        PathwayError::DatasetNotFound(_)
        | PathwayError::CacheMiss(_)
        | PathwayError::MissingConfig
        | PathwayError::ConfigRead(_)
        | PathwayError::ConfigParse(_)
        | PathwayError::InvalidDatasetKey(_) => 2,
        PathwayError::Network { .. } | PathwayError::Request { .. } => 3,
        PathwayError::StoreCorruption { .. } => 4,
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
    let output_mode = if cli.non_interactive || !std::io::stdout().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;
    let app = build_app(&config)?;

    match cli.command {
        Commands::Data(args) => match args.command {
            DataCommand::Fetch(args) | DataCommand::Add(args) => {
                run_fetch(args, &config, &app, output_mode)
            }
            DataCommand::List => run_list(&app, output_mode),
            DataCommand::Info(args) => run_info(args, &app, output_mode),
            DataCommand::Clear(args) => run_clear(args, &app, output_mode),
        },
        Commands::Query(args) => run_query(args, &app, output_mode),
        Commands::Stats(args) => run_stats(args, &app, output_mode),
        Commands::Export(args) => run_export(args, &app),
        Commands::Backfill(args) => run_backfill(args, &app, output_mode),
        Commands::Cache(args) => match args.command {
            CacheCommand::ClearResponses => run_clear_responses(&app, output_mode),
        },
    }
}

fn build_app(config: &ResolvedConfig) -> miette::Result<App> {
    let settings = &config.settings;
    let mut store = Store::new()?;
    if let Some(cache_dir) = &settings.cache_dir {
        store = store.with_cache_root(cache_dir.clone());
    }

    let limiter = Arc::new(RateLimiter::with_defaults(settings.min_interval));
    let http = HttpFetcher::new(limiter, settings.fetch_settings())?;
    let responses = ResponseCache::new(store.responses_dir());
    let fetcher: Arc<dyn HttpFetch> =
        Arc::new(CachedFetcher::new(http, responses, settings.response_ttl));

    let mut term_names = TermNames::bundled()?;
    if let Some(path) = &settings.term_names_path {
        let mut extra = TermNames::from_path(path)?;
        // Names from the user's file take precedence over bundled ones.
        extra.merge_missing(term_names);
        term_names = extra;
    }

    Ok(App::new(store, fetcher, settings, term_names))
}

fn parse_key(value: &str) -> Result<DatasetKey, PathwayError> {
    value.parse()
}

fn run_fetch(
    args: FetchArgs,
    config: &ResolvedConfig,
    app: &App,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let FetchArgs {
        key,
        force,
        no_cache,
        dry_run,
        no_descriptions,
        evidence_codes,
    } = args;

    let requests = match key {
        Some(key) => vec![DatasetRequest {
            key: parse_key(&key)?,
            options: IngestOptions {
                fetch_descriptions: !no_descriptions,
                evidence_codes: (!evidence_codes.is_empty()).then_some(evidence_codes),
            },
        }],
        None if config.datasets.is_empty() => return Err(PathwayError::MissingConfig.into()),
        None => config.datasets.clone(),
    };

    let fetch_options = FetchOptions {
        force,
        no_cache,
        dry_run,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&requests, fetch_options, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.fetch(&requests, fetch_options, &TextOutput)?;
            TextOutput::print_fetch(&result).into_diagnostic()
        }
    }
}

fn run_list(app: &App, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.list(&JsonOutput)?;
            JsonOutput::print_list(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.list(&TextOutput)?;
            TextOutput::print_list(&result).into_diagnostic()
        }
    }
}

fn run_info(args: KeyArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let key = parse_key(&args.key)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.info(&key, &JsonOutput)?;
            JsonOutput::print_info(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.info(&key, &TextOutput)?;
            TextOutput::print_info(&result).into_diagnostic()
        }
    }
}

fn run_clear(args: ClearArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.clear(args.cache, &JsonOutput)?;
            JsonOutput::print_clear(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.clear(args.cache, &TextOutput)?;
            TextOutput::print_clear(&result).into_diagnostic()
        }
    }
}

fn run_query(args: QueryArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let key = parse_key(&args.key)?;
    let result = match &args.gene {
        Some(gene) => app.query_gene(&key, gene, args.id_type, args.limit)?,
        None => app.query(&key, &args.criteria, args.limit)?,
    };
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_query(&result).into_diagnostic(),
        OutputMode::Interactive => TextOutput::print_query(&result).into_diagnostic(),
    }
}

fn run_stats(args: KeyArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let key = parse_key(&args.key)?;
    let result = app.stats(&key)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_stats(&result).into_diagnostic(),
        OutputMode::Interactive => TextOutput::print_stats(&result).into_diagnostic(),
    }
}

fn run_export(args: ExportArgs, app: &App) -> miette::Result<()> {
    let key = parse_key(&args.key)?;
    let table = app.export(&key, args.limit)?;
    if args.json {
        JsonOutput::print_export(&table).into_diagnostic()
    } else {
        TextOutput::print_export(&table).into_diagnostic()
    }
}

fn run_backfill(args: BackfillArgs, app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let key = parse_key(&args.key)?;
    let result = app.backfill(&key, args.offline)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_backfill(&result).into_diagnostic(),
        OutputMode::Interactive => TextOutput::print_backfill(&result).into_diagnostic(),
    }
}

fn run_clear_responses(app: &App, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.clear_responses()?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_clear_responses(&result).into_diagnostic(),
        OutputMode::Interactive => TextOutput::print_clear_responses(&result).into_diagnostic(),
    }
}
