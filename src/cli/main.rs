//! `addrgeo` command line.
//!
//! Batch geocoding of CSV rows or JSON-line entities, region lookups and
//! cache maintenance. Logs and run summaries go to stderr, records to the
//! output (stdout by default).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use addrgeo::cache::ResultCache;
use addrgeo::config::Config;
use addrgeo::geocoder::{build_chain, ChainSettings, GeocoderChain, GeocoderKind};
use addrgeo::io::{read_entities, read_latlon_csv, read_postal_csv, read_results_csv, Format, RecordWriter};
use addrgeo::logging::init_logging;
use addrgeo::parser::{default_parser, native_parser, AddressParser};
use addrgeo::regions::RegionResolver;
use addrgeo::resolve::{Orchestrator, OrchestratorSettings, ResolveOptions};
use addrgeo::worker::{
    export_cache, populate_cache, run_worker, ApplyRegionsTask, CacheMaintenance, FormatLineTask,
    GeocodeInput, GeocodeTask, ParseComponentsTask, RegionInput, RunSummary,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "addrgeo")]
#[command(version, about = "Cached address geocoding with NUTS region lookup")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the effective configuration
    Config,

    /// Formatted address lines for CSV rows (`original_line`, optional
    /// `country` and `language`; other columns are passed through)
    FormatLine(ParserArgs),

    /// Parsed address components for CSV rows (same columns as format-line)
    ParseComponents(ParserArgs),

    /// Geocode CSV rows or entities
    Geocode(GeocodeArgs),

    /// Add NUTS codes to CSV rows (`lat`, `lon`) or `Address` entities with
    /// `latitude` and `longitude`
    ApplyRegions(ApplyRegionsArgs),

    /// Cache maintenance
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input file, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,
}

#[derive(Args, Debug)]
struct ParserArgs {
    #[command(flatten)]
    io: IoArgs,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    output_format: Format,

    /// Use the built-in heuristic parser when libpostal is unavailable
    #[arg(long)]
    allow_heuristic: bool,
}

#[derive(Args, Debug)]
struct GeocodeArgs {
    #[command(flatten)]
    io: IoArgs,

    #[arg(long, value_enum, default_value_t = Format::Entities)]
    input_format: Format,

    #[arg(long, value_enum, default_value_t = Format::Entities)]
    output_format: Format,

    /// Geocoders in fallback order (defaults to the configured chain)
    #[arg(short, long = "geocoder", value_enum)]
    geocoders: Vec<GeocoderKind>,

    /// Neither read nor write the cache
    #[arg(long, conflicts_with = "cache_only")]
    no_cache: bool,

    /// Answer from the cache only, never call a geocoder
    #[arg(long)]
    cache_only: bool,

    /// Keep the ids of input `Address` entities instead of canonical ids
    #[arg(long)]
    keep_ids: bool,

    /// Add NUTS codes to results
    #[arg(long)]
    apply_regions: bool,
}

#[derive(Args, Debug)]
struct ApplyRegionsArgs {
    #[command(flatten)]
    io: IoArgs,

    #[arg(long, value_enum, default_value_t = Format::Entities)]
    input_format: Format,

    #[arg(long, value_enum, default_value_t = Format::Entities)]
    output_format: Format,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Export cached results as CSV or entities
    Iterate {
        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,

        #[arg(long, value_enum, default_value_t = Format::Entities)]
        output_format: Format,

        #[command(flatten)]
        maintenance: MaintenanceArgs,
    },

    /// Load results from CSV (columns as written by `cache iterate`)
    Populate {
        /// Input file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        #[command(flatten)]
        maintenance: MaintenanceArgs,
    },
}

#[derive(Args, Debug)]
struct MaintenanceArgs {
    /// Add NUTS codes
    #[arg(long)]
    apply_regions: bool,

    /// Recompute canonical ids with the configured scheme (migration)
    #[arg(long)]
    ensure_ids: bool,
}

fn load_resolver(config: &Config) -> Result<Arc<RegionResolver>> {
    let path = &config.regions.boundary_data;
    let resolver = RegionResolver::from_config(&config.regions)
        .with_context(|| format!("Failed to load boundary dataset {}", path.display()))?;
    Ok(Arc::new(resolver))
}

fn select_parser(allow_heuristic: bool) -> Result<Arc<dyn AddressParser>> {
    match native_parser() {
        Ok(parser) => Ok(parser),
        Err(e) if allow_heuristic => {
            info!("Native parser unavailable ({}), using heuristic parser", e);
            Ok(default_parser())
        }
        Err(e) => bail!("Native address parser required: {} (use --allow-heuristic to fall back)", e),
    }
}

/// Orchestrator for parsing-only commands: no geocoders, no persistent cache.
fn parsing_orchestrator(parser: Arc<dyn AddressParser>) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::new(GeocoderChain::new(Vec::new(), ChainSettings::default())),
        Arc::new(ResultCache::in_memory("addrgeo")),
        Some(parser),
        None,
        OrchestratorSettings::default(),
    ))
}

fn report(summary: RunSummary) {
    eprintln!("{}", summary);
}

async fn format_line(args: ParserArgs, parse: bool) -> Result<RunSummary> {
    let orchestrator = parsing_orchestrator(select_parser(args.allow_heuristic)?);
    let rows = read_postal_csv(&args.io.input).context("Failed to open input")?;
    let mut out = RecordWriter::create(&args.io.output, args.output_format)?;
    let summary = if parse {
        run_worker(&ParseComponentsTask::new(orchestrator), rows, &mut out).await?
    } else {
        run_worker(&FormatLineTask::new(orchestrator), rows, &mut out).await?
    };
    Ok(summary)
}

async fn geocode(config: &Config, args: GeocodeArgs) -> Result<RunSummary> {
    let kinds = if args.geocoders.is_empty() {
        config.geocoders.clone()
    } else {
        args.geocoders.clone()
    };
    if kinds.is_empty() && !args.cache_only {
        bail!("No geocoders configured");
    }

    let resolver = if args.apply_regions {
        Some(load_resolver(config)?)
    } else {
        None
    };
    let chain = build_chain(&kinds, config).context("Failed to set up geocoders")?;
    info!("Geocoder chain: {}", chain.names().join(" -> "));
    let cache = ResultCache::from_config(&config.cache).context("Failed to open cache")?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(chain),
        Arc::new(cache),
        Some(default_parser()),
        resolver,
        OrchestratorSettings::from_config(config),
    ));
    let opts = ResolveOptions {
        use_cache: !args.no_cache,
        cache_only: args.cache_only,
        apply_regions: args.apply_regions,
        rewrite_ids: !args.keep_ids,
        ensure_ids: false,
    };

    let inputs: Box<dyn Iterator<Item = addrgeo::Result<GeocodeInput>>> = match args.input_format {
        Format::Csv => Box::new(
            read_postal_csv(&args.io.input)
                .context("Failed to open input")?
                .map(|r| r.map(GeocodeInput::Row)),
        ),
        Format::Entities => Box::new(
            read_entities(&args.io.input)
                .context("Failed to open input")?
                .map(|r| r.map(GeocodeInput::Entity)),
        ),
    };
    let mut out = RecordWriter::create(&args.io.output, args.output_format)?;
    let task = GeocodeTask::new(orchestrator.clone(), opts);
    let summary = run_worker(&task, inputs, &mut out).await?;
    orchestrator.cache().flush()?;
    Ok(summary)
}

async fn apply_regions(config: &Config, args: ApplyRegionsArgs) -> Result<RunSummary> {
    let task = ApplyRegionsTask::new(load_resolver(config)?);
    let inputs: Box<dyn Iterator<Item = addrgeo::Result<RegionInput>>> = match args.input_format {
        Format::Csv => Box::new(
            read_latlon_csv(&args.io.input)
                .context("Failed to open input")?
                .map(|r| r.map(RegionInput::Point)),
        ),
        Format::Entities => Box::new(
            read_entities(&args.io.input)
                .context("Failed to open input")?
                .map(|r| r.map(RegionInput::Entity)),
        ),
    };
    let mut out = RecordWriter::create(&args.io.output, args.output_format)?;
    Ok(run_worker(&task, inputs, &mut out).await?)
}

fn cache_command(config: &Config, command: CacheCommand) -> Result<RunSummary> {
    let cache = ResultCache::from_config(&config.cache).context("Failed to open cache")?;
    let maintenance_args = match &command {
        CacheCommand::Iterate { maintenance, .. } | CacheCommand::Populate { maintenance, .. } => {
            maintenance
        }
    };
    let resolver = if maintenance_args.apply_regions {
        Some(load_resolver(config)?)
    } else {
        None
    };
    let maintenance = CacheMaintenance {
        regions: resolver.as_deref(),
        ensure_ids: maintenance_args
            .ensure_ids
            .then_some(config.identity_scheme),
    };

    let summary = match &command {
        CacheCommand::Iterate {
            output,
            output_format,
            ..
        } => {
            let mut out = RecordWriter::create(output, *output_format)?;
            export_cache(&cache, &mut out, maintenance)?
        }
        CacheCommand::Populate { input, .. } => {
            let results = read_results_csv(input).context("Failed to open input")?;
            populate_cache(&cache, results, maintenance)?
        }
    };
    Ok(summary)
}

fn show_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    for endpoint in [&mut shown.nominatim, &mut shown.arcgis] {
        if endpoint.api_key.is_some() {
            endpoint.api_key = Some("***".to_string());
        }
    }
    let text = toml::to_string_pretty(&shown).context("Failed to render configuration")?;
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let summary = match cli.command {
        Command::Config => return show_config(&config),
        Command::FormatLine(args) => format_line(args, false).await?,
        Command::ParseComponents(args) => format_line(args, true).await?,
        Command::Geocode(args) => geocode(&config, args).await?,
        Command::ApplyRegions(args) => apply_regions(&config, args).await?,
        Command::Cache(command) => cache_command(&config, command)?,
    };
    report(summary);
    Ok(())
}
